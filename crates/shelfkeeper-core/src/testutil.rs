//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::api::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Base URL every scripted route is relative to.
pub const BASE_URL: &str = "http://library.test/api/";

pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Build an unsigned token around `payload`.
pub fn make_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

/// Token for `username` expiring `expires_in` seconds from now.
pub fn token_for(username: &str, is_staff: bool, is_superuser: bool, expires_in: i64) -> String {
    make_token(&json!({
        "user_id": 1,
        "username": username,
        "email": format!("{}@school.example", username),
        "is_staff": is_staff,
        "is_superuser": is_superuser,
        "exp": now() + expires_in,
    }))
}

/// What a scripted route answers with.
pub enum Reply {
    Respond(u16, String),
    Fail(String),
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Reply::Respond(status, body.to_string())
    }

    pub fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }
}

type Handler = Box<dyn Fn(&ApiRequest) -> Reply + Send + Sync>;

/// Transport answering from per-route closures and recording every request.
///
/// Routes are keyed by method and the URL with [`BASE_URL`] stripped.
/// Unscripted routes answer 404. Every send yields once before answering so
/// concurrent callers interleave the way they would over a real network.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), Handler>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(
        &self,
        method: Method,
        path: &str,
        handler: impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static,
    ) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Box::new(handler));
    }

    pub fn requests_to(&self, method: &Method, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.method == method && Self::path_of(&r.url) == path)
            .cloned()
            .collect()
    }

    pub fn calls_to(&self, method: &Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    fn path_of(url: &str) -> &str {
        url.strip_prefix(BASE_URL).unwrap_or(url)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        tokio::task::yield_now().await;

        self.requests.lock().unwrap().push(request.clone());
        let key = (request.method.clone(), Self::path_of(&request.url).to_string());
        let reply = match self.routes.lock().unwrap().get(&key) {
            Some(handler) => handler(&request),
            None => Reply::json(404, json!({ "detail": "Not found." })),
        };

        match reply {
            Reply::Respond(status, body) => Ok(ApiResponse::new(
                StatusCode::from_u16(status).expect("scripted status must be valid"),
                body,
            )),
            Reply::Fail(message) => Err(TransportError::Connection(message)),
        }
    }
}

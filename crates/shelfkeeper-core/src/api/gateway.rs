//! Authenticated request gateway.
//!
//! Every call to the lending API goes through [`Gateway::request`]: the
//! current access token is attached, the request is sent once, and a 401 gets
//! exactly one refresh-and-retry cycle. Nothing else is retried.

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::SessionManager;
use crate::utils::truncate_bytes;

use super::transport::{ApiRequest, ApiResponse, MultipartForm, RequestBody};
use super::ApiError;

/// How much of a failed response body goes into the log
const LOGGED_BODY_LENGTH: usize = 200;

/// Method and body of a gateway call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn new(method: Method, body: RequestBody) -> Self {
        Self { method, body }
    }

    pub fn get() -> Self {
        Self::new(Method::GET, RequestBody::Empty)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE, RequestBody::Empty)
    }

    /// POST with no body
    pub fn post() -> Self {
        Self::new(Method::POST, RequestBody::Empty)
    }

    pub fn post_json(body: Value) -> Self {
        Self::new(Method::POST, RequestBody::Json(body))
    }

    pub fn put_json(body: Value) -> Self {
        Self::new(Method::PUT, RequestBody::Json(body))
    }

    pub fn patch_json(body: Value) -> Self {
        Self::new(Method::PATCH, RequestBody::Json(body))
    }

    pub fn post_multipart(form: MultipartForm) -> Self {
        Self::new(Method::POST, RequestBody::Multipart(form))
    }

    pub fn put_multipart(form: MultipartForm) -> Self {
        Self::new(Method::PUT, RequestBody::Multipart(form))
    }
}

#[derive(Clone)]
pub struct Gateway {
    session: SessionManager,
}

impl Gateway {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Send a request on behalf of the signed-in user.
    ///
    /// `endpoint` is relative to the configured base URL, or an absolute URL.
    /// A 401 triggers one refresh (shared with any concurrent caller) and one
    /// retry; if the refresh fails the session is ended and the result is
    /// [`ApiError::SessionExpired`]. Any other non-2xx status, including a
    /// second 401, is [`ApiError::RequestFailed`].
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<ApiResponse, ApiError> {
        let observed = self.session.credentials_snapshot();
        let response = self
            .send_once(endpoint, &options, observed.access_token.as_deref())
            .await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Self::check(endpoint, response);
        }

        debug!(endpoint, epoch = observed.epoch, "Unauthorized; refreshing session before retry");
        let token = self.session.refresh_from(&observed).await?;
        let retried = self.send_once(endpoint, &options, Some(&token)).await?;
        Self::check(endpoint, retried)
    }

    /// GET and parse a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.send_json(endpoint, RequestOptions::get()).await
    }

    /// Send and parse a JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(endpoint, options).await?.json()
    }

    /// Send and ignore whatever body comes back
    pub async fn send_empty(&self, endpoint: &str, options: RequestOptions) -> Result<(), ApiError> {
        self.request(endpoint, options).await.map(|_| ())
    }

    async fn send_once(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let request = self.build(endpoint, options, token)?;
        debug!(method = %request.method, url = %request.url, "Sending request");
        Ok(self.session.transport().send(request).await?)
    }

    fn build(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<ApiRequest, ApiError> {
        let mut request = ApiRequest::new(options.method.clone(), self.session.url(endpoint));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidRequest(format!("Unusable access token: {}", e)))?;
            request.headers.insert(AUTHORIZATION, value);
        }
        // multipart bodies carry their own boundary in the content type
        if !options.body.is_multipart() {
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        request.body = options.body.clone();
        Ok(request)
    }

    fn check(endpoint: &str, response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            return Ok(response);
        }
        warn!(
            endpoint,
            status = response.status.as_u16(),
            body = %truncate_bytes(&response.body, LOGGED_BODY_LENGTH),
            "Request failed"
        );
        Err(ApiError::from_status(response.status, &response.body))
    }
}

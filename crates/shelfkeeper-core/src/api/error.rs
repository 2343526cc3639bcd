use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::codec::DecodeError;
use crate::auth::store::StoreError;
use crate::utils::truncate_bytes;

use super::transport::TransportError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Malformed access token: {0}")]
    Decode(#[from] DecodeError),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Token storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Shown when the server gives no readable explanation
const GENERIC_FAILURE_MESSAGE: &str = "The request could not be completed. Please try again.";

/// Shown for rejected logins without a server-supplied reason
pub(crate) const DEFAULT_LOGIN_FAILURE: &str = "Invalid username or password.";

// Error bodies in the shape the lending API uses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<String>,
}

impl ApiError {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::RequestFailed {
            status: status.as_u16(),
            body: truncate_bytes(body, MAX_ERROR_BODY_LENGTH),
        }
    }

    /// Status code of a failed request, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the user has to log in again
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// Whether retrying the same call later might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Message fit to show an end user. Raw bodies are never shown; only a
    /// server-supplied `detail` is passed through.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::InvalidCredentials(message) => message.clone(),
            ApiError::SessionExpired => self.to_string(),
            ApiError::RequestFailed { body, .. } => {
                server_detail(body).unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
            }
            ApiError::Network(_) => {
                "Could not reach the library server. Check your connection and retry.".to_string()
            }
            ApiError::Decode(_)
            | ApiError::InvalidResponse(_)
            | ApiError::InvalidRequest(_)
            | ApiError::Storage(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }
}

/// Human-readable reason from an error body (`detail`, then `error`).
pub(crate) fn server_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .detail
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty())
}

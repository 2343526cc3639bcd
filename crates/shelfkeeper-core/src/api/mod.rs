//! HTTP access to the lending API.
//!
//! Every call goes through the [`Gateway`], which attaches the signed-in
//! user's bearer token and recovers from an expired access token with a
//! single refresh and retry. The per-resource clients (`BooksClient`,
//! `UsersClient`, `LoansClient`) only map endpoints to models.
//!
//! The wire itself sits behind the [`Transport`] trait; production code uses
//! [`ReqwestTransport`].

pub mod books;
pub mod error;
pub mod gateway;
pub mod loans;
pub mod pagination;
pub mod transport;
pub mod users;

pub use books::BooksClient;
pub use error::ApiError;
pub use gateway::{Gateway, RequestOptions};
pub use loans::LoansClient;
pub use pagination::{fetch_all, ListResponse, Page};
pub use transport::{
    ApiRequest, ApiResponse, FormPart, MultipartForm, RequestBody, ReqwestTransport, Transport,
    TransportError,
};
pub use users::UsersClient;

/// Serialize an outgoing payload into a JSON request body.
pub(crate) fn to_json<T: serde::Serialize>(payload: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(payload).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

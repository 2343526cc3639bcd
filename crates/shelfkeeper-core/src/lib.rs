//! Client core for the school library lending service.
//!
//! Signs users in against the service's token endpoints, keeps the session
//! alive across restarts and token expiry, and exposes typed clients for
//! books, users and loans. Front ends build a [`SessionManager`] (usually via
//! [`Config::connect`]), call [`SessionManager::bootstrap`] once, and issue
//! every request through its [`Gateway`].

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

#[cfg(test)]
mod testutil;

pub use api::{ApiError, BooksClient, Gateway, LoansClient, UsersClient};
pub use auth::{AuthStatus, RenewalTask, Role, Session, SessionManager};
pub use config::{Config, ConfigError, TokenStoreKind};

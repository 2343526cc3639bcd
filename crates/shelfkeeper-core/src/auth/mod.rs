//! Authentication and session lifecycle.
//!
//! This module provides:
//! - `SessionManager`: login, logout, startup restore, token refresh and
//!   periodic renewal
//! - `Session`, `Role`, `AuthStatus`: the published identity
//! - `TokenStore` and its file, keyring and in-memory implementations
//! - `codec`: reading claims out of an access token
//!
//! Tokens are issued by the server; signatures are never checked client-side.

pub mod codec;
pub mod keyring_store;
pub mod manager;
pub mod session;
pub mod store;

pub use codec::{DecodeError, DecodedClaims};
pub use keyring_store::KeyringTokenStore;
pub use manager::{RenewalTask, SessionManager, DEFAULT_RENEWAL_INTERVAL};
pub use session::{AuthStatus, Role, Session};
pub use store::{Credentials, FileTokenStore, MemoryTokenStore, PersistedSession, StoreError, TokenStore};

use keyring::Entry;
use tracing::debug;

use super::store::{PersistedSession, StoreError, TokenStore};

const SERVICE_NAME: &str = "shelfkeeper";

/// Keychain account the session document is stored under
const SESSION_ACCOUNT: &str = "session";

/// Keeps the whole session document in a single OS keychain secret.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a different keychain service name, e.g. one per server profile
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, SESSION_ACCOUNT)?)
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        let secret = serde_json::to_string(session)?;
        self.entry()?.set_password(&secret)?;
        debug!(service = %self.service, "Session saved to keychain");
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(serde_json::from_str(&secret)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

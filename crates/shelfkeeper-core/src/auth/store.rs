//! Durable storage for the session's tokens.
//!
//! The three persisted keys (`access_token`, `refresh_token`, `user_info`)
//! always travel together as one [`PersistedSession`] document, so a reader
//! sees either the whole session or none of it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::codec::DecodedClaims;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Temporary file the session is staged in before being renamed into place
const SESSION_TMP_FILE: &str = "session.json.tmp";

/// Owner read/write only; the file holds bearer credentials
#[cfg(unix)]
const SESSION_FILE_MODE: u32 = 0o600;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

/// Everything the store persists for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub user_info: Option<DecodedClaims>,
}

pub trait TokenStore: Send + Sync {
    /// Replace the stored session
    fn save(&self, session: &PersistedSession) -> Result<(), StoreError>;

    /// Read the stored session, if any
    fn load(&self) -> Result<Option<PersistedSession>, StoreError>;

    /// Remove every stored key. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

// ============================================================================
// File-backed store
// ============================================================================

/// Stores the session as a JSON file, replaced atomically on every save.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn write_atomically(&self, path: &Path, contents: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(SESSION_TMP_FILE);
        // create_new below needs any stale temp file gone
        match std::fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(SESSION_FILE_MODE);
        }
        let mut file = options.open(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(session)?;
        self.write_atomically(&self.path(), &contents)?;
        debug!(path = %self.path().display(), "Session saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, used for tests and for embedders that do not want
/// tokens to outlive the process.
#[derive(Default)]
pub struct MemoryTokenStore {
    session: Mutex<Option<PersistedSession>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PersistedSession>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn save(&self, session: &PersistedSession) -> Result<(), StoreError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        Ok(self.slot().clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}

//! Application configuration management.
//!
//! Holds the API location, request timing and where tokens are kept.
//! Configuration is stored at `~/.config/shelfkeeper/config.json`; the
//! `SHELFKEEPER_API_URL` and `SHELFKEEPER_TOKEN_STORE` environment variables
//! take precedence over the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::api::{ReqwestTransport, TransportError};
use crate::auth::{
    FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionManager, TokenStore,
    DEFAULT_RENEWAL_INTERVAL,
};

/// Application name used for config/data directory paths
const APP_NAME: &str = "shelfkeeper";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api/";

const ENV_API_URL: &str = "SHELFKEEPER_API_URL";
const ENV_TOKEN_STORE: &str = "SHELFKEEPER_TOKEN_STORE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Could not find {0} directory")]
    NoDirectory(&'static str),

    #[error("Unknown token store '{0}' (expected file, keyring or memory)")]
    UnknownTokenStore(String),

    #[error("Could not build HTTP client: {0}")]
    Transport(#[from] TransportError),
}

/// Where the session's tokens are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for TokenStoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(TokenStoreKind::File),
            "keyring" => Ok(TokenStoreKind::Keyring),
            "memory" => Ok(TokenStoreKind::Memory),
            other => Err(ConfigError::UnknownTokenStore(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub renewal_interval_secs: u64,
    pub token_store: TokenStoreKind,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            renewal_interval_secs: DEFAULT_RENEWAL_INTERVAL.as_secs(),
            token_store: TokenStoreKind::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Record the last signed-in user in the config file. Only that field
    /// changes; command-line and environment overrides are never written.
    pub fn remember_username(username: &str) -> Result<(), ConfigError> {
        Self::remember_username_in(&Self::config_path()?, username)
    }

    pub fn remember_username_in(path: &Path, username: &str) -> Result<(), ConfigError> {
        let mut stored = Self::load_from(path)?;
        stored.last_username = Some(username.to_string());
        stored.save_to(path)
    }

    /// Override settings from the environment. An unrecognised token store
    /// name is ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(kind) = lookup(ENV_TOKEN_STORE) {
            match kind.parse() {
                Ok(kind) => self.token_store = kind,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_TOKEN_STORE),
            }
        }
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoDirectory("config"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file token store
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDirectory("data"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// API base URL, always ending with `/`
    pub fn base_url(&self) -> String {
        let url = self.api_base_url.trim();
        if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{}/", url)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Renewal period; zero falls back to the default.
    pub fn renewal_interval(&self) -> Duration {
        match self.renewal_interval_secs {
            0 => DEFAULT_RENEWAL_INTERVAL,
            secs => Duration::from_secs(secs),
        }
    }

    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>, ConfigError> {
        Ok(match self.token_store {
            TokenStoreKind::File => Arc::new(FileTokenStore::new(Self::data_dir()?)),
            TokenStoreKind::Keyring => Arc::new(KeyringTokenStore::new()),
            TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
        })
    }

    /// Session manager wired to the real HTTP transport and configured store.
    pub fn connect(&self) -> Result<SessionManager, ConfigError> {
        let transport = Arc::new(ReqwestTransport::new(self.request_timeout())?);
        Ok(SessionManager::new(self.base_url(), transport, self.token_store()?))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:8000/api/");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.renewal_interval(), Duration::from_secs(240));
        assert_eq!(config.token_store, TokenStoreKind::File);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.last_username.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            api_base_url: "https://biblioteca.example/api".to_string(),
            token_store: TokenStoreKind::Keyring,
            last_username: Some("ana".to_string()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.base_url(), "https://biblioteca.example/api/");
        assert_eq!(loaded.token_store, TokenStoreKind::Keyring);
        assert_eq!(loaded.last_username.as_deref(), Some("ana"));
    }

    #[test]
    fn test_remember_username_keeps_overrides_out_of_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"request_timeout_secs": 10}"#).unwrap();

        // what a run with --api-url and SHELFKEEPER_TOKEN_STORE would see
        let mut running = Config::load_from(&path).unwrap();
        running.api_base_url = "http://staging.test/api/".to_string();
        running.apply_env(|key| (key == "SHELFKEEPER_TOKEN_STORE").then(|| "memory".to_string()));

        Config::remember_username_in(&path, "ana").unwrap();

        let saved = Config::load_from(&path).unwrap();
        assert_eq!(saved.last_username.as_deref(), Some("ana"));
        assert_eq!(saved.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(saved.token_store, TokenStoreKind::File);
        assert_eq!(saved.request_timeout_secs, 10);
        assert_eq!(running.token_store, TokenStoreKind::Memory);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"token_store": "memory"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.token_store, TokenStoreKind::Memory);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SHELFKEEPER_API_URL", "http://10.0.0.5:8000/api"),
            ("SHELFKEEPER_TOKEN_STORE", "Keyring"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.base_url(), "http://10.0.0.5:8000/api/");
        assert_eq!(config.token_store, TokenStoreKind::Keyring);
    }

    #[test]
    fn test_unknown_env_store_is_ignored() {
        let mut config = Config::default();
        config.apply_env(|key| (key == "SHELFKEEPER_TOKEN_STORE").then(|| "vault".to_string()));
        assert_eq!(config.token_store, TokenStoreKind::File);
    }

    #[test]
    fn test_zero_renewal_interval_uses_default() {
        let config = Config {
            renewal_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.renewal_interval(), DEFAULT_RENEWAL_INTERVAL);
    }
}

//! # Engine Configuration
//!
//! Where the shop API lives and where guest data is kept.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CARTSYNC_API_URL=https://shop.example.com/api                      │
//! │     CARTSYNC_TIMEOUT_SECS=10                                           │
//! │     CARTSYNC_DATA_DIR=/var/lib/cartsync                                │
//! │     CARTSYNC_AUTH_TOKEN=eyJhbGciOi...                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/cartsync/cartsync.toml (Linux)                           │
//! │     ~/Library/Application Support/com.cartsync.cartsync/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # cartsync.toml
//! [remote]
//! base_url = "https://shop.example.com/api"
//! request_timeout_secs = 10
//! user_agent = "cartsync/0.1.0"
//!
//! [storage]
//! data_dir = "/var/lib/cartsync"
//! ```
//!
//! The bearer token is never written to the file; it only comes from the
//! environment or the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{EngineError, EngineResult};

const CONFIG_FILE_NAME: &str = "cartsync.toml";

// =============================================================================
// Remote Settings
// =============================================================================

/// Shop API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL; endpoint paths (`/cart`, `/wishlist`) are appended to it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Bearer token for signed-in sessions.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("cartsync/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
            auth_token: None,
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RemoteSettings {
    /// Parses `base_url`.
    pub fn parsed_base_url(&self) -> EngineResult<Url> {
        let url = Url::parse(&self.base_url)?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(EngineError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        if url.cannot_be_a_base() {
            return Err(EngineError::InvalidUrl(format!(
                "API URL cannot have paths appended: {}",
                self.base_url
            )));
        }

        Ok(url)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Guest storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding `guestCart.json` and `guestWishlist.json`.
    /// Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageSettings {
    /// The configured data directory, or the platform default.
    pub fn resolved_data_dir(&self) -> EngineResult<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| EngineError::InvalidConfig("No data directory available".into()))
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (cartsync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| EngineError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file. The auth token is not written.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        self.remote.parsed_base_url()?;

        if self.remote.request_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(ref token) = self.remote.auth_token {
            if token.trim().is_empty() {
                return Err(EngineError::InvalidConfig("auth token is empty".into()));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CARTSYNC_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.remote.base_url = url;
        }

        if let Ok(secs) = std::env::var("CARTSYNC_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.remote.request_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring non-numeric CARTSYNC_TIMEOUT_SECS"),
            }
        }

        if let Ok(dir) = std::env::var("CARTSYNC_DATA_DIR") {
            debug!(dir = %dir, "Overriding data directory from environment");
            self.storage.data_dir = Some(PathBuf::from(dir));
        }

        if let Ok(token) = std::env::var("CARTSYNC_AUTH_TOKEN") {
            debug!("Auth token supplied by environment");
            self.remote.auth_token = Some(token);
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "cartsync", "cartsync")
}

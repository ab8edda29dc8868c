//! Application configuration.
//!
//! Loaded from an optional TOML file (path in `PRISM_CONFIG`, default
//! `prism.toml`). Every field has a default so the gateway starts with no
//! config file at all. The credential encryption master key is deliberately
//! NOT part of the file — it comes from `PRISM_ENCRYPTION_KEY`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete Prism configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PrismConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub oauth: OAuthFlowConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address the API server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL used to build OAuth redirect URIs
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8686".to_string()
}

fn default_callback_base_url() -> String {
    "http://localhost:8686".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            callback_base_url: default_callback_base_url(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "prism.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// OAuth flow configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthFlowConfig {
    /// How long CSRF state tokens remain valid (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
}

fn default_state_expiry() -> i64 {
    600
}

impl Default for OAuthFlowConfig {
    fn default() -> Self {
        Self {
            state_expiry_seconds: default_state_expiry(),
        }
    }
}

impl PrismConfig {
    /// Loads configuration from the given TOML file.
    ///
    /// A missing file yields the defaults; a malformed file is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Loads configuration from the path in `PRISM_CONFIG` (default `prism.toml`).
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("PRISM_CONFIG").unwrap_or_else(|_| "prism.toml".to_string());
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PrismConfig::default();
        assert_eq!(config.api.bind_addr, "127.0.0.1:8686");
        assert_eq!(config.storage.db_path, "prism.db");
        assert_eq!(config.oauth.state_expiry_seconds, 600);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = PrismConfig::load("/nonexistent/prism.toml").unwrap();
        assert_eq!(config.api.bind_addr, "127.0.0.1:8686");
    }

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\ndb_path = \"/tmp/gateway.db\"").unwrap();

        let config = PrismConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.db_path, "/tmp/gateway.db");
        // Untouched sections keep defaults
        assert_eq!(config.api.callback_base_url, "http://localhost:8686");
    }

    #[test]
    fn test_malformed_file_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();

        assert!(PrismConfig::load(file.path()).is_err());
    }
}

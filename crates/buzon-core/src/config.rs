use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BuzonError;

/// Top-level Buzón configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub inbox: InboxConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Datastore config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Token encryption config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CryptoConfig {
    /// Base64-encoded 32-byte AES-256 key. Empty = read from BUZON_CRYPTO_KEY.
    #[serde(default)]
    pub key: String,
}

impl CryptoConfig {
    /// Resolve the key material, preferring the config value over the env var.
    pub fn key_material(&self) -> Result<String, BuzonError> {
        if !self.key.is_empty() {
            return Ok(self.key.clone());
        }
        std::env::var("BUZON_CRYPTO_KEY").map_err(|_| {
            BuzonError::Config(
                "no crypto key: set [crypto].key or the BUZON_CRYPTO_KEY env var".to_string(),
            )
        })
    }
}

/// Graph API config for profile lookups and read receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-request timeout. Side effects must not stall ingestion.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_name() -> String {
    "buzon".to_string()
}

fn default_data_dir() -> String {
    "~/.buzon".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_path() -> String {
    "~/.buzon/data/inbox.db".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_api_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

/// Expand `~` to the home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, BuzonError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| BuzonError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| BuzonError::Config(format!("failed to parse config: {e}")))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = load("/nonexistent/buzon.toml").unwrap();
        assert_eq!(config.store.db_path, "~/.buzon/data/inbox.db");
        assert_eq!(config.graph.timeout_secs, 5);
        assert_eq!(config.store.max_connections, 4);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [store]
            db_path = "/tmp/test.db"

            [graph]
            timeout_secs = 2
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.db_path, "/tmp/test.db");
        assert_eq!(config.graph.timeout_secs, 2);
        // Unspecified sections keep defaults.
        assert_eq!(config.inbox.log_level, "info");
        assert!(config.graph.api_base.contains("graph.facebook.com"));
    }

    #[test]
    fn test_shellexpand() {
        std::env::set_var("HOME", "/home/clic");
        assert_eq!(shellexpand("~/x/y.db"), "/home/clic/x/y.db");
        assert_eq!(shellexpand("/abs/path.db"), "/abs/path.db");
    }
}

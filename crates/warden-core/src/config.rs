//! Daemon configuration parsing.
//!
//! Configuration is a single TOML document. Every field has a default, so an
//! empty file (or no file at all) yields a usable local setup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Address the control plane listens on.
    pub listen: SocketAddr,

    /// Path of the SQLite store.
    pub database: PathBuf,

    /// Lifetime of minted auth tokens, in hours.
    pub token_ttl_hours: i64,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Password assigned to the seeded `admin` account when the store is
    /// empty on first start.
    pub default_admin_password: String,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8976)),
            database: PathBuf::from("warden.sqlite"),
            token_ttl_hours: 12,
            log_filter: "info".to_owned(),
            default_admin_password: "admin".to_owned(),
        }
    }
}

impl WardenConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_yields_defaults() {
        let config = WardenConfig::from_toml("").unwrap();
        assert_eq!(config.token_ttl_hours, 12);
        assert_eq!(config.database, PathBuf::from("warden.sqlite"));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = WardenConfig::from_toml(
            r#"
listen = "0.0.0.0:9000"
token_ttl_hours = 2
"#,
        )
        .unwrap();
        assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 9000)));
        assert_eq!(config.token_ttl_hours, 2);
        // Untouched fields keep their defaults.
        assert_eq!(config.default_admin_password, "admin");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(WardenConfig::from_toml("listen = [").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "database = \"/var/lib/warden/warden.sqlite\"\n").unwrap();

        let config = WardenConfig::from_file(&path).unwrap();
        assert_eq!(
            config.database,
            PathBuf::from("/var/lib/warden/warden.sqlite")
        );
        assert!(WardenConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}

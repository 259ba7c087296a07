//! Configuration for bus clients.
//!
//! Loads configuration from a TOML file; command-line flags override it.

use crate::utils::errors::ClientError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub services: ServiceNames,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the bus router listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Bus addresses of the services a client talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNames {
    /// Backup transaction coordinator
    #[serde(default = "default_backup_service")]
    pub backup: String,

    /// Restore cascade resolver
    #[serde(default = "default_restore_service")]
    pub restore: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_backup_service() -> String {
    "bkpsv".to_string()
}

fn default_restore_service() -> String {
    "rstrv".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BusConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form accepted by `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ServiceNames {
    fn default() -> Self {
        Self {
            backup: default_backup_service(),
            restore: default_restore_service(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bus: BusConfig::default(),
            services: ServiceNames::default(),
            log: LogConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_or_invalid_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::from_file(&missing), Err(ClientError::Config(_))));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[bus\nport = ").unwrap();
        assert!(matches!(
            Config::from_file(&broken),
            Err(ClientError::Config(msg)) if msg.contains("broken.toml")
        ));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bus]
            host = "bus.internal"
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.address(), "bus.internal:5000");
        assert_eq!(config.services.backup, "bkpsv");
        assert_eq!(config.services.restore, "rstrv");
        assert_eq!(config.log.level, "info");
    }
}

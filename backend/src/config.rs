//! Configuration management for the DocBridge backend daemon
//!
//! This module handles loading, validation, and management of configuration
//! settings for the backend service. Configuration files are YAML unless the
//! path ends in `.toml`; command-line arguments override file values.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{BackendResult, ConfigError};
use docbridge_shared::{Account, BridgeConfig, LogFormat, LogLevel};

/// Main configuration structure for the backend daemon
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// IPC communication settings
    pub ipc: IpcConfig,

    /// Local cache settings
    pub storage: StorageConfig,

    /// Document bridge behaviour
    pub bridge: BridgeConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Accounts exposed as document roots, in root order
    pub accounts: Vec<AccountConfig>,
}

/// IPC (Inter-Process Communication) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Unix domain socket path for IPC communication
    pub socket_path: PathBuf,

    /// Maximum number of concurrent client connections
    pub max_connections: usize,

    /// Enable IPC request/response logging (for debugging)
    pub log_requests: bool,
}

/// Local cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding downloaded copies, one subdirectory per account
    pub cache_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable structured JSON logging
    pub json_format: bool,
}

/// One account and the directory standing in for its server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account name, e.g. `alice@cloud.example.com`
    pub name: String,

    /// Directory whose tree is served as the account's remote files
    pub remote_dir: PathBuf,
}

impl AccountConfig {
    pub fn account(&self) -> Account {
        Account::new(self.name.clone())
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        let socket_path = dirs::runtime_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("docbridge")
            .join("backend.sock");

        Self {
            socket_path,
            max_connections: 10,
            log_requests: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("docbridge");

        Self { cache_dir }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Subscriber settings for the shared logging initializer
    ///
    /// `debug` forces debug level regardless of the configured one.
    pub fn subscriber_config(&self, debug: bool) -> docbridge_shared::LoggingConfig {
        let level = if debug {
            LogLevel::Debug
        } else {
            LogLevel::parse(&self.level).unwrap_or(LogLevel::Info)
        };
        let format = if self.json_format {
            LogFormat::Json
        } else {
            LogFormat::Full
        };
        docbridge_shared::LoggingConfig { level, format }
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> BackendResult<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from: {:?}", path);

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = if is_toml(path) {
            toml::from_str(&content).map_err(ConfigError::from)?
        } else {
            serde_yaml::from_str(&content).map_err(ConfigError::from)?
        };

        info!("Configuration loaded successfully from: {:?}", path);
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> BackendResult<()> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
                reason: e.to_string(),
            })?
        } else {
            serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize {
                reason: e.to_string(),
            })?
        };

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Configuration saved to: {:?}", path);
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> BackendResult<()> {
        // Validate IPC settings
        if self.ipc.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "ipc.max_connections".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        // Validate bridge settings
        self.bridge.validate().map_err(|e| ConfigError::Invalid {
            field: "bridge".to_string(),
            reason: e.to_string(),
        })?;

        // Validate accounts
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "accounts.name".to_string(),
                    reason: "must not be empty".to_string(),
                }
                .into());
            }
            if !seen.insert(account.name.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "accounts.name".to_string(),
                    reason: format!("duplicate account '{}'", account.name),
                }
                .into());
            }
            if !account.remote_dir.is_dir() {
                warn!(
                    "Remote directory {:?} of account {} does not exist",
                    account.remote_dir, account.name
                );
            }
        }

        // Validate logging settings
        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid {
                field: "logging.level".to_string(),
                reason: "must be one of: trace, debug, info, warn, error".to_string(),
            }
            .into());
        }

        // Ensure required directories exist or can be created
        self.ensure_directories()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> BackendResult<()> {
        if let Some(parent) = self.ipc.socket_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        fs::create_dir_all(&self.storage.cache_dir).with_context(|| {
            format!(
                "Failed to create cache directory: {:?}",
                self.storage.cache_dir
            )
        })?;

        Ok(())
    }

    /// Look up an account by name
    pub fn account(&self, name: &str) -> BackendResult<&AccountConfig> {
        self.accounts
            .iter()
            .find(|account| account.name == name)
            .ok_or_else(|| {
                ConfigError::UnknownAccount {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::error::BackendError;
    use tempfile::tempdir;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.ipc.socket_path = dir.join("run").join("backend.sock");
        config.storage.cache_dir = dir.join("cache");
        config.accounts = vec![AccountConfig {
            name: "alice@cloud.example.com".to_string(),
            remote_dir: dir.join("remote"),
        }];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.accounts.is_empty());
        assert_eq!(config.bridge, BridgeConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let temp_dir = tempdir().unwrap();
        let mut config = config_in(temp_dir.path());
        assert!(config.validate().is_ok());

        config.ipc.max_connections = 0;
        assert!(config.validate().is_err());
        config.ipc.max_connections = 10;

        config.bridge.poll_interval_ms = 0;
        assert_matches!(
            config.validate(),
            Err(BackendError::Config(ConfigError::Invalid { .. }))
        );
        config.bridge.poll_interval_ms = 250;

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_subscriber_config_mapping() {
        let mut logging = LoggingConfig::default();
        let subscriber = logging.subscriber_config(false);
        assert_eq!(subscriber.level, LogLevel::Info);
        assert_eq!(subscriber.format, LogFormat::Full);

        assert_eq!(logging.subscriber_config(true).level, LogLevel::Debug);

        logging.level = "WARN".to_string();
        logging.json_format = true;
        let subscriber = logging.subscriber_config(false);
        assert_eq!(subscriber.level, LogLevel::Warn);
        assert_eq!(subscriber.format, LogFormat::Json);
    }

    #[test]
    fn test_duplicate_accounts_rejected() {
        let temp_dir = tempdir().unwrap();
        let mut config = config_in(temp_dir.path());
        config.accounts.push(config.accounts[0].clone());

        assert_matches!(
            config.validate(),
            Err(BackendError::Config(ConfigError::Invalid { .. }))
        );
    }

    #[test]
    fn test_yaml_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config = config_in(temp_dir.path());
        let path = temp_dir.path().join("backend.yml");

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.accounts, config.accounts);
        assert_eq!(loaded.storage.cache_dir, config.storage.cache_dir);
    }

    #[test]
    fn test_toml_file_operations() {
        let temp_dir = tempdir().unwrap();
        let mut config = config_in(temp_dir.path());
        config.bridge.poll_interval_ms = 50;
        let path = temp_dir.path().join("backend.toml");

        config.save(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("poll_interval_ms = 50"));

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.bridge.poll_interval_ms, 50);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("partial.yml");
        let cache = temp_dir.path().join("cache");
        fs::write(
            &path,
            format!(
                "storage:\n  cache_dir: {}\nipc:\n  socket_path: {}\n",
                cache.display(),
                temp_dir.path().join("s.sock").display()
            ),
        )
        .unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.bridge.poll_interval_ms, 1000);
        assert_eq!(loaded.ipc.max_connections, 10);
        assert!(cache.exists());
    }

    #[test]
    fn test_missing_file() {
        assert_matches!(
            Config::load("/nonexistent/docbridge.yml"),
            Err(BackendError::Config(ConfigError::NotFound { .. }))
        );
    }

    #[test]
    fn test_account_lookup() {
        let temp_dir = tempdir().unwrap();
        let config = config_in(temp_dir.path());
        assert!(config.account("alice@cloud.example.com").is_ok());
        assert_matches!(
            config.account("mallory@x"),
            Err(BackendError::Config(ConfigError::UnknownAccount { .. }))
        );
    }
}

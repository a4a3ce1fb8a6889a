//! Client configuration.
//!
//! Settings are read from TOML files (global `~/.mlforge/config.toml`, then a
//! local `.mlforgerc` which overrides it) and then from `MLFORGE_*`
//! environment variables.

use crate::connection::RetryPolicy;
use crate::manager::{UploadOptions, DEFAULT_PART_SIZE};
use mlforge_abstraction::ArtifactError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the service host.
pub const HOST_ENV: &str = "MLFORGE_HOST";
/// Environment variable holding the user's email.
pub const EMAIL_ENV: &str = "MLFORGE_EMAIL";
/// Environment variable holding the user's developer key.
pub const DEV_KEY_ENV: &str = "MLFORGE_DEV_KEY";

/// Configuration for connecting to the metadata service and transferring artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service host, optionally with scheme and port (e.g. `app.example.com`,
    /// `http://localhost:3000`).
    #[serde(default)]
    pub host: Option<String>,

    /// Scheme used when `host` has none (default: `https`).
    #[serde(default = "default_scheme")]
    pub scheme: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub dev_key: Option<String>,

    /// Retries on connection errors and 502/503/504 responses (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries in seconds (default: 1).
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Per-request timeout in seconds (default: none).
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Multipart upload part size in bytes (default: 64 MiB).
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Maximum number of parts uploaded concurrently (default: 1).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_secs() -> u64 {
    1
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_max_concurrency() -> usize {
    1
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// No host configured.
    #[error("No host configured: set `host` in the config file or MLFORGE_HOST")]
    MissingHost,

    /// Invalid part size (must be > 0).
    #[error("Invalid part size: must be greater than 0")]
    InvalidPartSize,

    /// Invalid concurrency (must be > 0).
    #[error("Invalid max concurrency: must be greater than 0")]
    InvalidConcurrency,
}

impl From<ConfigError> for ArtifactError {
    fn from(err: ConfigError) -> Self {
        ArtifactError::Config(err.to_string())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            scheme: default_scheme(),
            email: None,
            dev_key: None,
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
            timeout_secs: None,
            part_size: default_part_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Settings present in a single config file.
///
/// Every field is optional so that a file which sets a value back to its
/// default still overrides an earlier file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigLayer {
    pub host: Option<String>,
    pub scheme: Option<String>,
    pub email: Option<String>,
    pub dev_key: Option<String>,
    pub max_retries: Option<u32>,
    pub backoff_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub part_size: Option<u64>,
    pub max_concurrency: Option<usize>,
}

impl ConfigLayer {
    /// Load the settings of a single TOML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is missing, unreadable or not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file on top of the defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is missing, unreadable or not valid TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(&ConfigLayer::load(path)?);
        Ok(config)
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".mlforge")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".mlforgerc")
    }

    /// Layer the given config files over the defaults, in order.
    ///
    /// Missing files are skipped.
    ///
    /// # Errors
    /// Returns `ConfigError` if a config file exists but cannot be read or parsed.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for path in paths {
            match ConfigLayer::load(path) {
                Ok(layer) => config.merge(&layer),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(config)
    }

    /// Discover and load configuration files, then apply the environment.
    ///
    /// Loads configuration from:
    /// 1. Global config (~/.mlforge/config.toml)
    /// 2. Local config (./.mlforgerc)
    /// 3. `MLFORGE_HOST`, `MLFORGE_EMAIL`, `MLFORGE_DEV_KEY`
    ///
    /// Later sources override earlier ones. Missing files are skipped.
    ///
    /// # Errors
    /// Returns `ConfigError` if a config file exists but cannot be read or parsed.
    pub fn discover_and_load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_paths(&[Self::default_global_path(), Self::default_local_path()])?;
        config.apply_env_from(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply every setting present in `layer`.
    pub fn merge(&mut self, layer: &ConfigLayer) {
        if let Some(ref host) = layer.host {
            self.host = Some(host.clone());
        }
        if let Some(ref scheme) = layer.scheme {
            self.scheme = scheme.clone();
        }
        if let Some(ref email) = layer.email {
            self.email = Some(email.clone());
        }
        if let Some(ref dev_key) = layer.dev_key {
            self.dev_key = Some(dev_key.clone());
        }
        if let Some(max_retries) = layer.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(backoff_secs) = layer.backoff_secs {
            self.backoff_secs = backoff_secs;
        }
        if let Some(timeout_secs) = layer.timeout_secs {
            self.timeout_secs = Some(timeout_secs);
        }
        if let Some(part_size) = layer.part_size {
            self.part_size = part_size;
        }
        if let Some(max_concurrency) = layer.max_concurrency {
            self.max_concurrency = max_concurrency;
        }
    }

    /// Override credentials and host from environment-style lookups.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV).filter(|v| !v.is_empty()) {
            self.host = Some(host);
        }
        if let Some(email) = lookup(EMAIL_ENV).filter(|v| !v.is_empty()) {
            self.email = Some(email);
        }
        if let Some(dev_key) = lookup(DEV_KEY_ENV).filter(|v| !v.is_empty()) {
            self.dev_key = Some(dev_key);
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingHost);
        }

        if self.part_size == 0 {
            return Err(ConfigError::InvalidPartSize);
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        Ok(())
    }

    /// `scheme://host`, honouring a scheme already present in `host`.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingHost` if no host is configured.
    pub fn base_url(&self) -> Result<String, ConfigError> {
        let host = self.host.as_deref().filter(|h| !h.is_empty()).ok_or(ConfigError::MissingHost)?;
        let host = host.trim_end_matches('/');
        if host.contains("://") {
            Ok(host.to_string())
        } else {
            Ok(format!("{}://{}", self.scheme, host))
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: Duration::from_secs(self.backoff_secs),
            ..RetryPolicy::default()
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions { part_size: self.part_size, max_concurrency: self.max_concurrency }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.host, None);
        assert_eq!(config.scheme, "https");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.part_size, 64 * 1024 * 1024);
        assert_eq!(config.max_concurrency, 1);
        assert!(matches!(config.validate(), Err(ConfigError::MissingHost)));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_content = r#"
host = "app.example.com"
email = "dev@example.com"
dev_key = "abc"
max_retries = 2
timeout_secs = 30
part_size = 1048576
max_concurrency = 4
"#;
        std::fs::write(&config_path, config_content).unwrap();

        let config = ClientConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.host, Some("app.example.com".to_string()));
        assert_eq!(config.email, Some("dev@example.com".to_string()));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.upload_options().part_size, 1_048_576);
        assert_eq!(config.upload_options().max_concurrency, 4);
        assert_eq!(config.scheme, "https");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_and_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        assert!(matches!(ClientConfig::load_from_file(&missing), Err(ConfigError::NotFound(_))));

        let invalid = temp_dir.path().join("bad.toml");
        std::fs::write(&invalid, "host = [").unwrap();
        assert!(matches!(ClientConfig::load_from_file(&invalid), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_merge() {
        let mut base = ClientConfig {
            host: Some("global.example.com".to_string()),
            email: Some("global@example.com".to_string()),
            max_retries: 3,
            ..ClientConfig::default()
        };
        let local = ConfigLayer {
            host: Some("local.example.com".to_string()),
            part_size: Some(1024),
            ..ConfigLayer::default()
        };

        base.merge(&local);
        assert_eq!(base.host, Some("local.example.com".to_string()));
        assert_eq!(base.email, Some("global@example.com".to_string()));
        assert_eq!(base.max_retries, 3);
        assert_eq!(base.part_size, 1024);
    }

    #[test]
    fn test_merge_restores_default_values() {
        let mut base = ClientConfig {
            scheme: "http".to_string(),
            max_retries: 0,
            max_concurrency: 4,
            ..ClientConfig::default()
        };
        let layer = ConfigLayer {
            scheme: Some("https".to_string()),
            max_retries: Some(5),
            max_concurrency: Some(1),
            ..ConfigLayer::default()
        };

        base.merge(&layer);
        assert_eq!(base.scheme, "https");
        assert_eq!(base.max_retries, 5);
        assert_eq!(base.max_concurrency, 1);
    }

    #[test]
    fn test_local_file_overrides_global_with_default_value() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("config.toml");
        let local = temp_dir.path().join(".mlforgerc");
        std::fs::write(&global, "host = \"global.example.com\"\nmax_concurrency = 4\npart_size = 1024\n").unwrap();
        std::fs::write(&local, "max_concurrency = 1\n").unwrap();

        let config = ClientConfig::load_from_paths(&[global, local]).unwrap();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.part_size, 1024);
        assert_eq!(config.host, Some("global.example.com".to_string()));
    }

    #[test]
    fn test_load_from_paths_skips_missing_files() {
        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join(".mlforgerc");
        std::fs::write(&local, "max_retries = 2\n").unwrap();

        let config = ClientConfig::load_from_paths(&[temp_dir.path().join("missing.toml"), local]).unwrap();
        assert_eq!(config.max_retries, 2);

        let invalid = temp_dir.path().join("bad.toml");
        std::fs::write(&invalid, "max_retries = \"many\"").unwrap();
        assert!(matches!(ClientConfig::load_from_paths(&[invalid]), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_apply_env_overrides_file_values() {
        let env: HashMap<&str, &str> =
            [(HOST_ENV, "env.example.com"), (DEV_KEY_ENV, "env-key"), (EMAIL_ENV, "")].into_iter().collect();

        let mut config = ClientConfig {
            host: Some("file.example.com".to_string()),
            email: Some("file@example.com".to_string()),
            ..ClientConfig::default()
        };
        config.apply_env_from(|name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.host, Some("env.example.com".to_string()));
        assert_eq!(config.dev_key, Some("env-key".to_string()));
        // empty values are ignored
        assert_eq!(config.email, Some("file@example.com".to_string()));
    }

    #[test]
    fn test_base_url() {
        let mut config = ClientConfig { host: Some("app.example.com".to_string()), ..ClientConfig::default() };
        assert_eq!(config.base_url().unwrap(), "https://app.example.com");

        config.scheme = "http".to_string();
        assert_eq!(config.base_url().unwrap(), "http://app.example.com");

        config.host = Some("http://localhost:3000/".to_string());
        config.scheme = "https".to_string();
        assert_eq!(config.base_url().unwrap(), "http://localhost:3000");
    }

    #[test]
    fn test_validate() {
        let mut config = ClientConfig { host: Some("h".to_string()), ..ClientConfig::default() };
        assert!(config.validate().is_ok());

        config.part_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPartSize)));

        config.part_size = 10;
        config.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConcurrency)));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = ClientConfig { max_retries: 1, backoff_secs: 2, ..ClientConfig::default() };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.backoff_factor, Duration::from_secs(2));
        assert_eq!(policy.status_forcelist, vec![502, 503, 504]);
    }

    #[test]
    fn test_config_error_into_artifact_error() {
        let err: ArtifactError = ConfigError::MissingHost.into();
        assert!(matches!(err, ArtifactError::Config(ref msg) if msg.contains("MLFORGE_HOST")));
    }
}

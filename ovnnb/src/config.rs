//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ownership marker written to `external_ids["vendor"]`.
pub const DEFAULT_VENDOR: &str = "kube-ovn";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by every accessor of an [`NbClient`](crate::NbClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Budget for a single select or transaction.
    pub timeout_ms: u64,
    /// Transactions slower than this are logged as a warning.
    pub slow_transaction_ms: u64,
    /// Value stamped into `external_ids["vendor"]` on created records.
    pub vendor: String,
    /// Software version recorded in `NB_Global` after a migration.
    pub version: String,
    /// Serialize create-if-absent calls per (table, key) within this process.
    pub serialize_creates: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 45_000,
            slow_transaction_ms: 1_000,
            vendor: DEFAULT_VENDOR.to_string(),
            version: concat!("v", env!("CARGO_PKG_VERSION")).to_string(),
            serialize_creates: true,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn slow_transaction_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_transaction_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
        }
        if self.vendor.is_empty() {
            return Err(ConfigError::Invalid("vendor must not be empty".to_string()));
        }
        if self.version.is_empty() {
            return Err(ConfigError::Invalid("version must not be empty".to_string()));
        }
        Ok(())
    }

    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(45));
        assert_eq!(config.vendor, "kube-ovn");
        assert!(config.version.starts_with('v'));
        assert!(config.serialize_creates);
        config.validate().unwrap();
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"timeout_ms": 500, "version": "v1.16.0"}}"#).unwrap();

        let config = ClientConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.version, "v1.16.0");
        assert_eq!(config.vendor, DEFAULT_VENDOR);
    }

    #[test]
    fn test_from_json_file_rejects_bad_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"timeout_ms": 0}}"#).unwrap();
        assert!(matches!(
            ClientConfig::from_json_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            ClientConfig::from_json_file("/nonexistent/ovnnb.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}

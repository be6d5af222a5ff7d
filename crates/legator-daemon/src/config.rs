//! Daemon configuration, loaded from a TOML file.
//!
//! Every field has a default so an empty file (or no file at all when the
//! caller opts in) yields a runnable development configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The path that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DaemonConfig {
    /// Address the HTTP API binds to.
    pub listen_addr: SocketAddr,
    /// Path of the JSON account database.
    pub data_file: PathBuf,
    /// Seconds between monitor passes.
    pub poll_interval_secs: u64,
    /// ISO currency code handed to the payout provider.
    pub currency: String,
    /// Built-in provider settings.
    pub providers: ProviderConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_file: PathBuf::from("legator-data/accounts.json"),
            poll_interval_secs: 900,
            currency: "INR".to_string(),
            providers: ProviderConfig::default(),
        }
    }
}

/// Settings for the built-in providers.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProviderConfig {
    /// Balance, in minor currency units, that the simulated sweep reports
    /// for every account.
    pub sweep_pool_minor: u64,
    /// Sender identity stamped on outgoing notifications.
    pub notify_from: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            sweep_pool_minor: 100_000,
            notify_from: "legator@localhost".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid for this schema.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the string is not valid for this
    /// schema.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// The monitor interval as a [`std::time::Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config.poll_interval_secs, 900);
        assert_eq!(config.currency, "INR");
        assert_eq!(config.providers.sweep_pool_minor, 100_000);
        assert_eq!(config.listen_addr.port(), 8080);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = DaemonConfig::from_toml(
            r#"
            listen_addr = "0.0.0.0:9000"
            data_file = "/var/lib/legator/accounts.json"
            poll_interval_secs = 60
            currency = "USD"

            [providers]
            sweep_pool_minor = 250000
            notify_from = "ops@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.currency, "USD");
        assert_eq!(config.providers.sweep_pool_minor, 250_000);
        assert_eq!(config.providers.notify_from, "ops@example.com");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = DaemonConfig::from_toml("listen_adr = \"1.2.3.4:1\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = DaemonConfig::from_file("/nonexistent/legator.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

//! Registry configuration.
//!
//! Configuration is stored as TOML:
//!
//! ```toml
//! max_weight = 100
//! external_timeout_ms = 2000
//!
//! [threshold]
//! kind = "participation"
//! percent = 50
//! ```

use serde::{Deserialize, Serialize};

use std::{path::Path, time::Duration};

use crate::tally::ThresholdRule;

const DEFAULT_EXTERNAL_TIMEOUT_MS: u64 = 5_000;

/// Configuration of a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Global cap on ballot weights, applied on top of per-member caps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_weight: Option<u64>,
    /// Timeout for calls to external services, in milliseconds. Used by registry methods
    /// that do not take an explicit timeout.
    pub external_timeout_ms: u64,
    /// Participation alert rule.
    pub threshold: ThresholdRule,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_weight: None,
            external_timeout_ms: DEFAULT_EXTERNAL_TIMEOUT_MS,
            threshold: ThresholdRule::Participation { percent: 50 },
        }
    }
}

impl RegistryConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the configuration
    /// is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or the configuration is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] on a zero weight cap or timeout, or a threshold
    /// percentage outside of `1..=100`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_weight == Some(0) {
            return Err(ConfigError::Validation(
                "max_weight must be positive".to_owned(),
            ));
        }
        if self.external_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "external_timeout_ms must be positive".to_owned(),
            ));
        }
        if let ThresholdRule::Participation { percent } = self.threshold {
            if !(1..=100).contains(&percent) {
                return Err(ConfigError::Validation(format!(
                    "threshold percent must be in 1..=100, got {percent}"
                )));
            }
        }
        Ok(())
    }

    /// Returns the default timeout for external calls.
    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

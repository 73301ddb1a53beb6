//! # Change Notifier Configuration
//!
//! Layered configuration: built-in defaults, an optional file (TOML, YAML or
//! JSON, picked by extension), then environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use change_notifier::config::NotifierConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NotifierConfig::load(None)?;
//! let poll = config.dispatcher.poll_interval();
//! let table = &config.database.table_name;
//! # Ok(())
//! # }
//! ```
//!
//! Environment variables use the `CHANGE_NOTIFIER` prefix and `__` between
//! sections: `CHANGE_NOTIFIER__DISPATCHER__POLL_INTERVAL_MS=250`.

pub mod error;
pub mod loader;

use crate::constants::{
    DEFAULT_BACKLOG_TABLE, DEFAULT_MAX_CONNECTIONS, DEFAULT_POLL_INTERVAL,
    DEFAULT_SLOW_HANDLER_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Poll loop settings
    pub dispatcher: DispatcherConfig,

    /// Backlog database settings
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub poll_interval_ms: u64,
    pub slow_handler_threshold_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            slow_handler_threshold_ms: DEFAULT_SLOW_HANDLER_THRESHOLD.as_millis() as u64,
        }
    }
}

impl DispatcherConfig {
    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get slow handler threshold as Duration
    pub fn slow_handler_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_handler_threshold_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_slow_handler_threshold(mut self, threshold: Duration) -> Self {
        self.slow_handler_threshold_ms = threshold.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatcher.poll_interval_ms",
                "0",
                "poll interval must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub table_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/change_notifier_development".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            table_name: DEFAULT_BACKLOG_TABLE.to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "max connections must be greater than 0",
            ));
        }

        validate_table_name(&self.table_name)?;
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers are accepted
pub fn validate_table_name(name: &str) -> ConfigResult<()> {
    let valid_identifier = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_identifier {
        return Err(ConfigurationError::invalid_value(
            "database.table_name",
            name.to_string(),
            "table name must be a plain SQL identifier",
        ));
    }
    Ok(())
}

impl NotifierConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.dispatcher.validate()?;
        self.database.validate()?;
        Ok(())
    }
}

//! Configuration Loader
//!
//! Merges defaults, an optional configuration file, and environment variables
//! with the `config` crate, then validates the result.

use super::error::ConfigResult;
use super::NotifierConfig;
use crate::constants::ENV_PREFIX;
use config::{Config, Environment, File};
use std::path::Path;
use tracing::debug;

impl NotifierConfig {
    /// Load configuration using the default environment prefix
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Load configuration with an explicit environment prefix.
    /// This is useful for testing without touching the real prefix.
    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> ConfigResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            debug!("Loading configuration file: {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: NotifierConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            poll_interval_ms = config.dispatcher.poll_interval_ms,
            slow_handler_threshold_ms = config.dispatcher.slow_handler_threshold_ms,
            table = %config.database.table_name,
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}

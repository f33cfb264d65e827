//! Configuration Loader
//!
//! Layers built-in defaults, an optional configuration file and environment
//! overrides into a validated [`RuntimeConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::RuntimeConfig;
use crate::constants::defaults;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Builder-style loader for [`RuntimeConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    require_file: bool,
    env_overrides: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Loader reading `config/flowdeck.*` (if present) and the process environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a specific file; missing files are an error
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self.require_file = true;
        self
    }

    /// Replace the process environment with an explicit map of `FLOWDECK__*` variables
    pub fn with_env_overrides(mut self, vars: HashMap<String, String>) -> Self {
        self.env_overrides = Some(vars);
        self
    }

    /// Load from `path` plus the process environment
    pub fn load_from(path: impl Into<PathBuf>) -> ConfigResult<RuntimeConfig> {
        Self::new().with_file(path).load()
    }

    pub fn load(&self) -> ConfigResult<RuntimeConfig> {
        let mut builder = Config::builder();

        builder = match &self.file {
            Some(path) => {
                if self.require_file && !path.exists() {
                    return Err(ConfigurationError::source_error(
                        path.display().to_string(),
                        "file not found",
                    ));
                }
                builder.add_source(File::from(path.as_path()).required(self.require_file))
            }
            None => builder.add_source(File::with_name(defaults::CONFIG_FILE).required(false)),
        };

        let environment = Environment::with_prefix(defaults::ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(self.env_overrides.clone());
        builder = builder.add_source(environment);

        let config: RuntimeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            queue_capacity = config.queue_capacity,
            poll_interval_ms = config.poll_interval_ms,
            session_timeout_ms = config.session_timeout_ms,
            strict_action_handling = config.strict_action_handling,
            "Runtime configuration loaded"
        );

        Ok(config)
    }
}

//! # Runtime Configuration
//!
//! Settings that shape every device actor: queue bound, poll cadence, session
//! timeout and routing strictness. Values are layered by [`ConfigLoader`] from
//! built-in defaults, an optional file, and `FLOWDECK__*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use flowdeck_core::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! println!("queue capacity: {}", config.queue_capacity);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Per-actor runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bound of each actor's action queue
    pub queue_capacity: usize,

    /// How long the actor blocks on an empty queue before checking session timeout
    pub poll_interval_ms: u64,

    /// Inactivity window for device-originated actions; 0 disables the check
    pub session_timeout_ms: u64,

    /// Action dispatched on session timeout. When unset the session scope is cleared instead.
    pub session_timeout_action: Option<String>,

    /// Fail the dispatch when no route handles an action
    pub strict_action_handling: bool,

    /// Re-send the current screen when a stale action is discarded on an empty queue
    pub refresh_on_sync_mismatch: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::QUEUE_CAPACITY,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            session_timeout_ms: defaults::SESSION_TIMEOUT_MS,
            session_timeout_action: None,
            strict_action_handling: false,
            refresh_on_sync_mismatch: true,
        }
    }
}

impl RuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn session_timeout(&self) -> Option<Duration> {
        (self.session_timeout_ms > 0).then(|| Duration::from_millis(self.session_timeout_ms))
    }

    /// Reject values that would stall or disable an actor
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue_capacity",
                "0",
                "action queue must hold at least one action",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "poll_interval_ms",
                "0",
                "poll interval must be positive",
            ));
        }
        if let Some(action) = &self.session_timeout_action {
            if action.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    "session_timeout_action",
                    action.clone(),
                    "action name must not be blank",
                ));
            }
        }
        Ok(())
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_session_timeout_ms(mut self, session_timeout_ms: u64) -> Self {
        self.session_timeout_ms = session_timeout_ms;
        self
    }

    pub fn with_session_timeout_action(mut self, action: impl Into<String>) -> Self {
        self.session_timeout_action = Some(action.into());
        self
    }

    pub fn with_strict_action_handling(mut self, strict: bool) -> Self {
        self.strict_action_handling = strict;
        self
    }
}

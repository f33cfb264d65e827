//! # Structured Logging Module
//!
//! Environment-aware structured logging for device actors. Console output is
//! human readable by default and switches to JSON with `FLOWDECK_LOG_FORMAT=json`.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("FLOWDECK_LOG")
            .unwrap_or_else(|_| get_log_level(&environment).to_string());
        let json = std::env::var("FLOWDECK_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .json()
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(environment != "production")
                .with_filter(EnvFilter::new(&filter))
                .boxed()
        };

        // A host application may already own the global subscriber
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            filter = %filter,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("FLOWDECK_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for action dispatch
pub fn log_action_operation(
    operation: &str,
    device_id: &str,
    action: &str,
    state: Option<&str>,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        device_id = %device_id,
        action = %action,
        state = state,
        details = details,
        "ACTION_OPERATION"
    );
}

/// Log structured data for state transitions
pub fn log_transition_operation(
    operation: &str,
    device_id: &str,
    from_state: Option<&str>,
    to_state: Option<&str>,
    action: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        device_id = %device_id,
        from_state = from_state,
        to_state = to_state,
        action = %action,
        details = details,
        "TRANSITION_OPERATION"
    );
}

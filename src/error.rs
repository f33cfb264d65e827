//! # Error Types
//!
//! Structured errors for the flow runtime. Configuration faults fail fast,
//! user handler failures are wrapped at the boundary, and malformed or stale
//! input never reaches this type because it is dropped before enqueueing.

use crate::scope::ScopeKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Action queue for device {device} is full (capacity {capacity}), dropped '{action}'")]
    QueueFull {
        device: String,
        action: String,
        capacity: usize,
    },

    #[error("State manager for device {device} is stopped")]
    ActorStopped { device: String },

    #[error("No state config found for state {state} in flow {flow}")]
    NoStateConfig { flow: String, state: String },

    #[error("Flow {flow} has no initial state")]
    NoInitialState { flow: String },

    #[error(
        "Sub-flow {flow} declares return actions {declared:?} and action '{action}' does not pick one"
    )]
    AmbiguousReturnAction {
        flow: String,
        action: String,
        declared: Vec<String>,
    },

    #[error("Conflicting declaration on {owner}: {reason}")]
    ConflictingDeclaration { owner: String, reason: String },

    #[error("No suspended state to return to from {state}")]
    NoSuspendedState { state: String },

    #[error("Failed to inject required {scope} field '{field}' on {target}\n{scope_dump}")]
    InjectionFailed {
        target: String,
        field: String,
        scope: ScopeKind,
        scope_dump: String,
    },

    #[error("Factory cycle while auto-creating '{name}': {chain:?}")]
    FactoryCycle { name: String, chain: Vec<String> },

    #[error("Scope value '{name}' holds {actual}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("No transition step can handle action '{action}' (current step: {step})")]
    TransitionActionRejected { action: String, step: String },

    #[error("Unexpected action '{action}' in state {state}")]
    UnhandledAction { action: String, state: String },

    #[error("Handler {handler} failed: {source}")]
    HandlerFailed {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Handler panicked while processing '{action}': {message}")]
    HandlerPanicked { action: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FlowError {
    pub fn handler_failed(handler: impl Into<String>, source: anyhow::Error) -> Self {
        Self::HandlerFailed {
            handler: handler.into(),
            source,
        }
    }

    /// Configuration faults are unrecoverable for the action that hit them.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            Self::NoStateConfig { .. }
                | Self::NoInitialState { .. }
                | Self::AmbiguousReturnAction { .. }
                | Self::ConflictingDeclaration { .. }
                | Self::NoSuspendedState { .. }
                | Self::Configuration(_)
        )
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;

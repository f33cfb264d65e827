//! # Runtime Constants
//!
//! Reserved action names and defaults shared across the flow runtime.

/// Reserved action names intercepted or synthesized by the runtime
pub mod actions {
    /// Dispatched to the initial state when an actor starts or resets
    pub const STARTUP: &str = "Startup";
    /// Reinitializes the actor; never routed
    pub const RESET: &str = "Reset";
    /// Terminates the actor loop; never routed
    pub const STOP: &str = "Stop";
    /// Carries a domain event to the broadcaster; never routed
    pub const PROCESS_EVENT: &str = "ProcessEvent";
    /// Arrival action for a state re-entered after a cancelled transition
    pub const TRANSITION_CANCELLED: &str = "TransitionCancelled";
    /// Default action dispatched on session timeout when one is configured
    pub const SESSION_TIMEOUT: &str = "SessionTimeout";
}

/// Separator between an action name and its sync id (`Pay@Tender`)
pub const SYNC_ID_SEPARATOR: char = '@';

/// Sync id accepted regardless of the current state
pub const GLOBAL_SYNC_ID: &str = "Global";

pub mod defaults {
    pub const QUEUE_CAPACITY: usize = 1024;
    pub const POLL_INTERVAL_MS: u64 = 1000;
    pub const SESSION_TIMEOUT_MS: u64 = 0;
    pub const CONFIG_FILE: &str = "config/flowdeck";
    pub const ENV_PREFIX: &str = "FLOWDECK";
}

/// Returns true for names the actor loop intercepts before routing
pub fn is_control_action(name: &str) -> bool {
    matches!(
        name,
        actions::RESET | actions::STOP | actions::PROCESS_EVENT
    )
}

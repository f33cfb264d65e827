//! # Device Runtime
//!
//! One actor per device. Each [`StateManager`] owns a bounded action queue
//! drained by a dedicated OS thread; every mutation of the device's
//! application state happens on that thread, one message at a time.
//!
//! ## Architecture
//!
//! ```text
//! do_action ──► bounded queue ──► actor thread ──► router ──► handler / mapping / transition step
//! reset/stop ─► control channel ─┘       │
//!                                        └─► session timeout check on each idle poll
//! ```
//!
//! Enqueueing from inside a handler never recurses into the router: the
//! follow-up action is appended after everything already queued. The
//! handler currently running is recorded so the router can refuse to hand
//! an action straight back to the handler that issued it.
//!
//! [`StateManagerContainer`] is the registry that guarantees one actor per
//! device and tracks parent/child pairings between devices.

mod actor;
pub mod collaborators;
pub mod container;
pub mod env;
pub mod flow_context;
mod router;
pub mod state_manager;

pub use collaborators::{
    ActionObserver, DataProviders, ErrorHandler, NoopScreenService, ScreenService,
    StartupTaskRunner, Toast, UiMessage,
};
pub use container::{ContainerStats, StateManagerContainer};
pub use env::ActorEnv;
pub use flow_context::{FlowContext, ScreenChannel};
pub use state_manager::{ActorSnapshot, ActorStatus, StateManager, StateManagerBuilder};

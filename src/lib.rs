#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Flowdeck Core
//!
//! Per-device flow runtime for networked retail terminals.
//!
//! ## Overview
//!
//! Every terminal (register, customer display, kiosk) is driven by its own
//! actor: a [`StateManager`] owning one action queue and one OS thread. The
//! actor walks a statically configured graph of flow states, entering and
//! leaving nested sub-flows, running pluggable multi-step transitions, and
//! injecting scoped values into the live objects it calls.
//!
//! ## Module Organization
//!
//! - [`models`] - Device identity, topology and the action command model
//! - [`scope`] - Device, Session, Conversation, Flow and Config scopes
//! - [`injection`] - Moving scope values into and out of live objects
//! - [`flow`] - Flow graphs, state types and the per-device application state
//! - [`transition`] - Multi-step transitions between states
//! - [`events`] - Device events and their source-based dispatch
//! - [`runtime`] - Device actors, action routing and the actor registry
//! - [`config`] - Layered runtime configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowdeck_core::{
//!     Action, DeviceKey, FlowConfig, FlowContext, FlowState, Injectable, StateConfig,
//!     StateManager,
//! };
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct Idle;
//! impl Injectable for Idle {}
//! impl FlowState for Idle {
//!     fn arrive(&mut self, _: &Action, _: &mut FlowContext<'_>) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Sale;
//! impl Injectable for Sale {}
//! impl FlowState for Sale {
//!     fn arrive(&mut self, _: &Action, _: &mut FlowContext<'_>) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let flow = FlowConfig::builder("Main")
//!     .initial::<Idle>()
//!     .state(StateConfig::of::<Idle>().map(|s| s.to::<Sale>("Start")))
//!     .state(StateConfig::of::<Sale>())
//!     .build()?;
//!
//! let manager = StateManager::builder(DeviceKey::new("pos", "001"), flow).start()?;
//! manager.do_action(Action::new("Start").from_device())?;
//! manager.await_idle(Duration::from_secs(1))?;
//! assert_eq!(manager.current_state().as_deref(), Some("Sale"));
//! manager.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod flow;
pub mod injection;
pub mod logging;
pub mod models;
pub mod runtime;
pub mod scope;
pub mod transition;
pub mod utils;

pub use config::{ConfigLoader, RuntimeConfig};
pub use error::{FlowError, FlowResult};
pub use events::{DeviceEvent, EventBroadcaster, EventHandlers};
pub use flow::{
    ActionHandlers, FlowConfig, FlowConfigProvider, FlowState, GlobalHandler, StateConfig,
    StaticFlowConfigProvider, SubFlowConfig, TransitionTarget,
};
pub use injection::{Injectable, Injector, Scoped, ScopedField};
pub use models::{Action, DeviceKey, DeviceRelation, DeviceTopology};
pub use runtime::{
    ActionObserver, ActorSnapshot, ActorStatus, DataProviders, ErrorHandler, FlowContext,
    ScreenService, StartupTaskRunner, StateManager, StateManagerContainer, Toast, UiMessage,
};
pub use scope::{ScopeKind, ScopeLayer, ScopeStore, ScopeValue};
pub use transition::{StepOutcome, TransitionInfo, TransitionStep};

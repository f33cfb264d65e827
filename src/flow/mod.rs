//! # Flows
//!
//! Static flow configuration and the live objects built from it.
//!
//! A [`FlowConfig`] is a graph of [`FlowState`] types. Each state declares
//! its action handlers through [`ActionHandlers`] and its event handlers
//! through [`EventHandlers`](crate::events::EventHandlers); the config maps
//! further action names to target states, to sub-flows, or to
//! [`TransitionTarget::CompleteState`] to leave the current sub-flow.

pub mod config;
pub mod context;
pub mod handlers;
pub mod state;

pub use config::{
    FlowConfig, FlowConfigBuilder, FlowConfigProvider, StateConfig, StaticFlowConfigProvider,
    StepFactory, SubFlowConfig, TransitionTarget,
};
pub use context::{ApplicationState, StateContext};
pub use handlers::ActionHandlers;
pub use state::{FlowState, GlobalHandler, GlobalHandlerType, StateType};

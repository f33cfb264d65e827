//! # Transitions
//!
//! Moving between states runs the flow's [`TransitionStep`]s in order. Each
//! step may proceed, wait for further actions, or cancel. Only once every
//! step has proceeded does the target state become current.

pub mod engine;
pub mod step;

pub use engine::{Transition, TransitionKind, TransitionStatus};
pub use step::{StepOutcome, TransitionInfo, TransitionStep};

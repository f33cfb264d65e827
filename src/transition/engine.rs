//! Runs the configured steps of one transition.

use super::step::{StepOutcome, TransitionInfo, TransitionStep};
use crate::error::{FlowError, FlowResult};
use crate::flow::{StateType, SubFlowConfig};
use crate::models::Action;
use crate::runtime::ActorEnv;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where the transition leads once it proceeds. Entering and exiting a
/// sub-flow are distinct variants, so a transition can never do both.
pub enum TransitionKind {
    /// Replace the current state with a new state of the same flow
    ToState(StateType),
    /// Suspend the current context and start `state` inside `sub_flow`
    EnterSubFlow {
        sub_flow: Arc<SubFlowConfig>,
        state: StateType,
    },
    /// Drop the current sub-flow context and resume the suspended parent.
    /// The parent stays on the state stack until the transition completes.
    ExitSubFlow {
        exiting: Arc<SubFlowConfig>,
        resume_state: StateType,
        /// Resolved before any step runs
        return_action: Option<String>,
    },
}

impl TransitionKind {
    pub fn target_name(&self) -> &'static str {
        match self {
            Self::ToState(state) => state.name(),
            Self::EnterSubFlow { state, .. } => state.name(),
            Self::ExitSubFlow { resume_state, .. } => resume_state.name(),
        }
    }
}

impl fmt::Debug for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToState(state) => f.debug_tuple("ToState").field(&state.name()).finish(),
            Self::EnterSubFlow { sub_flow, state } => f
                .debug_struct("EnterSubFlow")
                .field("flow", &sub_flow.flow.name)
                .field("state", &state.name())
                .finish(),
            Self::ExitSubFlow {
                exiting,
                resume_state,
                return_action,
            } => f
                .debug_struct("ExitSubFlow")
                .field("flow", &exiting.flow.name)
                .field("resume", &resume_state.name())
                .field("return_action", return_action)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStatus {
    InProgress,
    Proceed,
    Cancel,
}

/// An in-flight transition. Held by the application state while a step waits.
pub struct Transition {
    kind: TransitionKind,
    info: TransitionInfo,
    steps: Vec<Box<dyn TransitionStep>>,
    current_step: usize,
    status: TransitionStatus,
    queued_action: Option<Action>,
}

impl Transition {
    pub fn new(
        kind: TransitionKind,
        action: Action,
        from_state: Option<&'static str>,
        auto: bool,
        step_candidates: Vec<Box<dyn TransitionStep>>,
    ) -> Self {
        let info = TransitionInfo {
            action,
            from_state,
            to_state: kind.target_name(),
            auto,
            entering_sub_flow: matches!(kind, TransitionKind::EnterSubFlow { .. }),
            exiting_sub_flow: matches!(kind, TransitionKind::ExitSubFlow { .. }),
        };
        let steps = step_candidates
            .into_iter()
            .filter(|step| step.is_applicable(&info))
            .collect();
        Self {
            kind,
            info,
            steps,
            current_step: 0,
            status: TransitionStatus::InProgress,
            queued_action: None,
        }
    }

    pub fn info(&self) -> &TransitionInfo {
        &self.info
    }

    pub fn status(&self) -> TransitionStatus {
        self.status
    }

    pub fn kind(&self) -> &TransitionKind {
        &self.kind
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Name of the step currently waiting, if any
    pub fn waiting_step(&self) -> Option<&'static str> {
        match self.status {
            TransitionStatus::InProgress => self.steps.get(self.current_step).map(|step| step.step_name()),
            _ => None,
        }
    }

    /// Run steps from the first until one waits or cancels
    pub fn begin(&mut self, env: &mut ActorEnv<'_>) -> FlowResult<TransitionStatus> {
        self.current_step = 0;
        self.run_steps(env)?;
        Ok(self.status)
    }

    /// Offer an action to the waiting step
    pub fn handle_action(&mut self, action: &Action, env: &mut ActorEnv<'_>) -> FlowResult<TransitionStatus> {
        let Some(step) = self.steps.get_mut(self.current_step) else {
            return Err(FlowError::TransitionActionRejected {
                action: action.name.clone(),
                step: "<none>".to_string(),
            });
        };
        let name = step.step_name();
        env.inject(&mut **step)?;
        let outcome = {
            let mut context = env.flow_context(action);
            step.handle_action(action, &self.info, &mut context)
        }
        .map_err(|e| FlowError::handler_failed(format!("{name}::handle_action"), e))?;

        match outcome {
            None => {
                return Err(FlowError::TransitionActionRejected {
                    action: action.name.clone(),
                    step: name.to_string(),
                })
            }
            Some(StepOutcome::Proceed) => {
                self.current_step += 1;
                self.run_steps(env)?;
            }
            Some(StepOutcome::Wait) => {
                debug!(step = name, action = %action.name, "Transition step still waiting");
            }
            Some(StepOutcome::Cancel(queued)) => self.cancel(name, queued),
        }
        Ok(self.status)
    }

    fn run_steps(&mut self, env: &mut ActorEnv<'_>) -> FlowResult<()> {
        while let Some(step) = self.steps.get_mut(self.current_step) {
            let name = step.step_name();
            env.inject(&mut **step)?;
            let outcome = {
                let mut context = env.flow_context(&self.info.action);
                step.arrive(&self.info, &mut context)
            }
            .map_err(|e| FlowError::handler_failed(format!("{name}::arrive"), e))?;

            match outcome {
                StepOutcome::Proceed => self.current_step += 1,
                StepOutcome::Wait => {
                    debug!(step = name, to_state = self.info.to_state, "Transition waiting on step");
                    return Ok(());
                }
                StepOutcome::Cancel(queued) => {
                    self.cancel(name, queued);
                    return Ok(());
                }
            }
        }
        self.status = TransitionStatus::Proceed;
        Ok(())
    }

    fn cancel(&mut self, step: &'static str, queued: Option<Action>) {
        debug!(
            step = step,
            to_state = self.info.to_state,
            queued = queued.as_ref().map(|action| action.name.as_str()),
            "Transition cancelled"
        );
        self.status = TransitionStatus::Cancel;
        self.queued_action = queued;
    }

    /// Notify every step that the transition proceeded, with injection before
    /// and outjection after each call
    pub fn after_transition(&mut self, env: &mut ActorEnv<'_>) -> FlowResult<()> {
        for step in &mut self.steps {
            let name = step.step_name();
            env.inject(&mut **step)?;
            {
                let mut context = env.flow_context(&self.info.action);
                step.after_transition(&self.info, &mut context)
            }
            .map_err(|e| FlowError::handler_failed(format!("{name}::after_transition"), e))?;
            env.outject(&mut **step);
        }
        Ok(())
    }

    /// Live steps, for clearing injections when a scope is cleared mid-transition
    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn TransitionStep>> {
        self.steps.iter_mut()
    }

    pub fn into_parts(self) -> (TransitionKind, TransitionInfo, Option<Action>) {
        (self.kind, self.info, self.queued_action)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("kind", &self.kind)
            .field("action", &self.info.action.name)
            .field("status", &self.status)
            .field("current_step", &self.current_step)
            .field("steps", &self.steps.len())
            .finish()
    }
}

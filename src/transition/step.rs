//! Pluggable steps run between leaving a state and arriving at the next.

use crate::injection::Injectable;
use crate::models::Action;
use crate::runtime::FlowContext;
use crate::utils::{simplify, AsAny};

/// What a step decided on arrival or when handed an action
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Continue with the next step
    Proceed,
    /// Stay on this step; later actions are routed to it
    Wait,
    /// Abort the transition. The action, if any, is enqueued once the
    /// source state has been re-arrived.
    Cancel(Option<Action>),
}

/// Read-only description of the transition a step is running for
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    /// Action that triggered the transition
    pub action: Action,
    pub from_state: Option<&'static str>,
    /// Target state, or the resumed parent state when exiting a sub-flow
    pub to_state: &'static str,
    /// Started by the runtime rather than by a mapped action
    pub auto: bool,
    pub entering_sub_flow: bool,
    pub exiting_sub_flow: bool,
}

/// One step of a transition. A fresh instance is created per transition,
/// injected before [`arrive`](Self::arrive) and again before every later
/// call, and outjected after [`after_transition`](Self::after_transition).
pub trait TransitionStep: Injectable + AsAny {
    fn step_name(&self) -> &'static str {
        simplify(self.type_label())
    }

    /// Steps returning false are skipped for this transition
    fn is_applicable(&self, info: &TransitionInfo) -> bool {
        let _ = info;
        true
    }

    fn arrive(&mut self, info: &TransitionInfo, ctx: &mut FlowContext<'_>) -> anyhow::Result<StepOutcome>;

    /// Offered actions that arrive while this step waits. `None` rejects the action.
    fn handle_action(
        &mut self,
        action: &Action,
        info: &TransitionInfo,
        ctx: &mut FlowContext<'_>,
    ) -> anyhow::Result<Option<StepOutcome>> {
        let _ = (action, info, ctx);
        Ok(None)
    }

    /// Runs once every step has proceeded, before the target state arrives
    fn after_transition(&mut self, info: &TransitionInfo, ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
        let _ = (info, ctx);
        Ok(())
    }
}

//! Chooses which handler, mapping or transition answers a dispatched action.

use super::actor::{ActorRuntime, Parts};
use crate::error::{FlowError, FlowResult};
use crate::flow::handlers::ErasedHandler;
use crate::flow::{FlowConfig, FlowState, GlobalHandler, GlobalHandlerType, StateType, TransitionTarget};
use crate::models::{Action, ActionContext, HandlerId};
use crate::transition::TransitionKind;
use std::sync::Arc;
use tracing::{debug, warn};

impl ActorRuntime {
    /// Route one sync-valid action, stopping at the first match
    pub(super) fn route(&mut self, context: &ActionContext) -> FlowResult<()> {
        let action = &context.action;
        let name = action.name.as_str();

        if let Some(global) = self.global_handler_for(name) {
            if context.is_inside_global_handler(global.name()) {
                debug!(handler = global.name(), action = name, "Skipping re-entrant global handler");
            } else {
                return self.invoke_global_handler(&global, action);
            }
        }

        if let Some(transition) = self.app.transition.take() {
            return self.feed_transition(transition, action);
        }

        let Some((flow, state_type)) = self
            .app
            .current
            .as_ref()
            .map(|current| (Arc::clone(&current.flow_config), current.state_type.clone()))
        else {
            return self.unhandled(action, "<none>");
        };
        let owner = state_type.name();

        if let Some(handler) = state_type.handler(name).cloned() {
            let id = HandlerId::state(owner, name);
            if context.is_inside(&id) {
                debug!(handler = %id, "Skipping re-entrant state handler");
            } else {
                return self.invoke_state_handler(id, &handler, action);
            }
        }

        let state_config = flow.state_config(owner)?;
        if let Some(target) = state_config.transitions.get(name) {
            let target = target.clone();
            return self.follow_mapping(&flow, &target, action.clone(), false);
        }
        if let Some(sub_flow) = state_config.sub_flows.get(name) {
            return self.enter_sub_flow(Arc::clone(sub_flow), action.clone(), false);
        }

        if let Some(handler) = state_type.any_action_handler().cloned() {
            let id = HandlerId::any_action(owner);
            if context.is_inside(&id) {
                debug!(handler = %id, action = name, "Skipping re-entrant catch-all handler");
            } else {
                return self.invoke_state_handler(id, &handler, action);
            }
        }

        if let Some(target) = flow.global_transition(name) {
            let target = target.clone();
            return self.follow_mapping(&flow, &target, action.clone(), false);
        }
        if let Some(sub_flow) = flow.global_sub_flow(name) {
            return self.enter_sub_flow(Arc::clone(sub_flow), action.clone(), false);
        }

        self.unhandled(action, owner)
    }

    /// First global handler for `action` in the current flow or any
    /// suspended flow, innermost first
    fn global_handler_for(&self, action: &str) -> Option<GlobalHandlerType> {
        let current = self
            .app
            .current
            .iter()
            .chain(self.app.state_stack.iter().rev())
            .map(|context| &context.flow_config);
        current
            .chain(std::iter::once(&self.flow_config))
            .find_map(|flow| flow.global_handler(action))
            .cloned()
    }

    fn invoke_global_handler(&mut self, global: &GlobalHandlerType, action: &Action) -> FlowResult<()> {
        let Some(handler) = global.handler(&action.name).cloned() else {
            return Ok(());
        };
        let id = HandlerId::global(global.name());
        let mut boxed = global.create();
        let instance: &mut dyn GlobalHandler = &mut *boxed;

        let Parts { mut env, .. } = self.parts();
        env.inject(instance)?;
        env.run_handler(id.clone(), action, |ctx| (*handler)(instance.as_any_mut(), action, ctx))
            .map_err(|e| FlowError::handler_failed(id.to_string(), e))?;
        env.outject(instance);
        Ok(())
    }

    fn invoke_state_handler(&mut self, id: HandlerId, handler: &ErasedHandler, action: &Action) -> FlowResult<()> {
        let Parts { mut env, state, .. } = self.parts();
        let Some(state) = state else {
            return Ok(());
        };
        let state: &mut dyn FlowState = &mut **state;
        env.inject(state)?;
        env.run_handler(id.clone(), action, |ctx| (**handler)(state.as_any_mut(), action, ctx))
            .map_err(|e| FlowError::handler_failed(id.to_string(), e))?;
        env.outject(state);
        Ok(())
    }

    /// Follow a configured mapping of the current flow. `auto` marks
    /// transitions the runtime starts on its own, such as a sub-flow's
    /// return action.
    pub(super) fn follow_mapping(
        &mut self,
        flow: &FlowConfig,
        target: &TransitionTarget,
        action: Action,
        auto: bool,
    ) -> FlowResult<()> {
        match target {
            TransitionTarget::State(state) => {
                let state_type = flow.state_config(state)?.state.clone();
                self.transition_to(state_type, action, auto)
            }
            TransitionTarget::CompleteState => self.exit_sub_flow(action),
        }
    }

    fn transition_to(&mut self, state_type: StateType, action: Action, auto: bool) -> FlowResult<()> {
        self.begin_transition(TransitionKind::ToState(state_type), action, auto)
    }

    fn unhandled(&self, action: &Action, state: &str) -> FlowResult<()> {
        if self.config.strict_action_handling {
            return Err(FlowError::UnhandledAction {
                action: action.name.clone(),
                state: state.to_string(),
            });
        }
        warn!(
            device = %self.manager.device(),
            action = %action.name,
            state = state,
            "No handler, mapping or transition step for action"
        );
        Ok(())
    }
}

//! Live state instances and the per-device application state.

use super::config::{FlowConfig, SubFlowConfig};
use super::state::{FlowState, StateType};
use crate::models::DeviceKey;
use crate::scope::{ConfigScope, FlowScope, ScopeStore};
use crate::transition::Transition;
use std::fmt;
use std::sync::Arc;

/// One live state instance together with the flow it belongs to
pub struct StateContext {
    pub flow_config: Arc<FlowConfig>,
    pub state_type: StateType,
    pub state: Box<dyn FlowState>,
    pub flow_scope: FlowScope,
    /// Set when this context runs inside a sub-flow
    pub sub_flow: Option<Arc<SubFlowConfig>>,
}

impl StateContext {
    pub fn new(
        flow_config: Arc<FlowConfig>,
        state_type: StateType,
        flow_scope: FlowScope,
        sub_flow: Option<Arc<SubFlowConfig>>,
    ) -> Self {
        let state = state_type.create();
        Self {
            flow_config,
            state_type,
            state,
            flow_scope,
            sub_flow,
        }
    }

    pub fn state_name(&self) -> &'static str {
        self.state_type.name()
    }

    /// Config layers visible to this context, sub-flow overrides first
    pub fn config_layers(&self) -> Vec<&ConfigScope> {
        let mut layers = Vec::with_capacity(2);
        if let Some(sub_flow) = &self.sub_flow {
            layers.push(&sub_flow.config);
        }
        layers.push(self.flow_config.config());
        layers
    }
}

impl fmt::Debug for StateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContext")
            .field("flow", &self.flow_config.name)
            .field("state", &self.state_type.name())
            .field("flow_scope", &self.flow_scope.entries())
            .field("in_sub_flow", &self.sub_flow.is_some())
            .finish()
    }
}

/// Everything one actor knows about its device: scopes, the suspended
/// parent contexts, the current context and any transition in flight.
pub struct ApplicationState {
    pub device: DeviceKey,
    pub scopes: Arc<ScopeStore>,
    pub state_stack: Vec<StateContext>,
    pub current: Option<StateContext>,
    pub transition: Option<Transition>,
}

impl ApplicationState {
    pub fn new(device: DeviceKey, scopes: Arc<ScopeStore>) -> Self {
        Self {
            device,
            scopes,
            state_stack: Vec::new(),
            current: None,
            transition: None,
        }
    }

    pub fn current_state_name(&self) -> Option<&'static str> {
        self.current.as_ref().map(StateContext::state_name)
    }

    pub fn stack_depth(&self) -> usize {
        self.state_stack.len()
    }

    pub fn in_transition(&self) -> bool {
        self.transition.is_some()
    }

    /// Drop every context and transition and clear all scopes
    pub fn reset(&mut self) {
        self.transition = None;
        self.current = None;
        self.state_stack.clear();
        self.scopes.clear_all();
    }
}

impl fmt::Debug for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationState")
            .field("device", &self.device)
            .field("current", &self.current)
            .field("state_stack", &self.state_stack)
            .field("in_transition", &self.in_transition())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::StateConfig;
    use crate::injection::Injectable;
    use crate::models::Action;
    use crate::runtime::FlowContext;
    use crate::scope::ScopeLayer;

    #[derive(Default)]
    struct Idle;

    impl Injectable for Idle {}

    impl FlowState for Idle {
        fn arrive(&mut self, _: &Action, _: &mut FlowContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn flow(config: ConfigScope) -> Arc<FlowConfig> {
        FlowConfig::builder("Main")
            .initial::<Idle>()
            .state(StateConfig::of::<Idle>())
            .config(config)
            .build()
            .unwrap()
    }

    #[test]
    fn test_sub_flow_config_shadows_flow_config() {
        let child = flow(ConfigScope::new().with_value("currency", "USD".to_string()));
        let sub_flow = Arc::new(
            SubFlowConfig::new(child.clone())
                .with_config(ConfigScope::new().with_value("currency", "EUR".to_string())),
        );
        let state_type = child.initial_state().unwrap().clone();
        let context = StateContext::new(child, state_type, FlowScope::new(), Some(sub_flow));

        let layers = context.config_layers();
        let currency = layers
            .iter()
            .find_map(|layer| layer.get("currency"))
            .and_then(|value| value.downcast::<String>())
            .unwrap();
        assert_eq!(currency.as_str(), "EUR");
        assert_eq!(context.state_name(), "Idle");
    }

    #[test]
    fn test_reset_clears_everything() {
        let main = flow(ConfigScope::new());
        let scopes = Arc::new(ScopeStore::new());
        scopes.set_value(ScopeLayer::Device, "terminal", 1_u32);

        let mut app = ApplicationState::new(DeviceKey::new("pos", "001"), scopes.clone());
        let state_type = main.initial_state().unwrap().clone();
        app.state_stack.push(StateContext::new(
            main.clone(),
            state_type.clone(),
            FlowScope::new(),
            None,
        ));
        app.current = Some(StateContext::new(main, state_type, FlowScope::new(), None));
        assert_eq!(app.current_state_name(), Some("Idle"));
        assert_eq!(app.stack_depth(), 1);

        app.reset();
        assert_eq!(app.current_state_name(), None);
        assert_eq!(app.stack_depth(), 0);
        assert!(scopes.is_empty());
    }
}

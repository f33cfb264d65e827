//! Static flow configuration: states, transition mappings, sub-flows,
//! global handlers and transition steps.

use super::state::{FlowState, GlobalHandler, GlobalHandlerType, StateType};
use crate::error::{FlowError, FlowResult};
use crate::models::DeviceKey;
use crate::scope::ConfigScope;
use crate::transition::TransitionStep;
use crate::utils::simple_type_name;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where a mapped action leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTarget {
    /// Another state of the same flow, by simple type name
    State(&'static str),
    /// Leave the current sub-flow and resume the suspended parent
    CompleteState,
}

impl TransitionTarget {
    pub fn state<S: FlowState>() -> Self {
        Self::State(simple_type_name::<S>())
    }
}

/// A flow entered as a child of the current state
#[derive(Debug)]
pub struct SubFlowConfig {
    pub flow: Arc<FlowConfig>,
    /// Actions the sub-flow may complete with, as seen by the parent
    pub return_actions: Vec<String>,
    /// Config values overriding the sub-flow's own while it runs
    pub config: ConfigScope,
}

impl SubFlowConfig {
    pub fn new(flow: Arc<FlowConfig>) -> Self {
        Self {
            flow,
            return_actions: Vec::new(),
            config: ConfigScope::new(),
        }
    }

    pub fn with_return_action(mut self, action: impl Into<String>) -> Self {
        self.return_actions.push(action.into());
        self
    }

    pub fn with_config(mut self, config: ConfigScope) -> Self {
        self.config = config;
        self
    }

    /// Return action for the parent when the sub-flow completes with
    /// `completing`: the completing action itself if declared, the only
    /// declared action otherwise, none if nothing is declared.
    pub fn resolve_return_action(&self, completing: &str) -> FlowResult<Option<String>> {
        if self.return_actions.iter().any(|action| action == completing) {
            return Ok(Some(completing.to_string()));
        }
        match self.return_actions.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only.clone())),
            declared => Err(FlowError::AmbiguousReturnAction {
                flow: self.flow.name.clone(),
                action: completing.to_string(),
                declared: declared.to_vec(),
            }),
        }
    }
}

/// Mappings declared for one state
#[derive(Debug, Clone)]
pub struct StateConfig {
    pub state: StateType,
    pub transitions: HashMap<String, TransitionTarget>,
    pub sub_flows: HashMap<String, Arc<SubFlowConfig>>,
}

impl StateConfig {
    pub fn new(state: StateType) -> Self {
        Self {
            state,
            transitions: HashMap::new(),
            sub_flows: HashMap::new(),
        }
    }

    pub fn of<S: FlowState + Default>() -> FlowResult<Self> {
        StateType::of::<S>().map(Self::new)
    }

    pub fn transition(mut self, action: impl Into<String>, target: TransitionTarget) -> Self {
        self.transitions.insert(action.into(), target);
        self
    }

    pub fn to<S: FlowState>(self, action: impl Into<String>) -> Self {
        self.transition(action, TransitionTarget::state::<S>())
    }

    pub fn completes_on(self, action: impl Into<String>) -> Self {
        self.transition(action, TransitionTarget::CompleteState)
    }

    pub fn sub_flow(mut self, action: impl Into<String>, sub_flow: SubFlowConfig) -> Self {
        self.sub_flows.insert(action.into(), Arc::new(sub_flow));
        self
    }
}

pub type StepFactory = Arc<dyn Fn() -> Box<dyn TransitionStep> + Send + Sync>;

/// Named graph of states
pub struct FlowConfig {
    pub name: String,
    initial_state: &'static str,
    states: HashMap<&'static str, StateConfig>,
    global_transitions: HashMap<String, TransitionTarget>,
    global_sub_flows: HashMap<String, Arc<SubFlowConfig>>,
    global_handlers: Vec<GlobalHandlerType>,
    config: ConfigScope,
    transition_steps: Vec<StepFactory>,
}

impl FlowConfig {
    pub fn builder(name: impl Into<String>) -> FlowConfigBuilder {
        FlowConfigBuilder::new(name)
    }

    pub fn initial_state(&self) -> FlowResult<&StateType> {
        self.states
            .get(self.initial_state)
            .map(|config| &config.state)
            .ok_or_else(|| FlowError::NoInitialState {
                flow: self.name.clone(),
            })
    }

    pub fn state_config(&self, state: &str) -> FlowResult<&StateConfig> {
        self.states.get(state).ok_or_else(|| FlowError::NoStateConfig {
            flow: self.name.clone(),
            state: state.to_string(),
        })
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.contains_key(state)
    }

    pub fn global_transition(&self, action: &str) -> Option<&TransitionTarget> {
        self.global_transitions.get(action)
    }

    pub fn global_sub_flow(&self, action: &str) -> Option<&Arc<SubFlowConfig>> {
        self.global_sub_flows.get(action)
    }

    /// First global handler declaring `action`
    pub fn global_handler(&self, action: &str) -> Option<&GlobalHandlerType> {
        self.global_handlers
            .iter()
            .find(|global| global.handler(action).is_some())
    }

    pub fn config(&self) -> &ConfigScope {
        &self.config
    }

    pub fn transition_steps(&self) -> &[StepFactory] {
        &self.transition_steps
    }

    pub fn state_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.states.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowConfig")
            .field("name", &self.name)
            .field("initial_state", &self.initial_state)
            .field("states", &self.state_names())
            .field("global_handlers", &self.global_handlers)
            .field("transition_steps", &self.transition_steps.len())
            .finish()
    }
}

/// Collects a [`FlowConfig`], deferring declaration errors to [`build`](Self::build)
pub struct FlowConfigBuilder {
    name: String,
    initial_state: Option<&'static str>,
    states: Vec<FlowResult<StateConfig>>,
    global_transitions: HashMap<String, TransitionTarget>,
    global_sub_flows: HashMap<String, Arc<SubFlowConfig>>,
    global_handlers: Vec<FlowResult<GlobalHandlerType>>,
    config: ConfigScope,
    transition_steps: Vec<StepFactory>,
}

impl FlowConfigBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: None,
            states: Vec::new(),
            global_transitions: HashMap::new(),
            global_sub_flows: HashMap::new(),
            global_handlers: Vec::new(),
            config: ConfigScope::new(),
            transition_steps: Vec::new(),
        }
    }

    pub fn initial<S: FlowState>(mut self) -> Self {
        self.initial_state = Some(simple_type_name::<S>());
        self
    }

    pub fn state(mut self, state: FlowResult<StateConfig>) -> Self {
        self.states.push(state);
        self
    }

    pub fn global_transition(mut self, action: impl Into<String>, target: TransitionTarget) -> Self {
        self.global_transitions.insert(action.into(), target);
        self
    }

    pub fn global_sub_flow(mut self, action: impl Into<String>, sub_flow: SubFlowConfig) -> Self {
        self.global_sub_flows.insert(action.into(), Arc::new(sub_flow));
        self
    }

    pub fn global_handler<G: GlobalHandler + Default>(mut self) -> Self {
        self.global_handlers.push(GlobalHandlerType::of::<G>());
        self
    }

    pub fn config(mut self, config: ConfigScope) -> Self {
        self.config = config;
        self
    }

    /// Step run, in registration order, on every transition of this flow
    pub fn transition_step<T, F>(mut self, factory: F) -> Self
    where
        T: TransitionStep,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.transition_steps
            .push(Arc::new(move || Box::new(factory()) as Box<dyn TransitionStep>));
        self
    }

    pub fn build(self) -> FlowResult<Arc<FlowConfig>> {
        let mut states = HashMap::new();
        for state in self.states {
            let state = state?;
            let name = state.state.name();
            if states.insert(name, state).is_some() {
                return Err(FlowError::ConflictingDeclaration {
                    owner: name.to_string(),
                    reason: format!("state configured twice in flow {}", self.name),
                });
            }
        }

        let mut global_handlers: Vec<GlobalHandlerType> = Vec::new();
        for global in self.global_handlers {
            let global = global?;
            for action in global.actions() {
                if let Some(existing) = global_handlers.iter().find(|g| g.handler(action).is_some()) {
                    return Err(FlowError::ConflictingDeclaration {
                        owner: global.name().to_string(),
                        reason: format!(
                            "global action {action} already handled by {}",
                            existing.name()
                        ),
                    });
                }
            }
            global_handlers.push(global);
        }

        let initial_state = self.initial_state.ok_or_else(|| FlowError::NoInitialState {
            flow: self.name.clone(),
        })?;
        if !states.contains_key(initial_state) {
            return Err(FlowError::NoStateConfig {
                flow: self.name.clone(),
                state: initial_state.to_string(),
            });
        }

        let mappings = states
            .values()
            .flat_map(|state: &StateConfig| state.transitions.values())
            .chain(self.global_transitions.values());
        for target in mappings {
            if let TransitionTarget::State(name) = target {
                if !states.contains_key(name) {
                    return Err(FlowError::NoStateConfig {
                        flow: self.name.clone(),
                        state: (*name).to_string(),
                    });
                }
            }
        }

        debug!(
            flow = %self.name,
            states = states.len(),
            global_handlers = global_handlers.len(),
            "Built flow config"
        );
        Ok(Arc::new(FlowConfig {
            name: self.name,
            initial_state,
            states,
            global_transitions: self.global_transitions,
            global_sub_flows: self.global_sub_flows,
            global_handlers,
            config: self.config,
            transition_steps: self.transition_steps,
        }))
    }
}

/// Supplies the root flow for a device
pub trait FlowConfigProvider: Send + Sync {
    fn flow_config(&self, device: &DeviceKey) -> Option<Arc<FlowConfig>>;
}

/// Flows keyed by app id, with optional per-device overrides
#[derive(Debug, Default, Clone)]
pub struct StaticFlowConfigProvider {
    by_app: HashMap<String, Arc<FlowConfig>>,
    by_device: HashMap<DeviceKey, Arc<FlowConfig>>,
}

impl StaticFlowConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app_id: impl Into<String>, flow: Arc<FlowConfig>) -> Self {
        self.by_app.insert(app_id.into(), flow);
        self
    }

    pub fn with_device(mut self, device: DeviceKey, flow: Arc<FlowConfig>) -> Self {
        self.by_device.insert(device, flow);
        self
    }
}

impl FlowConfigProvider for StaticFlowConfigProvider {
    fn flow_config(&self, device: &DeviceKey) -> Option<Arc<FlowConfig>> {
        self.by_device
            .get(device)
            .or_else(|| self.by_app.get(&device.app_id))
            .cloned()
    }
}

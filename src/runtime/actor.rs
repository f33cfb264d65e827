//! The actor loop: owns the application state and processes one message
//! at a time on the actor's thread.

use super::collaborators::{ErrorHandler, ScreenService, StartupTaskRunner};
use super::env::ActorEnv;
use super::flow_context::ScreenChannel;
use super::state_manager::{
    ActorChannels, ActorMessage, ActorStatus, ControlMessage, StateManager,
};
use crate::config::RuntimeConfig;
use crate::constants::actions;
use crate::error::{FlowError, FlowResult};
use crate::events::{DeviceEvent, EventBroadcaster, EventTarget};
use crate::flow::{
    ApplicationState, FlowConfig, FlowState, StateContext, StateType, SubFlowConfig,
};
use crate::injection::Injector;
use crate::logging::{log_action_operation, log_transition_operation};
use crate::models::{Action, ActionContext};
use crate::scope::{ConfigScope, FlowScope, ScopeLayer};
use crate::transition::{Transition, TransitionKind, TransitionStatus, TransitionStep};
use chrono::Utc;
use crossbeam::channel::{select, Receiver, TryRecvError};
use serde_json::json;
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Borrowed pieces of the runtime for one call into user code
pub(super) struct Parts<'a> {
    pub(super) env: ActorEnv<'a>,
    pub(super) state: Option<&'a mut Box<dyn FlowState>>,
    pub(super) state_type: Option<&'a StateType>,
}

pub(crate) struct ActorRuntime {
    pub(super) manager: StateManager,
    actions: Receiver<ActorMessage>,
    control: Receiver<ControlMessage>,
    pub(super) config: RuntimeConfig,
    pub(super) flow_config: Arc<FlowConfig>,
    pub(super) app: ApplicationState,
    injector: Arc<Injector>,
    broadcaster: EventBroadcaster,
    screens: ScreenChannel,
    startup: Option<Arc<dyn StartupTaskRunner>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    pending_clears: Vec<ScopeLayer>,
    last_interaction: Instant,
    session_active: bool,
    dequeued: u64,
    processed: u64,
    discarded: u64,
    last_fault: Option<String>,
}

impl ActorRuntime {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        manager: StateManager,
        channels: ActorChannels,
        config: RuntimeConfig,
        flow_config: Arc<FlowConfig>,
        injector: Arc<Injector>,
        broadcaster: EventBroadcaster,
        screens: Arc<dyn ScreenService>,
        startup: Option<Arc<dyn StartupTaskRunner>>,
        error_handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Self {
        let device = manager.device().clone();
        let app = ApplicationState::new(device.clone(), manager.scopes());
        Self {
            actions: channels.actions,
            control: channels.control,
            config,
            flow_config,
            app,
            injector,
            broadcaster,
            screens: ScreenChannel::new(device, screens),
            startup,
            error_handler,
            pending_clears: Vec::new(),
            last_interaction: Instant::now(),
            session_active: false,
            dequeued: 0,
            processed: 0,
            discarded: 0,
            last_fault: None,
            manager,
        }
    }

    pub(crate) fn run(mut self) {
        *self.manager.shared.actor_thread.lock() = Some(thread::current().id());
        info!(
            device = %self.manager.device(),
            flow = %self.flow_config.name,
            "State manager started"
        );

        self.start_flow();
        self.manager.shared.set_status(ActorStatus::Running);
        self.publish_snapshot();

        let poll_interval = self.config.poll_interval();
        let (actions, control) = (self.actions.clone(), self.control.clone());
        loop {
            // Control messages are checked first so a full queue cannot delay them
            match control.try_recv() {
                Ok(message) => {
                    if self.handle_control(message).is_break() {
                        break;
                    }
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            select! {
                recv(control) -> message => match message {
                    Ok(message) => {
                        if self.handle_control(message).is_break() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(actions) -> message => match message {
                    Ok(message) => self.handle_message(message),
                    Err(_) => break,
                },
                default(poll_interval) => self.check_session_timeout(),
            }
        }

        self.shutdown();
    }

    fn handle_control(&mut self, message: ControlMessage) -> ControlFlow<()> {
        let dropped = self.drain_queue();
        match message {
            ControlMessage::Stop => {
                info!(device = %self.manager.device(), dropped = dropped, "Stopping state manager");
                ControlFlow::Break(())
            }
            ControlMessage::Reset => {
                info!(device = %self.manager.device(), dropped = dropped, "Resetting state manager");
                self.manager.shared.set_status(ActorStatus::Resetting);
                self.app.reset();
                self.screens.clear();
                self.pending_clears.clear();
                self.session_active = false;
                self.start_flow();
                self.manager.shared.set_status(ActorStatus::Running);
                self.publish_snapshot();
                ControlFlow::Continue(())
            }
        }
    }

    fn drain_queue(&mut self) -> usize {
        let mut dropped = 0;
        for message in self.actions.try_iter() {
            self.manager.shared.take_message(&message);
            dropped += 1;
        }
        dropped
    }

    fn shutdown(&mut self) {
        let dropped = self.drain_queue();
        self.app.transition = None;
        self.app.current = None;
        self.app.state_stack.clear();
        self.manager.shared.set_status(ActorStatus::Stopped);
        self.publish_snapshot();
        info!(device = %self.manager.device(), dropped = dropped, "State manager stopped");
    }

    /// Run startup tasks and transition into the flow's initial state
    fn start_flow(&mut self) {
        let result = self.initialize();
        if let Err(e) = result {
            self.report(e, None);
        }
    }

    fn initialize(&mut self) -> FlowResult<()> {
        if let Some(startup) = self.startup.clone() {
            startup
                .run(self.manager.device(), &self.app.scopes)
                .map_err(|e| FlowError::handler_failed("StartupTaskRunner", e))?;
        }
        let initial = self.flow_config.initial_state()?.clone();
        self.begin_transition(TransitionKind::ToState(initial), Action::new(actions::STARTUP), true)
    }

    fn handle_message(&mut self, message: ActorMessage) {
        self.dequeued += 1;
        self.manager.shared.take_message(&message);
        let action = match &message {
            ActorMessage::Dispatch(context) => Some(context.action.clone()),
            _ => None,
        };

        match catch_unwind(AssertUnwindSafe(|| self.process(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(e, action),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                let error = FlowError::HandlerPanicked {
                    action: action
                        .as_ref()
                        .map_or_else(|| "<control>".to_string(), |a| a.name.clone()),
                    message,
                };
                self.pending_clears.clear();
                // The suspended parent of an exiting sub-flow is still on the stack
                if self.app.transition.take().is_some() {
                    warn!(device = %self.manager.device(), "Abandoning transition after panic");
                }
                self.report(error, action);
            }
        }
        // Checked here too, so frequent non-device traffic cannot starve it
        self.check_session_timeout();
        self.publish_snapshot();
    }

    fn process(&mut self, message: ActorMessage) -> FlowResult<()> {
        match message {
            ActorMessage::Dispatch(context) => self.dispatch(context),
            ActorMessage::Event(event) => self.process_event(&*event),
            ActorMessage::ClearScope(layer) => {
                self.clear_scope(layer);
                Ok(())
            }
            ActorMessage::RefreshScreen => {
                self.screens.refresh();
                Ok(())
            }
            ActorMessage::Barrier(ack) => {
                let _ = ack.send(self.dequeued);
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, context: ActionContext) -> FlowResult<()> {
        if context.action.originates_from_device {
            self.last_interaction = Instant::now();
            self.session_active = true;
        }

        let current = self.app.current_state_name();
        if !context.is_sync_valid(current) {
            self.discarded += 1;
            info!(
                device = %self.manager.device(),
                action = %context.action.name,
                sync_id = ?context.sync_id,
                state = current,
                "Discarding action issued against another state"
            );
            let queue_empty = self.manager.shared.pending_actions.load(Ordering::Acquire) == 0;
            if self.config.refresh_on_sync_mismatch && queue_empty {
                self.screens.refresh();
            }
            return Ok(());
        }

        self.processed += 1;
        log_action_operation(
            "dispatch",
            &self.manager.device().to_string(),
            &context.action.name,
            current,
            None,
        );
        let result = self.route(&context);
        self.apply_pending_clears();
        result
    }

    fn apply_pending_clears(&mut self) {
        for layer in std::mem::take(&mut self.pending_clears) {
            self.clear_scope(layer);
        }
    }

    /// Clear a layer and reset matching injections on every live object
    pub(super) fn clear_scope(&mut self, layer: ScopeLayer) {
        let cleared = self.app.scopes.clear(layer);
        let injector = &self.injector;
        for layer in cleared {
            let kind = layer.kind();
            let contexts = self.app.current.iter_mut().chain(self.app.state_stack.iter_mut());
            for context in contexts {
                injector.reset_injections(&mut *context.state, kind);
            }
            if let Some(transition) = self.app.transition.as_mut() {
                for step in transition.steps_mut() {
                    injector.reset_injections(&mut **step, kind);
                }
            }
        }
        info!(device = %self.manager.device(), layer = %layer, "Cleared scope");
    }

    fn check_session_timeout(&mut self) {
        let Some(timeout) = self.config.session_timeout() else {
            return;
        };
        if !self.session_active || self.last_interaction.elapsed() < timeout {
            return;
        }
        self.session_active = false;

        match self.config.session_timeout_action.clone() {
            Some(name) => {
                info!(device = %self.manager.device(), action = %name, "Session timed out");
                if let Err(e) = self.manager.do_action(Action::new(name)) {
                    self.report(e, None);
                }
            }
            None => {
                info!(device = %self.manager.device(), "Session timed out, clearing session scope");
                self.clear_scope(ScopeLayer::Session);
                self.publish_snapshot();
            }
        }
    }

    fn process_event(&mut self, event: &dyn DeviceEvent) -> FlowResult<()> {
        let topology = self.manager.topology();
        let broadcaster = self.broadcaster.clone();
        let action = Action::new(actions::PROCESS_EVENT).with_data(json!({
            "event": event.event_name(),
            "source": event.source(),
        }));

        let Parts {
            mut env,
            state,
            state_type,
        } = self.parts();
        let (Some(state), Some(state_type)) = (state, state_type) else {
            debug!(event = event.event_name(), "No current state to receive event");
            return Ok(());
        };
        let state: &mut dyn FlowState = &mut **state;
        env.inject(state)?;
        let delivered = {
            let mut context = env.flow_context(&action);
            broadcaster.post(
                &topology,
                EventTarget {
                    table: state_type.event_handlers(),
                    owner: state.as_any_mut(),
                },
                event,
                &mut context,
            )
        };
        env.outject(state);
        debug!(
            state = state_type.name(),
            event = event.event_name(),
            delivered = delivered,
            "Processed event"
        );
        drop(env);
        self.apply_pending_clears();
        Ok(())
    }

    /// Split the runtime into an environment bound to the current context
    /// and that context's state
    pub(super) fn parts(&mut self) -> Parts<'_> {
        let (flow_scope, config, state, state_type): (
            Option<&mut FlowScope>,
            Vec<&ConfigScope>,
            _,
            _,
        ) = match self.app.current {
            Some(StateContext {
                ref flow_config,
                ref state_type,
                ref mut state,
                ref mut flow_scope,
                ref sub_flow,
            }) => {
                let mut config = Vec::with_capacity(2);
                if let Some(sub_flow) = sub_flow {
                    config.push(&sub_flow.config);
                }
                config.push(flow_config.config());
                (Some(flow_scope), config, Some(state), Some(state_type))
            }
            None => (None, Vec::new(), None, None),
        };

        Parts {
            env: ActorEnv {
                manager: &self.manager,
                store: &self.app.scopes,
                injector: &self.injector,
                screens: &mut self.screens,
                pending_clears: &mut self.pending_clears,
                flow_scope,
                config,
            },
            state,
            state_type,
        }
    }

    /// Steps configured on the flow the current context belongs to
    fn transition_steps(&self) -> Vec<Box<dyn TransitionStep>> {
        let flow = self
            .app
            .current
            .as_ref()
            .map_or(&self.flow_config, |context| &context.flow_config);
        flow.transition_steps()
            .iter()
            .map(|factory| (**factory)())
            .collect()
    }

    pub(super) fn begin_transition(
        &mut self,
        kind: TransitionKind,
        action: Action,
        auto: bool,
    ) -> FlowResult<()> {
        let from = self.app.current_state_name();
        log_transition_operation(
            "begin",
            &self.manager.device().to_string(),
            from,
            Some(kind.target_name()),
            &action.name,
            auto.then_some("auto"),
        );
        let steps = self.transition_steps();
        let mut transition = Transition::new(kind, action, from, auto, steps);
        let result = {
            let Parts { mut env, .. } = self.parts();
            transition.begin(&mut env)
        };
        match result {
            Ok(_) => self.settle_transition(transition),
            Err(e) => {
                self.abandon_transition(transition);
                Err(e)
            }
        }
    }

    /// Offer an action to the waiting transition
    pub(super) fn feed_transition(&mut self, mut transition: Transition, action: &Action) -> FlowResult<()> {
        let result = {
            let Parts { mut env, .. } = self.parts();
            transition.handle_action(action, &mut env)
        };
        match result {
            Ok(_) => self.settle_transition(transition),
            Err(e @ FlowError::TransitionActionRejected { .. }) => {
                self.app.transition = Some(transition);
                Err(e)
            }
            Err(e) => {
                self.abandon_transition(transition);
                Err(e)
            }
        }
    }

    fn settle_transition(&mut self, transition: Transition) -> FlowResult<()> {
        match transition.status() {
            TransitionStatus::InProgress => {
                self.app.transition = Some(transition);
                Ok(())
            }
            TransitionStatus::Proceed => self.complete_transition(transition),
            TransitionStatus::Cancel => self.cancel_transition(transition),
        }
    }

    /// Drop a failed transition. An exiting sub-flow's parent was never
    /// popped, so the stack is left as it was.
    fn abandon_transition(&mut self, transition: Transition) {
        let info = transition.info();
        warn!(
            device = %self.manager.device(),
            action = %info.action.name,
            to_state = info.to_state,
            "Abandoning failed transition"
        );
    }

    fn complete_transition(&mut self, mut transition: Transition) -> FlowResult<()> {
        let after = {
            let Parts { mut env, .. } = self.parts();
            transition.after_transition(&mut env)
        };
        if let Err(e) = after {
            self.abandon_transition(transition);
            return Err(e);
        }

        let (kind, info, _) = transition.into_parts();
        log_transition_operation(
            "complete",
            &self.manager.device().to_string(),
            info.from_state,
            Some(info.to_state),
            &info.action.name,
            None,
        );
        let action = info.action;

        match kind {
            TransitionKind::ToState(state_type) => {
                let context = match self.app.current.take() {
                    Some(previous) => StateContext::new(
                        previous.flow_config,
                        state_type,
                        previous.flow_scope,
                        previous.sub_flow,
                    ),
                    None => StateContext::new(
                        Arc::clone(&self.flow_config),
                        state_type,
                        FlowScope::new(),
                        None,
                    ),
                };
                self.arrive(context, &action)
            }
            TransitionKind::EnterSubFlow { sub_flow, state } => {
                let parent = self.app.current.take();
                let flow_scope = parent
                    .as_ref()
                    .map(|parent| parent.flow_scope.clone())
                    .unwrap_or_default();
                if let Some(parent) = parent {
                    self.app.state_stack.push(parent);
                }
                let context = StateContext::new(Arc::clone(&sub_flow.flow), state, flow_scope, Some(sub_flow));
                self.arrive(context, &action)
            }
            TransitionKind::ExitSubFlow { return_action, .. } => {
                let Some(resume) = self.app.state_stack.pop() else {
                    return Err(FlowError::NoSuspendedState {
                        state: self.app.current_state_name().unwrap_or("<none>").to_string(),
                    });
                };
                self.app.current = Some(resume);
                match return_action {
                    Some(name) => self.deliver_return_action(action.follow_up(name)),
                    None => self.rearrive_current(&action),
                }
            }
        }
    }

    /// Route a sub-flow's return action within the resumed parent state
    fn deliver_return_action(&mut self, action: Action) -> FlowResult<()> {
        let Some((flow, state_name)) = self
            .app
            .current
            .as_ref()
            .map(|context| (Arc::clone(&context.flow_config), context.state_name()))
        else {
            return Ok(());
        };
        debug!(state = state_name, action = %action.name, "Delivering sub-flow return action");

        let state_config = flow.state_config(state_name)?;
        let target = state_config
            .transitions
            .get(&action.name)
            .or_else(|| flow.global_transition(&action.name))
            .cloned();
        if let Some(target) = target {
            return self.follow_mapping(&flow, &target, action, true);
        }
        let sub_flow = state_config
            .sub_flows
            .get(&action.name)
            .or_else(|| flow.global_sub_flow(&action.name))
            .cloned();
        match sub_flow {
            Some(sub_flow) => self.enter_sub_flow(sub_flow, action, true),
            None => self.rearrive_current(&action),
        }
    }

    fn cancel_transition(&mut self, transition: Transition) -> FlowResult<()> {
        let (_, info, queued) = transition.into_parts();
        log_transition_operation(
            "cancel",
            &self.manager.device().to_string(),
            info.from_state,
            Some(info.to_state),
            &info.action.name,
            queued.as_ref().map(|action| action.name.as_str()),
        );

        let cancelled = info.action.follow_up(actions::TRANSITION_CANCELLED);
        if self.app.current.is_some() {
            self.rearrive_current(&cancelled)?;
        } else {
            warn!(device = %self.manager.device(), "Initial transition cancelled; no state to return to");
        }
        if let Some(queued) = queued {
            self.manager.do_action(queued)?;
        }
        Ok(())
    }

    pub(super) fn arrive(&mut self, context: StateContext, action: &Action) -> FlowResult<()> {
        self.app.current = Some(context);
        self.rearrive_current(action)
    }

    /// Inject the current state and call its arrival hook
    pub(super) fn rearrive_current(&mut self, action: &Action) -> FlowResult<()> {
        let Parts {
            mut env,
            state,
            state_type,
        } = self.parts();
        let (Some(state), Some(state_type)) = (state, state_type) else {
            return Ok(());
        };
        let name = state_type.name();
        let state: &mut dyn FlowState = &mut **state;
        env.inject(state)?;
        {
            let mut context = env.flow_context(action);
            state.arrive(action, &mut context)
        }
        .map_err(|e| FlowError::handler_failed(format!("{name}::arrive"), e))?;
        env.outject(state);
        debug!(state = name, action = %action.name, "Arrived");
        Ok(())
    }

    pub(super) fn enter_sub_flow(
        &mut self,
        sub_flow: Arc<SubFlowConfig>,
        action: Action,
        auto: bool,
    ) -> FlowResult<()> {
        let state = sub_flow.flow.initial_state()?.clone();
        self.begin_transition(TransitionKind::EnterSubFlow { sub_flow, state }, action, auto)
    }

    /// Start leaving the current sub-flow. The return action is resolved
    /// before any step runs; the parent is popped only once the exit completes.
    pub(super) fn exit_sub_flow(&mut self, action: Action) -> FlowResult<()> {
        let current = self.app.current_state_name().unwrap_or("<none>");
        let exiting = self.app.current.as_ref().and_then(|context| context.sub_flow.clone());
        let resume_state = self.app.state_stack.last().map(|context| context.state_type.clone());
        let (Some(exiting), Some(resume_state)) = (exiting, resume_state) else {
            return Err(FlowError::NoSuspendedState {
                state: current.to_string(),
            });
        };
        let return_action = exiting.resolve_return_action(&action.name)?;
        let kind = TransitionKind::ExitSubFlow {
            exiting,
            resume_state,
            return_action,
        };
        self.begin_transition(kind, action, false)
    }

    pub(super) fn report(&mut self, error: FlowError, action: Option<Action>) {
        self.last_fault = Some(error.to_string());
        match &self.error_handler {
            Some(handler) => handler.handle_error(self.manager.device(), action.as_ref(), &error),
            None => error!(
                device = %self.manager.device(),
                action = action.as_ref().map(|a| a.name.as_str()),
                configuration_fault = error.is_configuration_fault(),
                error = %error,
                "Error processing action"
            ),
        }
    }

    fn publish_snapshot(&self) {
        let mut snapshot = self.manager.shared.snapshot.write();
        snapshot.flow = self
            .app
            .current
            .as_ref()
            .map(|context| context.flow_config.name.clone());
        snapshot.current_state = self.app.current_state_name().map(str::to_string);
        snapshot.stack_depth = self.app.stack_depth();
        snapshot.in_transition = self.app.in_transition();
        snapshot.waiting_step = self
            .app
            .transition
            .as_ref()
            .and_then(Transition::waiting_step)
            .map(str::to_string);
        snapshot.last_screen = self
            .screens
            .last_screen()
            .map(|screen| screen.screen_type.clone());
        snapshot.processed_actions = self.processed;
        snapshot.discarded_actions = self.discarded;
        snapshot.last_fault = self.last_fault.clone();
        snapshot.updated_at = Utc::now();
    }
}

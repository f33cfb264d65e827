//! The device actor handle and its startup.
//!
//! A [`StateManager`] is a cheap, cloneable handle to one device's actor.
//! The actor owns a dedicated OS thread that drains a bounded action queue
//! one message at a time; every call on the handle only enqueues.

use super::actor::ActorRuntime;
use super::collaborators::{
    ActionObserver, ErrorHandler, NoopScreenService, ScreenService, StartupTaskRunner,
};
use crate::config::RuntimeConfig;
use crate::constants::actions;
use crate::error::{FlowError, FlowResult};
use crate::events::{DeviceEvent, EventBroadcaster};
use crate::flow::FlowConfig;
use crate::injection::Injector;
use crate::models::{
    split_sync_id, Action, ActionContext, DeviceKey, DeviceTopology, HandlerId, HandlerOrigin,
};
use crate::scope::{ScopeLayer, ScopeStore};
use chrono::{DateTime, Utc};
use crossbeam::channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Messages processed in queue order
pub(crate) enum ActorMessage {
    Dispatch(ActionContext),
    Event(Arc<dyn DeviceEvent>),
    ClearScope(ScopeLayer),
    RefreshScreen,
    /// Acknowledged with the number of messages dequeued so far
    Barrier(Sender<u64>),
}

/// Messages that jump the queue and discard it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlMessage {
    Reset,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    Starting,
    Running,
    Resetting,
    Stopped,
}

impl fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Resetting => write!(f, "resetting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time view of an actor, published after every message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub device: DeviceKey,
    pub status: ActorStatus,
    pub flow: Option<String>,
    pub current_state: Option<String>,
    pub stack_depth: usize,
    pub in_transition: bool,
    pub waiting_step: Option<String>,
    pub last_screen: Option<String>,
    pub processed_actions: u64,
    pub discarded_actions: u64,
    pub last_fault: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ActorSnapshot {
    pub(crate) fn new(device: DeviceKey) -> Self {
        Self {
            device,
            status: ActorStatus::Starting,
            flow: None,
            current_state: None,
            stack_depth: 0,
            in_transition: false,
            waiting_step: None,
            last_screen: None,
            processed_actions: 0,
            discarded_actions: 0,
            last_fault: None,
            updated_at: Utc::now(),
        }
    }
}

/// State shared between the handle and the actor thread
pub(crate) struct ActorShared {
    pub(crate) device: DeviceKey,
    pub(crate) topology: RwLock<DeviceTopology>,
    pub(crate) actions: Sender<ActorMessage>,
    pub(crate) control: Sender<ControlMessage>,
    pub(crate) capacity: usize,
    /// Queued `Dispatch` messages, barriers and control work excluded
    pub(crate) pending_actions: AtomicUsize,
    pub(crate) actor_thread: Mutex<Option<ThreadId>>,
    pub(crate) executing: Mutex<Option<HandlerId>>,
    pub(crate) snapshot: RwLock<ActorSnapshot>,
    pub(crate) observers: RwLock<Vec<Arc<dyn ActionObserver>>>,
    pub(crate) scopes: Arc<ScopeStore>,
    pub(crate) join: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct ActorChannels {
    pub(crate) actions: Receiver<ActorMessage>,
    pub(crate) control: Receiver<ControlMessage>,
}

impl ActorShared {
    pub(crate) fn new(
        topology: DeviceTopology,
        capacity: usize,
        observers: Vec<Arc<dyn ActionObserver>>,
    ) -> (Arc<Self>, ActorChannels) {
        let (action_tx, action_rx) = bounded(capacity);
        let (control_tx, control_rx) = unbounded();
        let device = topology.device.clone();
        let shared = Arc::new(Self {
            snapshot: RwLock::new(ActorSnapshot::new(device.clone())),
            device,
            topology: RwLock::new(topology),
            actions: action_tx,
            control: control_tx,
            capacity,
            pending_actions: AtomicUsize::new(0),
            actor_thread: Mutex::new(None),
            executing: Mutex::new(None),
            observers: RwLock::new(observers),
            scopes: Arc::new(ScopeStore::new()),
            join: Mutex::new(None),
        });
        let channels = ActorChannels {
            actions: action_rx,
            control: control_rx,
        };
        (shared, channels)
    }

    /// Account for a dequeued or discarded message
    pub(crate) fn take_message(&self, message: &ActorMessage) {
        if matches!(message, ActorMessage::Dispatch(_)) {
            self.pending_actions.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn set_status(&self, status: ActorStatus) {
        let mut snapshot = self.snapshot.write();
        snapshot.status = status;
        snapshot.updated_at = Utc::now();
    }
}

/// Handle to one device's actor
#[derive(Clone)]
pub struct StateManager {
    pub(crate) shared: Arc<ActorShared>,
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("device", &self.shared.device)
            .field("status", &self.status())
            .field("queued", &self.queue_len())
            .finish()
    }
}

impl StateManager {
    pub fn builder(device: DeviceKey, flow_config: Arc<FlowConfig>) -> StateManagerBuilder {
        StateManagerBuilder::new(device, flow_config)
    }

    pub fn device(&self) -> &DeviceKey {
        &self.shared.device
    }

    /// Enqueue an action. A `Name@State` suffix limits it to that state;
    /// `Reset` and `Stop` are intercepted as control messages.
    pub fn do_action(&self, action: Action) -> FlowResult<()> {
        if action.name.trim().is_empty() {
            warn!(device = %self.shared.device, "Dropping action without a name");
            return Err(FlowError::InvalidAction("action name is empty".to_string()));
        }
        if self.status() == ActorStatus::Stopped {
            return Err(self.stopped());
        }

        if split_sync_id(&action.name).0.trim().is_empty() {
            warn!(device = %self.shared.device, action = %action.name, "Dropping action with only a sync id");
            return Err(FlowError::InvalidAction(
                "action name is empty before its sync id".to_string(),
            ));
        }

        for observer in self.shared.observers.read().iter() {
            observer.on_action(&self.shared.device, &action);
        }

        let mut context = ActionContext::new(action, self.current_origin());
        context.action.last_known_queue_size = self.shared.actions.len();

        match context.action.name.as_str() {
            actions::RESET => self.send_control(ControlMessage::Reset),
            actions::STOP => self.send_control(ControlMessage::Stop),
            actions::PROCESS_EVENT => {
                warn!(device = %self.shared.device, "ProcessEvent requires an event payload");
                Err(FlowError::InvalidAction(
                    "ProcessEvent is reserved; use post_event".to_string(),
                ))
            }
            _ => {
                let name = context.action.name.clone();
                self.enqueue(ActorMessage::Dispatch(context), &name)
            }
        }
    }

    /// Enqueue a device event for the current state's event handlers
    pub fn post_event(&self, event: Arc<dyn DeviceEvent>) -> FlowResult<()> {
        let label = event.event_name();
        self.enqueue(ActorMessage::Event(event), label)
    }

    /// Discard queued work and restart the flow from its initial state
    pub fn reset(&self) -> FlowResult<()> {
        self.send_control(ControlMessage::Reset)
    }

    /// Discard queued work and terminate the actor thread. Waits for the
    /// thread to exit unless called from the actor itself.
    pub fn stop(&self) -> FlowResult<()> {
        if self.status() == ActorStatus::Stopped {
            return Ok(());
        }
        // A disconnected control channel means the actor already exited
        let _ = self.shared.control.send(ControlMessage::Stop);
        if self.on_actor_thread() {
            return Ok(());
        }
        if let Some(handle) = self.shared.join.lock().take() {
            if handle.join().is_err() {
                warn!(device = %self.shared.device, "Actor thread exited by panic");
            }
        }
        self.shared.set_status(ActorStatus::Stopped);
        Ok(())
    }

    /// Clear a scope layer on the actor thread, in queue order
    pub fn clear_scope(&self, layer: ScopeLayer) -> FlowResult<()> {
        self.enqueue(ActorMessage::ClearScope(layer), "ClearScope")
    }

    /// Re-send the last screen shown, in queue order
    pub fn refresh_screen(&self) -> FlowResult<()> {
        self.enqueue(ActorMessage::RefreshScreen, "RefreshScreen")
    }

    /// Block until the queue has drained, or `timeout` elapses. Returns
    /// false on timeout and always false when called from the actor thread.
    pub fn await_idle(&self, timeout: Duration) -> FlowResult<bool> {
        if self.on_actor_thread() {
            warn!(device = %self.shared.device, "await_idle called from the actor thread");
            return Ok(false);
        }
        let deadline = Instant::now() + timeout;
        let mut previous: Option<u64> = None;
        loop {
            let (ack_tx, ack_rx) = bounded(1);
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.shared.actions.send_timeout(ActorMessage::Barrier(ack_tx), remaining) {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => return Ok(false),
                Err(SendTimeoutError::Disconnected(_)) => return Err(self.stopped()),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match ack_rx.recv_timeout(remaining) {
                // Nothing ran between two consecutive barriers
                Ok(sequence) if previous.is_some_and(|prev| sequence == prev + 1) => return Ok(true),
                Ok(sequence) => previous = Some(sequence),
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                // Barrier discarded by a reset or stop
                Err(RecvTimeoutError::Disconnected) => {
                    if self.status() == ActorStatus::Stopped {
                        return Err(self.stopped());
                    }
                    previous = None;
                }
            }
        }
    }

    pub fn snapshot(&self) -> ActorSnapshot {
        self.shared.snapshot.read().clone()
    }

    pub fn status(&self) -> ActorStatus {
        self.shared.snapshot.read().status
    }

    pub fn current_state(&self) -> Option<String> {
        self.shared.snapshot.read().current_state.clone()
    }

    /// The device's scope store. Safe to read from any thread.
    pub fn scopes(&self) -> Arc<ScopeStore> {
        Arc::clone(&self.shared.scopes)
    }

    pub fn topology(&self) -> DeviceTopology {
        self.shared.topology.read().clone()
    }

    pub fn set_topology(&self, topology: DeviceTopology) {
        *self.shared.topology.write() = topology;
    }

    pub fn add_observer(&self, observer: Arc<dyn ActionObserver>) {
        self.shared.observers.write().push(observer);
    }

    pub fn queue_len(&self) -> usize {
        self.shared.actions.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.capacity
    }

    fn on_actor_thread(&self) -> bool {
        *self.shared.actor_thread.lock() == Some(thread::current().id())
    }

    /// The handler running on this actor's own thread, if the caller is it
    fn current_origin(&self) -> HandlerOrigin {
        if !self.on_actor_thread() {
            return HandlerOrigin::None;
        }
        self.shared
            .executing
            .lock()
            .clone()
            .map_or(HandlerOrigin::None, HandlerOrigin::Handler)
    }

    fn enqueue(&self, message: ActorMessage, label: &str) -> FlowResult<()> {
        let is_action = matches!(message, ActorMessage::Dispatch(_));
        if is_action {
            self.shared.pending_actions.fetch_add(1, Ordering::AcqRel);
        }
        let result = self.shared.actions.try_send(message);
        if result.is_err() && is_action {
            self.shared.pending_actions.fetch_sub(1, Ordering::AcqRel);
        }
        match result {
            Ok(()) => {
                debug!(device = %self.shared.device, action = %label, "Enqueued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    device = %self.shared.device,
                    action = %label,
                    capacity = self.shared.capacity,
                    "Action queue full, dropping"
                );
                Err(FlowError::QueueFull {
                    device: self.shared.device.to_string(),
                    action: label.to_string(),
                    capacity: self.shared.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(self.stopped()),
        }
    }

    fn send_control(&self, message: ControlMessage) -> FlowResult<()> {
        debug!(device = %self.shared.device, control = ?message, "Control message");
        self.shared
            .control
            .send(message)
            .map_err(|_| self.stopped())
    }

    fn stopped(&self) -> FlowError {
        FlowError::ActorStopped {
            device: self.shared.device.to_string(),
        }
    }

    /// Handle with no actor thread behind it, for unit tests
    #[cfg(test)]
    pub(crate) fn detached(device: DeviceKey) -> Self {
        let (shared, _channels) = ActorShared::new(DeviceTopology::standalone(device), 8, Vec::new());
        Self { shared }
    }
}

/// Collects an actor's collaborators and starts its thread
pub struct StateManagerBuilder {
    device: DeviceKey,
    flow_config: Arc<FlowConfig>,
    config: RuntimeConfig,
    topology: Option<DeviceTopology>,
    injector: Arc<Injector>,
    screens: Arc<dyn ScreenService>,
    startup: Option<Arc<dyn StartupTaskRunner>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    observers: Vec<Arc<dyn ActionObserver>>,
    broadcaster: EventBroadcaster,
}

impl StateManagerBuilder {
    pub fn new(device: DeviceKey, flow_config: Arc<FlowConfig>) -> Self {
        Self {
            device,
            flow_config,
            config: RuntimeConfig::default(),
            topology: None,
            injector: Arc::new(Injector::new()),
            screens: Arc::new(NoopScreenService),
            startup: None,
            error_handler: None,
            observers: Vec::new(),
            broadcaster: EventBroadcaster::new(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_topology(mut self, topology: DeviceTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn with_injector(mut self, injector: Arc<Injector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn with_screen_service(mut self, screens: Arc<dyn ScreenService>) -> Self {
        self.screens = screens;
        self
    }

    pub fn with_startup_task(mut self, startup: Arc<dyn StartupTaskRunner>) -> Self {
        self.startup = Some(startup);
        self
    }

    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = Some(error_handler);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ActionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: EventBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Spawn the actor thread. The initial state is entered on that thread.
    pub fn start(self) -> FlowResult<StateManager> {
        self.config.validate()?;

        let topology = match self.topology {
            Some(topology) if topology.device == self.device => topology,
            Some(topology) => {
                return Err(FlowError::Configuration(format!(
                    "topology for {} given to actor for {}",
                    topology.device, self.device
                )))
            }
            None => DeviceTopology::standalone(self.device.clone()),
        };
        let (shared, channels) = ActorShared::new(topology, self.config.queue_capacity, self.observers);
        let manager = StateManager { shared };

        let runtime = ActorRuntime::new(
            manager.clone(),
            channels,
            self.config,
            self.flow_config,
            self.injector,
            self.broadcaster,
            self.screens,
            self.startup,
            self.error_handler,
        );
        let handle = thread::Builder::new()
            .name(format!("flowdeck-{}", self.device))
            .spawn(move || runtime.run())
            .map_err(|e| FlowError::Configuration(format!("failed to spawn actor thread: {e}")))?;
        *manager.shared.join.lock() = Some(handle);

        info!(device = %self.device, "State manager spawned");
        Ok(manager)
    }
}

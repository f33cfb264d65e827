//! # State Manager Container
//!
//! Registry of live device actors. Guarantees at most one actor per device
//! identity and keeps the parent/child pairing between devices. Pairings
//! are stored as identities only; the live actor on either side is looked
//! up on demand.
//!
//! A single lock guards the registry. Creation, lookup and removal are rare
//! next to per-actor action traffic, and actors are never stopped while the
//! lock is held.

use super::collaborators::{ActionObserver, ErrorHandler, NoopScreenService, ScreenService, StartupTaskRunner};
use super::state_manager::{ActorStatus, StateManager};
use crate::config::RuntimeConfig;
use crate::error::{FlowError, FlowResult};
use crate::events::{DeviceEvent, EventBroadcaster};
use crate::flow::FlowConfigProvider;
use crate::injection::Injector;
use crate::models::{DeviceKey, DeviceTopology};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Registry {
    managers: HashMap<DeviceKey, StateManager>,
    /// child -> parent
    parents: HashMap<DeviceKey, DeviceKey>,
}

impl Registry {
    fn topology(&self, device: &DeviceKey) -> DeviceTopology {
        let mut topology = DeviceTopology::standalone(device.clone());
        topology.parent = self.parents.get(device).cloned();
        let mut children: Vec<_> = self
            .parents
            .iter()
            .filter(|(_, parent)| *parent == device)
            .map(|(child, _)| child.clone())
            .collect();
        children.sort();
        topology.children = children;
        topology
    }

    fn refresh_topology(&self, device: &DeviceKey) {
        if let Some(manager) = self.managers.get(device) {
            manager.set_topology(self.topology(device));
        }
    }

    fn live(&self, device: &DeviceKey) -> Option<StateManager> {
        self.managers
            .get(device)
            .filter(|manager| manager.status() != ActorStatus::Stopped)
            .cloned()
    }
}

/// Summary of the container's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStats {
    pub actors: usize,
    pub running: usize,
    pub pairings: usize,
}

/// Creates, finds and removes device actors
pub struct StateManagerContainer {
    provider: Arc<dyn FlowConfigProvider>,
    config: RuntimeConfig,
    injector: Arc<Injector>,
    screens: Arc<dyn ScreenService>,
    startup: Option<Arc<dyn StartupTaskRunner>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    observers: Vec<Arc<dyn ActionObserver>>,
    broadcaster: EventBroadcaster,
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for StateManagerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManagerContainer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl StateManagerContainer {
    pub fn new(provider: Arc<dyn FlowConfigProvider>, config: RuntimeConfig) -> Self {
        Self {
            provider,
            config,
            injector: Arc::new(Injector::new()),
            screens: Arc::new(NoopScreenService),
            startup: None,
            error_handler: None,
            observers: Vec::new(),
            broadcaster: EventBroadcaster::new(),
            registry: Mutex::new(Registry::default()),
        }
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

    /// Return the device's live actor, starting one if there is none
    pub fn create_or_retrieve(&self, device: &DeviceKey) -> FlowResult<StateManager> {
        let mut registry = self.registry.lock();
        if let Some(manager) = registry.live(device) {
            return Ok(manager);
        }

        let flow = self.provider.flow_config(device).ok_or_else(|| {
            FlowError::Configuration(format!("no flow configured for device {device}"))
        })?;

        let mut builder = StateManager::builder(device.clone(), flow)
            .with_config(self.config.clone())
            .with_topology(registry.topology(device))
            .with_injector(Arc::clone(&self.injector))
            .with_screen_service(Arc::clone(&self.screens))
            .with_broadcaster(self.broadcaster.clone());
        if let Some(startup) = &self.startup {
            builder = builder.with_startup_task(Arc::clone(startup));
        }
        if let Some(error_handler) = &self.error_handler {
            builder = builder.with_error_handler(Arc::clone(error_handler));
        }
        for observer in &self.observers {
            builder = builder.with_observer(Arc::clone(observer));
        }

        let manager = builder.start()?;
        registry.managers.insert(device.clone(), manager.clone());
        info!(device = %device, actors = registry.managers.len(), "Registered state manager");
        Ok(manager)
    }

    pub fn retrieve(&self, device: &DeviceKey) -> Option<StateManager> {
        self.registry.lock().live(device)
    }

    /// Reset the device's actor. Returns false when there is none.
    pub fn reset(&self, device: &DeviceKey) -> FlowResult<bool> {
        match self.retrieve(device) {
            Some(manager) => manager.reset().map(|()| true),
            None => Ok(false),
        }
    }

    /// Unregister and stop the device's actor. Pairings are kept.
    pub fn remove(&self, device: &DeviceKey) -> FlowResult<bool> {
        let removed = self.registry.lock().managers.remove(device);
        match removed {
            Some(manager) => {
                manager.stop()?;
                info!(device = %device, "Removed state manager");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pair `child` with `parent`, replacing any previous parent of `child`
    pub fn pair(&self, parent: &DeviceKey, child: &DeviceKey) -> FlowResult<()> {
        if parent == child {
            return Err(FlowError::Configuration(format!(
                "device {parent} cannot be paired with itself"
            )));
        }

        let mut registry = self.registry.lock();
        if registry.parents.contains_key(parent) {
            return Err(FlowError::Configuration(format!(
                "device {parent} is itself paired to a parent"
            )));
        }
        if registry.parents.values().any(|existing| existing == child) {
            return Err(FlowError::Configuration(format!(
                "device {child} already has paired children"
            )));
        }

        let previous = registry.parents.insert(child.clone(), parent.clone());
        registry.refresh_topology(parent);
        registry.refresh_topology(child);
        if let Some(previous) = previous.filter(|previous| previous != parent) {
            registry.refresh_topology(&previous);
        }
        debug!(parent = %parent, child = %child, "Paired devices");
        Ok(())
    }

    /// Remove `child`'s pairing; returns its former parent
    pub fn unpair(&self, child: &DeviceKey) -> Option<DeviceKey> {
        let mut registry = self.registry.lock();
        let parent = registry.parents.remove(child)?;
        registry.refresh_topology(&parent);
        registry.refresh_topology(child);
        debug!(parent = %parent, child = %child, "Unpaired devices");
        Some(parent)
    }

    pub fn parent_of(&self, device: &DeviceKey) -> Option<StateManager> {
        let registry = self.registry.lock();
        let parent = registry.parents.get(device)?;
        registry.live(parent)
    }

    pub fn children_of(&self, device: &DeviceKey) -> Vec<StateManager> {
        let registry = self.registry.lock();
        registry
            .topology(device)
            .children
            .iter()
            .filter_map(|child| registry.live(child))
            .collect()
    }

    pub fn topology(&self, device: &DeviceKey) -> DeviceTopology {
        self.registry.lock().topology(device)
    }

    /// Post `event` to every live actor; each decides by its own topology
    /// whether the source concerns it. Returns how many actors accepted it.
    pub fn publish_event(&self, event: Arc<dyn DeviceEvent>) -> usize {
        let managers: Vec<_> = {
            let registry = self.registry.lock();
            registry.managers.values().cloned().collect()
        };
        managers
            .iter()
            .filter(|manager| match manager.post_event(Arc::clone(&event)) {
                Ok(()) => true,
                Err(e) => {
                    warn!(device = %manager.device(), event = event.event_name(), error = %e, "Failed to post event");
                    false
                }
            })
            .count()
    }

    /// Stop and unregister every actor; returns how many were stopped
    pub fn stop_all(&self) -> usize {
        let managers: Vec<_> = self.registry.lock().managers.drain().map(|(_, m)| m).collect();
        let count = managers.len();
        for manager in managers {
            if let Err(e) = manager.stop() {
                warn!(device = %manager.device(), error = %e, "Failed to stop state manager");
            }
        }
        info!(count = count, "Stopped all state managers");
        count
    }

    pub fn len(&self) -> usize {
        self.registry.lock().managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn devices(&self) -> Vec<DeviceKey> {
        let mut devices: Vec<_> = self.registry.lock().managers.keys().cloned().collect();
        devices.sort();
        devices
    }

    pub fn stats(&self) -> ContainerStats {
        let registry = self.registry.lock();
        ContainerStats {
            actors: registry.managers.len(),
            running: registry
                .managers
                .values()
                .filter(|manager| manager.status() == ActorStatus::Running)
                .count(),
            pairings: registry.parents.len(),
        }
    }
}

impl Drop for StateManagerContainer {
    fn drop(&mut self) {
        if !self.registry.get_mut().managers.is_empty() {
            self.stop_all();
        }
    }
}

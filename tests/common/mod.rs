#![allow(dead_code)]
//! # Integration Test Fixtures
//!
//! Shared collaborators and helpers for driving real actors in tests.
//!
//! Every harness seeds a [`Journal`] into the Device scope through a startup
//! task, so states can record what happened to them by declaring a
//! Device-scoped `journal` field (see [`Journaled`]).

pub mod strategies;

use flowdeck_core::{
    Action, ActorStatus, DataProviders, DeviceKey, ErrorHandler, FlowConfig, FlowError, Injectable,
    Injector, RuntimeConfig, ScopeLayer, ScopeStore, ScopeValue, ScopedField, Scoped,
    ScreenService, StartupTaskRunner, StateManager, Toast, UiMessage,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Append-only record of what states, handlers and steps did
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries starting with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Embeddable base giving a state access to the journal
#[derive(Default)]
pub struct Journaled {
    journal: Scoped<Journal>,
}

impl Journaled {
    pub fn record(&self, entry: impl Into<String>) {
        if let Some(journal) = self.journal.get() {
            journal.record(entry);
        }
    }
}

impl Injectable for Journaled {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        vec![ScopedField::device("journal", &mut self.journal)]
    }
}

/// Seeds the journal into the Device scope on start and after every reset
pub struct SeedJournal {
    pub journal: Arc<Journal>,
}

impl StartupTaskRunner for SeedJournal {
    fn run(&self, _device: &DeviceKey, scopes: &ScopeStore) -> anyhow::Result<()> {
        scopes.set(
            ScopeLayer::Device,
            "journal",
            ScopeValue::from_arc(Arc::clone(&self.journal)),
        );
        self.journal.record("startup");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingScreens {
    screens: Mutex<Vec<String>>,
    toasts: Mutex<Vec<String>>,
}

impl RecordingScreens {
    pub fn screens(&self) -> Vec<String> {
        self.screens.lock().clone()
    }

    pub fn toasts(&self) -> Vec<String> {
        self.toasts.lock().clone()
    }
}

impl ScreenService for RecordingScreens {
    fn show_screen(&self, _: &DeviceKey, message: &UiMessage, _: &DataProviders) -> anyhow::Result<()> {
        self.screens.lock().push(message.screen_type.clone());
        Ok(())
    }

    fn show_toast(&self, _: &DeviceKey, toast: &Toast) -> anyhow::Result<()> {
        self.toasts.lock().push(format!("show:{}", toast.id));
        Ok(())
    }

    fn close_toast(&self, _: &DeviceKey, toast_id: &str) -> anyhow::Result<()> {
        self.toasts.lock().push(format!("close:{toast_id}"));
        Ok(())
    }
}

/// Error handler keeping every error it is handed
#[derive(Debug, Default)]
pub struct RecordingErrors {
    errors: Mutex<Vec<(Option<String>, String)>>,
    configuration_faults: Mutex<usize>,
}

impl RecordingErrors {
    /// Error messages in the order they were reported
    pub fn messages(&self) -> Vec<String> {
        self.errors.lock().iter().map(|(_, message)| message.clone()).collect()
    }

    /// Names of the actions that failed; `None` for non-action work
    pub fn actions(&self) -> Vec<Option<String>> {
        self.errors.lock().iter().map(|(action, _)| action.clone()).collect()
    }

    pub fn configuration_faults(&self) -> usize {
        *self.configuration_faults.lock()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ErrorHandler for RecordingErrors {
    fn handle_error(&self, _: &DeviceKey, action: Option<&Action>, error: &FlowError) {
        if error.is_configuration_fault() {
            *self.configuration_faults.lock() += 1;
        }
        self.errors
            .lock()
            .push((action.map(|action| action.name.clone()), error.to_string()));
    }
}

pub fn device() -> DeviceKey {
    DeviceKey::new("pos", "00100-001")
}

/// Poll fast so session timeout tests stay short
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig::default().with_poll_interval_ms(10)
}

/// A running actor with recording collaborators. Stopped on drop.
pub struct Harness {
    pub manager: StateManager,
    pub journal: Arc<Journal>,
    pub screens: Arc<RecordingScreens>,
    pub errors: Arc<RecordingErrors>,
}

impl Harness {
    pub fn start(flow: Arc<FlowConfig>) -> Self {
        Self::start_with(flow, test_config(), Injector::new())
    }

    pub fn start_with(flow: Arc<FlowConfig>, config: RuntimeConfig, injector: Injector) -> Self {
        let journal = Arc::new(Journal::default());
        let screens = Arc::new(RecordingScreens::default());
        let errors = Arc::new(RecordingErrors::default());
        let manager = StateManager::builder(device(), flow)
            .with_config(config)
            .with_injector(Arc::new(injector))
            .with_screen_service(screens.clone())
            .with_startup_task(Arc::new(SeedJournal {
                journal: Arc::clone(&journal),
            }))
            .with_error_handler(errors.clone())
            .start()
            .expect("actor should start");
        let harness = Self {
            manager,
            journal,
            screens,
            errors,
        };
        harness.idle();
        harness
    }

    /// Enqueue an action and wait until it and its follow-ups ran
    pub fn act(&self, name: &str) {
        self.manager
            .do_action(Action::new(name))
            .expect("action should be accepted");
        self.idle();
    }

    pub fn act_from_device(&self, name: &str) {
        self.manager
            .do_action(Action::new(name).from_device())
            .expect("action should be accepted");
        self.idle();
    }

    pub fn idle(&self) {
        assert!(
            self.manager.await_idle(IDLE_TIMEOUT).expect("actor should be alive"),
            "actor did not become idle"
        );
    }

    pub fn state(&self) -> Option<String> {
        self.manager.current_state()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if self.manager.status() != ActorStatus::Stopped {
            let _ = self.manager.stop();
        }
    }
}

/// Plain state recording `Name:Action` on every arrival and showing a
/// screen named after itself
#[allow(unused_macros)]
macro_rules! journaled_state {
    ($name:ident) => {
        #[derive(Default)]
        pub struct $name {
            base: $crate::common::Journaled,
        }

        impl flowdeck_core::Injectable for $name {
            fn scoped_fields(&mut self) -> Vec<flowdeck_core::ScopedField<'_>> {
                flowdeck_core::Injectable::scoped_fields(&mut self.base)
            }
        }

        impl flowdeck_core::FlowState for $name {
            fn arrive(
                &mut self,
                action: &flowdeck_core::Action,
                ctx: &mut flowdeck_core::FlowContext<'_>,
            ) -> anyhow::Result<()> {
                self.base
                    .record(format!("{}:{}", stringify!($name), action.name));
                ctx.show_screen(
                    flowdeck_core::UiMessage::new(stringify!($name)),
                    flowdeck_core::DataProviders::new(),
                );
                Ok(())
            }
        }
    };
}

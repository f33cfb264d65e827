//! Services the runtime calls out to. All are optional except the screen
//! service, which defaults to a no-op.

use crate::error::FlowError;
use crate::models::{Action, DeviceKey};
use crate::scope::ScopeStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Screen description pushed to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub screen_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl UiMessage {
    pub fn new(screen_type: impl Into<String>) -> Self {
        Self {
            screen_type: screen_type.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Extra named data the device can pull alongside a screen
pub type DataProviders = BTreeMap<String, Value>;

/// Transient notification shown on top of the current screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toast {
    pub id: String,
    pub message: String,
    /// Auto-dismiss after this many milliseconds; `None` stays until closed
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl Toast {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            duration_ms: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Pushes screens to devices. Calls are fire-and-forget: failures are
/// logged and never roll back the transition that caused them.
pub trait ScreenService: Send + Sync {
    fn show_screen(
        &self,
        device: &DeviceKey,
        message: &UiMessage,
        data_providers: &DataProviders,
    ) -> anyhow::Result<()>;

    fn show_toast(&self, device: &DeviceKey, toast: &Toast) -> anyhow::Result<()> {
        let _ = (device, toast);
        Ok(())
    }

    fn close_toast(&self, device: &DeviceKey, toast_id: &str) -> anyhow::Result<()> {
        let _ = (device, toast_id);
        Ok(())
    }
}

/// Screen service for headless actors
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScreenService;

impl ScreenService for NoopScreenService {
    fn show_screen(&self, _: &DeviceKey, _: &UiMessage, _: &DataProviders) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs before the initial state is entered, on start and on every reset.
/// Typically seeds the Device scope.
pub trait StartupTaskRunner: Send + Sync {
    fn run(&self, device: &DeviceKey, scopes: &ScopeStore) -> anyhow::Result<()>;
}

/// Receives errors raised while processing an action. When none is
/// configured errors are logged and the actor carries on.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, device: &DeviceKey, action: Option<&Action>, error: &FlowError);
}

/// Sees every action accepted by `do_action`, before it is enqueued.
/// Called on the enqueuing thread.
pub trait ActionObserver: Send + Sync {
    fn on_action(&self, device: &DeviceKey, action: &Action);
}

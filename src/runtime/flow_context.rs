//! The API handlers see while running on the actor thread.

use super::collaborators::{DataProviders, ScreenService, Toast, UiMessage};
use super::state_manager::StateManager;
use crate::error::FlowResult;
use crate::models::{Action, DeviceKey};
use crate::scope::{FlowScope, ScopeLayer, ScopeStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Screen delivery for one device, remembering the last screen for refreshes
pub struct ScreenChannel {
    device: DeviceKey,
    service: Arc<dyn ScreenService>,
    last_screen: Option<(UiMessage, DataProviders)>,
}

impl ScreenChannel {
    pub fn new(device: DeviceKey, service: Arc<dyn ScreenService>) -> Self {
        Self {
            device,
            service,
            last_screen: None,
        }
    }

    pub fn show(&mut self, message: UiMessage, data_providers: DataProviders) {
        if let Err(e) = self.service.show_screen(&self.device, &message, &data_providers) {
            warn!(device = %self.device, screen = %message.screen_type, error = %e, "Failed to show screen");
        }
        self.last_screen = Some((message, data_providers));
    }

    /// Re-send the last screen. Returns false when nothing has been shown yet.
    pub fn refresh(&mut self) -> bool {
        let Some((message, data_providers)) = &self.last_screen else {
            debug!(device = %self.device, "Nothing to refresh");
            return false;
        };
        debug!(device = %self.device, screen = %message.screen_type, "Refreshing screen");
        if let Err(e) = self.service.show_screen(&self.device, message, data_providers) {
            warn!(device = %self.device, screen = %message.screen_type, error = %e, "Failed to refresh screen");
        }
        true
    }

    pub fn show_toast(&self, toast: &Toast) {
        if let Err(e) = self.service.show_toast(&self.device, toast) {
            warn!(device = %self.device, toast = %toast.id, error = %e, "Failed to show toast");
        }
    }

    pub fn close_toast(&self, toast_id: &str) {
        if let Err(e) = self.service.close_toast(&self.device, toast_id) {
            warn!(device = %self.device, toast = %toast_id, error = %e, "Failed to close toast");
        }
    }

    pub fn last_screen(&self) -> Option<&UiMessage> {
        self.last_screen.as_ref().map(|(message, _)| message)
    }

    pub fn clear(&mut self) {
        self.last_screen = None;
    }
}

/// Handed to states, steps and event handlers for the duration of one call
pub struct FlowContext<'a> {
    pub(crate) action: &'a Action,
    pub(crate) manager: &'a StateManager,
    pub(crate) store: &'a ScopeStore,
    pub(crate) flow_scope: Option<&'a mut FlowScope>,
    pub(crate) screens: &'a mut ScreenChannel,
    pub(crate) pending_clears: &'a mut Vec<ScopeLayer>,
}

impl<'a> FlowContext<'a> {
    pub fn device(&self) -> &DeviceKey {
        self.manager.device()
    }

    /// Action being processed
    pub fn action(&self) -> &Action {
        self.action
    }

    /// Enqueue a follow-up action. It runs after everything already queued.
    pub fn do_action(&self, action: Action) -> FlowResult<()> {
        self.manager.do_action(action)
    }

    pub fn state_manager(&self) -> &StateManager {
        self.manager
    }

    pub fn scopes(&self) -> &ScopeStore {
        self.store
    }

    pub fn flow_scope(&self) -> Option<&FlowScope> {
        self.flow_scope.as_deref()
    }

    pub fn flow_scope_mut(&mut self) -> Option<&mut FlowScope> {
        self.flow_scope.as_deref_mut()
    }

    pub fn show_screen(&mut self, message: UiMessage, data_providers: DataProviders) {
        self.screens.show(message, data_providers);
    }

    pub fn refresh_screen(&mut self) -> bool {
        self.screens.refresh()
    }

    pub fn last_screen(&self) -> Option<&UiMessage> {
        self.screens.last_screen()
    }

    pub fn show_toast(&self, toast: &Toast) {
        self.screens.show_toast(toast);
    }

    pub fn close_toast(&self, toast_id: &str) {
        self.screens.close_toast(toast_id);
    }

    /// Clear Session and Conversation once the current handler returns
    pub fn clear_session(&mut self) {
        self.pending_clears.push(ScopeLayer::Session);
    }

    /// Clear Conversation once the current handler returns
    pub fn clear_conversation(&mut self) {
        self.pending_clears.push(ScopeLayer::Conversation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{with_flow_context, RecordingScreens};

    #[test]
    fn test_refresh_resends_last_screen() {
        let recorder = Arc::new(RecordingScreens::default());
        let mut channel = ScreenChannel::new(DeviceKey::new("pos", "001"), recorder.clone());
        assert!(!channel.refresh());

        channel.show(UiMessage::new("sale"), DataProviders::new());
        assert!(channel.refresh());
        assert_eq!(recorder.screens(), vec!["sale", "sale"]);

        channel.clear();
        assert!(channel.last_screen().is_none());
    }

    #[test]
    fn test_scope_clear_requests_are_deferred() {
        with_flow_context(|context| {
            context.scopes().set_value(ScopeLayer::Session, "user", 1_u32);
            context.clear_session();
            context.clear_conversation();
            assert!(context.scopes().contains(ScopeLayer::Session, "user"));
            assert_eq!(
                *context.pending_clears,
                vec![ScopeLayer::Session, ScopeLayer::Conversation]
            );
        });
    }
}

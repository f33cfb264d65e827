//! Actor start, dispatch, sync-id discard, reset and stop.

#[macro_use]
mod common;

use common::*;
use flowdeck_core::{
    Action, ActionHandlers, ActionObserver, ActorStatus, DataProviders, DeviceKey, FlowConfig,
    FlowContext, FlowError, FlowState, Injectable, ScopeLayer, ScopedField, StateConfig,
    StateManager, Toast, UiMessage,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

journaled_state!(Idle);

#[derive(Default)]
pub struct InProgress {
    base: Journaled,
}

impl Injectable for InProgress {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        self.base.scoped_fields()
    }
}

impl FlowState for InProgress {
    fn arrive(&mut self, action: &Action, ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
        self.base.record(format!("InProgress:{}", action.name));
        ctx.show_screen(UiMessage::new("InProgress"), DataProviders::new());
        Ok(())
    }

    fn register_handlers(handlers: &mut ActionHandlers<Self>) {
        handlers
            .on("Pay", |state, _, ctx| {
                state.base.record("InProgress.Pay");
                ctx.scopes().set_value(ScopeLayer::Session, "paid", true);
                Ok(())
            })
            .on("Notify", |_, _, ctx| {
                ctx.show_toast(&Toast::new("low-paper", "Printer paper is low"));
                ctx.close_toast("low-paper");
                Ok(())
            })
            .on("Slow", |_, _, _| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .on("Explode", |_, _, _| panic!("register drawer jammed"));
    }
}

fn sale_flow() -> Arc<FlowConfig> {
    FlowConfig::builder("Sale")
        .initial::<Idle>()
        .state(StateConfig::of::<Idle>().map(|state| state.to::<InProgress>("Start")))
        .state(StateConfig::of::<InProgress>().map(|state| state.to::<Idle>("Cancel")))
        .build()
        .unwrap()
}

#[test]
fn test_start_pay_and_stale_discard_scenario() {
    let harness = Harness::start(sale_flow());
    assert_eq!(harness.state().as_deref(), Some("Idle"));
    assert_eq!(harness.journal.entries(), vec!["startup", "Idle:Startup"]);

    harness.act("Start");
    assert_eq!(harness.state().as_deref(), Some("InProgress"));

    harness.act("Pay@InProgress");
    assert_eq!(harness.journal.matching("InProgress.Pay").len(), 1);

    // Issued against a screen that is no longer current
    harness.act("Pay@Idle");
    assert_eq!(harness.journal.matching("InProgress.Pay").len(), 1);
    assert_eq!(harness.screens.screens(), vec!["Idle", "InProgress", "InProgress"]);

    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.discarded_actions, 1);
    assert_eq!(snapshot.last_screen.as_deref(), Some("InProgress"));
    assert!(harness.errors.is_empty());
}

#[test]
fn test_global_sync_id_matches_any_state() {
    let harness = Harness::start(sale_flow());
    harness.act("Start");
    harness.act("Pay@Global");
    assert_eq!(harness.journal.matching("InProgress.Pay").len(), 1);
    assert_eq!(harness.manager.snapshot().discarded_actions, 0);
}

#[test]
fn test_invalid_action_names_are_rejected() {
    let harness = Harness::start(sale_flow());

    for name in ["", "   ", "@Idle", "ProcessEvent"] {
        let result = harness.manager.do_action(Action::new(name));
        assert!(
            matches!(result, Err(FlowError::InvalidAction(_))),
            "{name:?} should be rejected"
        );
    }
    harness.idle();
    assert_eq!(harness.manager.snapshot().processed_actions, 0);
}

#[test]
fn test_reset_restarts_from_initial_state() {
    let harness = Harness::start(sale_flow());
    harness.act("Start");
    harness.act("Pay");
    assert!(harness.manager.scopes().contains(ScopeLayer::Session, "paid"));

    harness.manager.reset().unwrap();
    harness.idle();

    assert_eq!(harness.state().as_deref(), Some("Idle"));
    assert!(!harness.manager.scopes().contains(ScopeLayer::Session, "paid"));
    assert_eq!(harness.journal.matching("startup").len(), 2);
    assert_eq!(harness.manager.status(), ActorStatus::Running);

    // Reset through the reserved action name behaves the same
    harness.act("Start");
    harness.act("Reset");
    assert_eq!(harness.state().as_deref(), Some("Idle"));
    assert_eq!(harness.journal.matching("startup").len(), 3);
}

#[test]
fn test_stop_rejects_further_work() {
    let harness = Harness::start(sale_flow());
    harness.manager.stop().unwrap();

    assert_eq!(harness.manager.status(), ActorStatus::Stopped);
    assert!(matches!(
        harness.manager.do_action(Action::new("Start")),
        Err(FlowError::ActorStopped { .. })
    ));
    assert!(harness.manager.await_idle(Duration::from_millis(100)).is_err());
    assert_eq!(harness.manager.current_state(), None);
    // Stopping twice is harmless
    harness.manager.stop().unwrap();
}

#[test]
fn test_toasts_pass_through_to_screen_service() {
    let harness = Harness::start(sale_flow());
    harness.act("Start");
    harness.act("Notify");
    assert_eq!(harness.screens.toasts(), vec!["show:low-paper", "close:low-paper"]);
}

#[test]
fn test_refresh_resends_last_screen() {
    let harness = Harness::start(sale_flow());
    harness.manager.refresh_screen().unwrap();
    harness.idle();
    assert_eq!(harness.screens.screens(), vec!["Idle", "Idle"]);
}

#[test]
fn test_panicking_handler_keeps_actor_alive() {
    let harness = Harness::start(sale_flow());
    harness.act("Start");
    harness.act("Explode");

    let messages = harness.errors.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("register drawer jammed"));
    assert_eq!(harness.errors.actions(), vec![Some("Explode".to_string())]);
    assert!(harness.manager.snapshot().last_fault.is_some());

    harness.act("Pay");
    assert_eq!(harness.journal.matching("InProgress.Pay").len(), 1);
    assert_eq!(harness.manager.status(), ActorStatus::Running);
}

#[test]
fn test_full_queue_is_reported() {
    let harness = Harness::start_with(
        sale_flow(),
        test_config().with_queue_capacity(1),
        flowdeck_core::Injector::new(),
    );
    harness.act("Start");

    harness.manager.do_action(Action::new("Slow")).unwrap();
    let rejected = (0..10)
        .map(|_| harness.manager.do_action(Action::new("Pay")))
        .any(|result| matches!(result, Err(FlowError::QueueFull { capacity: 1, .. })));
    assert!(rejected);
    harness.idle();
}

#[derive(Default)]
struct NameObserver {
    seen: Mutex<Vec<String>>,
}

impl ActionObserver for NameObserver {
    fn on_action(&self, _: &DeviceKey, action: &Action) {
        self.seen.lock().push(action.name.clone());
    }
}

#[test]
fn test_observers_see_accepted_actions() {
    let early = Arc::new(NameObserver::default());
    let late = Arc::new(NameObserver::default());
    let manager = StateManager::builder(device(), sale_flow())
        .with_config(test_config())
        .with_observer(early.clone())
        .with_startup_task(Arc::new(SeedJournal {
            journal: Arc::new(Journal::default()),
        }))
        .start()
        .unwrap();

    manager.do_action(Action::new("Start")).unwrap();
    manager.add_observer(late.clone());
    manager.do_action(Action::new("Cancel@InProgress")).unwrap();
    assert!(manager.do_action(Action::new("")).is_err());
    assert!(manager.await_idle(IDLE_TIMEOUT).unwrap());

    assert_eq!(*early.seen.lock(), vec!["Start", "Cancel@InProgress"]);
    assert_eq!(*late.seen.lock(), vec!["Cancel@InProgress"]);
    assert_eq!(manager.current_state().as_deref(), Some("Idle"));
    manager.stop().unwrap();
}

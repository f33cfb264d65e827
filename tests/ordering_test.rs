//! Queue ordering and follow-up actions issued from handlers.

#[macro_use]
mod common;

use common::*;
use flowdeck_core::{
    Action, ActionHandlers, FlowConfig, FlowContext, FlowState, Injectable, ScopedField,
    StateConfig,
};
use proptest::prelude::*;
use std::sync::Arc;

journaled_state!(Done);

/// Records every action it receives through its catch-all handler
#[derive(Default)]
pub struct Register {
    base: Journaled,
}

impl Injectable for Register {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        self.base.scoped_fields()
    }
}

impl FlowState for Register {
    fn arrive(&mut self, _: &Action, _: &mut FlowContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn register_handlers(handlers: &mut ActionHandlers<Self>) {
        handlers
            .on("Kick", |state, _, ctx| {
                state.base.record("Kick");
                ctx.do_action(Action::new("First"))?;
                ctx.do_action(Action::new("Second"))?;
                Ok(())
            })
            .on("First", |state, _, ctx| {
                state.base.record("First");
                ctx.do_action(Action::new("FollowUp"))?;
                Ok(())
            })
            .on("Echo", |state, action, ctx| {
                state.base.record("Echo");
                ctx.do_action(Action::new("Echo").caused_by(action))?;
                Ok(())
            })
            .on_any(|state, action, _| {
                state.base.record(format!("any:{}", action.name));
                Ok(())
            });
    }
}

fn register_flow() -> Arc<FlowConfig> {
    FlowConfig::builder("Register")
        .initial::<Register>()
        .state(StateConfig::of::<Register>().map(|state| state.to::<Done>("Echo")))
        .state(StateConfig::of::<Done>())
        .build()
        .unwrap()
}

fn routed(harness: &Harness) -> Vec<String> {
    harness
        .journal
        .entries()
        .into_iter()
        .filter(|entry| entry != "startup")
        .collect()
}

#[test]
fn test_follow_up_runs_after_already_queued_actions() {
    let harness = Harness::start(register_flow());
    harness.act("Kick");
    assert_eq!(
        routed(&harness),
        vec!["Kick", "First", "any:Second", "any:FollowUp"]
    );
}

#[test]
fn test_handler_is_not_handed_its_own_follow_up() {
    let harness = Harness::start(register_flow());
    harness.act("Echo");

    // The re-issued Echo skips the handler that issued it and follows the
    // state mapping instead
    assert_eq!(harness.journal.matching("Echo").len(), 1);
    assert_eq!(harness.state().as_deref(), Some("Done"));
    assert_eq!(harness.journal.matching("Done:").len(), 1);
}

#[test]
fn test_actions_from_other_threads_are_not_treated_as_re_entrant() {
    let harness = Harness::start(register_flow());
    // Both external Echo actions reach the state handler; the first
    // follow-up then takes the mapping and the second finds no route in Done
    harness.manager.do_action(Action::new("Echo")).unwrap();
    harness.manager.do_action(Action::new("Echo")).unwrap();
    harness.idle();
    assert_eq!(harness.journal.matching("Echo").len(), 2);
    assert_eq!(harness.state().as_deref(), Some("Done"));
    assert_eq!(harness.journal.matching("Done:").len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Actions enqueued in order are routed in that order
    #[test]
    fn actions_are_routed_in_enqueue_order(
        skus in prop::collection::vec("[A-Z][a-z]{1,6}".prop_map(|n| format!("Sku{n}")), 1..24)
    ) {
        let harness = Harness::start(register_flow());
        for sku in &skus {
            harness.manager.do_action(Action::new(sku.as_str())).unwrap();
        }
        harness.idle();

        let expected: Vec<String> = skus.iter().map(|sku| format!("any:{sku}")).collect();
        prop_assert_eq!(routed(&harness), expected);
    }
}

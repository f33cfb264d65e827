//! Entering and completing nested sub-flows.

#[macro_use]
mod common;

use common::*;
use flowdeck_core::scope::ConfigScope;
use flowdeck_core::{
    Action, ActionHandlers, FlowConfig, FlowContext, FlowState, Injectable, Scoped, ScopedField,
    StateConfig, StepOutcome, SubFlowConfig, TransitionInfo, TransitionStep,
};
use std::sync::Arc;

journaled_state!(Receipt);
journaled_state!(PriceCheck);
journaled_state!(VoucherEntry);

/// Parent state owning the basket id in its flow scope
#[derive(Default)]
pub struct Basket {
    base: Journaled,
}

impl Injectable for Basket {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        self.base.scoped_fields()
    }
}

fn basket_id(ctx: &FlowContext<'_>) -> String {
    ctx.flow_scope()
        .and_then(|scope| scope.get_as::<String>("basket_id"))
        .map_or_else(|| "-".to_string(), |id| id.to_string())
}

impl FlowState for Basket {
    fn arrive(&mut self, action: &Action, _: &mut FlowContext<'_>) -> anyhow::Result<()> {
        self.base.record(format!("Basket:{}", action.name));
        Ok(())
    }

    fn register_handlers(handlers: &mut ActionHandlers<Self>) {
        handlers
            .on("Stash", |_, _, ctx| {
                if let Some(scope) = ctx.flow_scope_mut() {
                    scope.set_value("basket_id", "B-17".to_string());
                }
                Ok(())
            })
            .on("Peek", |state, _, ctx| {
                state.base.record(format!("Basket.Peek basket={}", basket_id(ctx)));
                Ok(())
            });
    }
}

/// First state of the tender sub-flow
#[derive(Default)]
pub struct Cash {
    base: Journaled,
    basket_id: Scoped<String>,
    currency: Scoped<String>,
}

impl Injectable for Cash {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        let mut fields = self.base.scoped_fields();
        fields.push(ScopedField::flow("basket_id", &mut self.basket_id).optional());
        fields.push(ScopedField::config("currency", &mut self.currency).optional());
        fields
    }
}

impl FlowState for Cash {
    fn arrive(&mut self, action: &Action, _: &mut FlowContext<'_>) -> anyhow::Result<()> {
        let basket = self.basket_id.get().map_or("-", String::as_str);
        let currency = self.currency.get().map_or("-", String::as_str);
        self.base
            .record(format!("Cash:{} basket={basket} currency={currency}", action.name));
        Ok(())
    }

    fn register_handlers(handlers: &mut ActionHandlers<Self>) {
        handlers.on("Mutate", |_, _, ctx| {
            if let Some(scope) = ctx.flow_scope_mut() {
                scope.set_value("basket_id", "changed".to_string());
            }
            Ok(())
        });
    }
}

fn tender_flow() -> Arc<FlowConfig> {
    FlowConfig::builder("Tender")
        .initial::<Cash>()
        .state(
            StateConfig::of::<Cash>().map(|state| {
                state
                    .completes_on("Tendered")
                    .completes_on("Done")
                    .completes_on("Voided")
            }),
        )
        .config(ConfigScope::new().with_value("currency", "USD".to_string()))
        .build()
        .unwrap()
}

fn lookup_flow() -> Arc<FlowConfig> {
    FlowConfig::builder("Lookup")
        .initial::<PriceCheck>()
        .state(StateConfig::of::<PriceCheck>().map(|state| state.completes_on("Back")))
        .build()
        .unwrap()
}

fn sale_flow() -> Arc<FlowConfig> {
    let tender = SubFlowConfig::new(tender_flow()).with_return_action("Paid");
    let split = SubFlowConfig::new(tender_flow())
        .with_return_action("Paid")
        .with_return_action("Voided")
        .with_config(ConfigScope::new().with_value("currency", "EUR".to_string()));

    FlowConfig::builder("Sale")
        .initial::<Basket>()
        .state(StateConfig::of::<Basket>().map(|state| {
            state
                .sub_flow("Tender", tender)
                .sub_flow("Split", split)
                .sub_flow("Lookup", SubFlowConfig::new(lookup_flow()))
                .to::<Receipt>("Paid")
                .completes_on("Finish")
        }))
        .state(StateConfig::of::<Receipt>())
        .build()
        .unwrap()
}

#[test]
fn test_sub_flow_round_trip_delivers_return_action() {
    let harness = Harness::start(sale_flow());
    harness.act("Tender");

    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.current_state.as_deref(), Some("Cash"));
    assert_eq!(snapshot.flow.as_deref(), Some("Tender"));
    assert_eq!(snapshot.stack_depth, 1);

    // Tendered is not declared, so the single declared return action is used
    harness.act("Tendered");
    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.current_state.as_deref(), Some("Receipt"));
    assert_eq!(snapshot.flow.as_deref(), Some("Sale"));
    assert_eq!(snapshot.stack_depth, 0);
    assert_eq!(harness.journal.matching("Receipt:"), vec!["Receipt:Paid"]);
    assert!(harness.errors.is_empty());
}

#[test]
fn test_sub_flow_without_return_action_resumes_parent() {
    let harness = Harness::start(sale_flow());
    harness.act("Lookup");
    assert_eq!(harness.state().as_deref(), Some("PriceCheck"));
    assert_eq!(harness.manager.snapshot().stack_depth, 1);

    harness.act("Back");
    assert_eq!(harness.state().as_deref(), Some("Basket"));
    assert_eq!(harness.manager.snapshot().stack_depth, 0);
    assert_eq!(harness.journal.matching("Basket:"), vec!["Basket:Startup", "Basket:Back"]);
}

#[test]
fn test_flow_scope_is_copied_into_sub_flow() {
    let harness = Harness::start(sale_flow());
    harness.act("Stash");
    harness.act("Split");
    assert_eq!(
        harness.journal.matching("Cash:"),
        vec!["Cash:Split basket=B-17 currency=EUR"]
    );

    // Changes inside the sub-flow do not leak back to the parent
    harness.act("Mutate");
    harness.act("Voided");
    assert_eq!(harness.state().as_deref(), Some("Basket"));
    harness.act("Peek");
    assert_eq!(harness.journal.matching("Basket.Peek"), vec!["Basket.Peek basket=B-17"]);
}

#[test]
fn test_sub_flow_config_overrides_flow_config() {
    let plain = Harness::start(sale_flow());
    plain.act("Tender");
    assert_eq!(
        plain.journal.matching("Cash:"),
        vec!["Cash:Tender basket=- currency=USD"]
    );

    let overridden = Harness::start(sale_flow());
    overridden.act("Split");
    assert_eq!(
        overridden.journal.matching("Cash:"),
        vec!["Cash:Split basket=- currency=EUR"]
    );
}

#[test]
fn test_ambiguous_return_action_keeps_sub_flow() {
    let harness = Harness::start(sale_flow());
    harness.act("Split");
    harness.act("Done");

    assert_eq!(harness.errors.configuration_faults(), 1);
    assert!(harness.errors.messages()[0].contains("does not pick one"));
    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.current_state.as_deref(), Some("Cash"));
    assert_eq!(snapshot.stack_depth, 1);

    // A declared return action still completes the sub-flow
    harness.act("Voided");
    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.current_state.as_deref(), Some("Basket"));
    assert_eq!(snapshot.stack_depth, 0);
    assert_eq!(harness.journal.matching("Basket:Voided").len(), 1);
}

#[test]
fn test_completing_top_level_flow_is_a_configuration_fault() {
    let harness = Harness::start(sale_flow());
    harness.act("Finish");

    assert_eq!(harness.errors.configuration_faults(), 1);
    assert!(harness.errors.messages()[0].contains("No suspended state"));
    assert_eq!(harness.state().as_deref(), Some("Basket"));
}

#[test]
fn test_nested_sub_flows_unwind_one_level_at_a_time() {
    let inner = SubFlowConfig::new(lookup_flow());
    let tender = FlowConfig::builder("Tender")
        .initial::<Cash>()
        .state(StateConfig::of::<Cash>().map(|state| {
            state.sub_flow("Lookup", inner).completes_on("Tendered")
        }))
        .build()
        .unwrap();
    let flow = FlowConfig::builder("Sale")
        .initial::<Basket>()
        .state(StateConfig::of::<Basket>().map(|state| {
            state.sub_flow("Tender", SubFlowConfig::new(tender))
        }))
        .build()
        .unwrap();

    let harness = Harness::start(flow);
    harness.act("Tender");
    harness.act("Lookup");
    assert_eq!(harness.manager.snapshot().stack_depth, 2);

    harness.act("Back");
    assert_eq!(harness.state().as_deref(), Some("Cash"));
    assert_eq!(harness.manager.snapshot().stack_depth, 1);

    harness.act("Tendered");
    assert_eq!(harness.state().as_deref(), Some("Basket"));
    assert_eq!(harness.manager.snapshot().stack_depth, 0);
}

/// Runs only when leaving the voucher sub-flow; the scanner jams on `Crash`
#[derive(Default)]
pub struct Redemption {
    base: Journaled,
}

impl Injectable for Redemption {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        self.base.scoped_fields()
    }
}

impl TransitionStep for Redemption {
    fn is_applicable(&self, info: &TransitionInfo) -> bool {
        info.exiting_sub_flow
    }

    fn arrive(&mut self, info: &TransitionInfo, _: &mut FlowContext<'_>) -> anyhow::Result<StepOutcome> {
        if info.action.name == "Crash" {
            panic!("voucher scanner jammed");
        }
        self.base.record(format!("Redemption.arrive {}", info.action.name));
        Ok(StepOutcome::Proceed)
    }
}

/// Records whether each transition of the parent flow was started by the runtime
#[derive(Default)]
pub struct Audit {
    base: Journaled,
}

impl Injectable for Audit {
    fn scoped_fields(&mut self) -> Vec<ScopedField<'_>> {
        self.base.scoped_fields()
    }
}

impl TransitionStep for Audit {
    fn arrive(&mut self, info: &TransitionInfo, _: &mut FlowContext<'_>) -> anyhow::Result<StepOutcome> {
        self.base.record(format!("Audit {} auto={}", info.to_state, info.auto));
        Ok(StepOutcome::Proceed)
    }
}

fn voucher_flow() -> Arc<FlowConfig> {
    FlowConfig::builder("Voucher")
        .initial::<VoucherEntry>()
        .state(StateConfig::of::<VoucherEntry>().map(|state| {
            state
                .completes_on("Crash")
                .completes_on("Redeem")
        }))
        .transition_step(Redemption::default)
        .build()
        .unwrap()
}

fn voucher_sale_flow() -> Arc<FlowConfig> {
    let split = SubFlowConfig::new(voucher_flow())
        .with_return_action("Paid")
        .with_return_action("Voided");

    FlowConfig::builder("Sale")
        .initial::<Basket>()
        .state(StateConfig::of::<Basket>().map(|state| {
            state
                .sub_flow("Voucher", SubFlowConfig::new(voucher_flow()))
                .sub_flow("SplitVoucher", split)
        }))
        .build()
        .unwrap()
}

#[test]
fn test_panicking_exit_step_keeps_parent_suspended() {
    let harness = Harness::start(voucher_sale_flow());
    harness.act("Voucher");
    assert_eq!(harness.manager.snapshot().stack_depth, 1);

    harness.act("Crash");
    assert_eq!(harness.errors.messages().len(), 1);
    assert!(harness.errors.messages()[0].contains("voucher scanner jammed"));
    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.current_state.as_deref(), Some("VoucherEntry"));
    assert_eq!(snapshot.stack_depth, 1);
    assert!(!snapshot.in_transition);

    // The parent is still there to return to
    harness.act("Redeem");
    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.current_state.as_deref(), Some("Basket"));
    assert_eq!(snapshot.stack_depth, 0);
    assert_eq!(harness.journal.matching("Redemption"), vec!["Redemption.arrive Redeem"]);
    assert_eq!(harness.journal.matching("Basket:"), vec!["Basket:Startup", "Basket:Redeem"]);
    assert_eq!(harness.errors.messages().len(), 1);
}

#[test]
fn test_ambiguous_return_action_fails_before_any_step_runs() {
    let harness = Harness::start(voucher_sale_flow());
    harness.act("SplitVoucher");
    harness.act("Redeem");

    assert_eq!(harness.errors.configuration_faults(), 1);
    assert!(harness.journal.matching("Redemption").is_empty());
    let snapshot = harness.manager.snapshot();
    assert_eq!(snapshot.current_state.as_deref(), Some("VoucherEntry"));
    assert_eq!(snapshot.stack_depth, 1);
    assert!(!snapshot.in_transition);
}

#[test]
fn test_return_action_transition_is_automatic() {
    let flow = FlowConfig::builder("Sale")
        .initial::<Basket>()
        .state(StateConfig::of::<Basket>().map(|state| {
            state
                .sub_flow("Tender", SubFlowConfig::new(tender_flow()).with_return_action("Paid"))
                .to::<Receipt>("Paid")
        }))
        .state(StateConfig::of::<Receipt>())
        .transition_step(Audit::default)
        .build()
        .unwrap();

    let harness = Harness::start(flow);
    harness.act("Tender");
    harness.act("Tendered");

    assert_eq!(harness.state().as_deref(), Some("Receipt"));
    assert_eq!(
        harness.journal.matching("Audit"),
        vec![
            "Audit Basket auto=true",
            "Audit Cash auto=false",
            "Audit Receipt auto=true",
        ]
    );
}

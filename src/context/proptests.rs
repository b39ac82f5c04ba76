//! Property-based tests for working memory patches
//!
//! Whatever a model sends as an update, a handler can only move the fields
//! it owns, and a stored document always survives a round trip.

use super::*;
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tag() -> impl Strategy<Value = ContextTag> {
    prop_oneof![
        Just(ContextTag::Front),
        Just(ContextTag::Plan),
        Just(ContextTag::List),
    ]
}

fn arb_status() -> impl Strategy<Value = PlanStatus> {
    prop_oneof![
        Just(PlanStatus::None),
        Just(PlanStatus::Planning),
        Just(PlanStatus::Planned),
        Just(PlanStatus::Executing),
        Just(PlanStatus::Completed),
    ]
}

fn arb_workflow() -> impl Strategy<Value = Option<WorkflowName>> {
    prop_oneof![
        Just(None),
        Just(Some(WorkflowName::PlanWorkflow)),
        Just(Some(WorkflowName::ApplyPlanWorkflow)),
        Just(Some(WorkflowName::ResetContextWorkflow)),
    ]
}

fn arb_info_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        "[a-zA-Z ]{0,12}".prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        proptest::collection::vec("[a-z]{1,5}", 0..3).prop_map(|v| json!(v)),
    ]
}

fn arb_plan_data() -> impl Strategy<Value = PlanData> {
    (
        arb_status(),
        proptest::option::of("[a-zA-Z ]{1,30}"),
        arb_workflow(),
    )
        .prop_map(|(status, plan, workflow_name)| PlanData {
            status,
            plan,
            workflow_name,
        })
}

fn arb_memory() -> impl Strategy<Value = ContextMemory> {
    (
        arb_tag(),
        "[a-zA-Z ]{0,20}",
        proptest::collection::btree_map("[a-z_]{1,10}", arb_info_value(), 0..4),
        arb_plan_data(),
    )
        .prop_map(|(current_context, user_intent, infos, plan_data)| ContextMemory {
            current_context,
            user_intent,
            current_info_list: infos
                .into_iter()
                .map(|(name, value)| InfoItem { name, value })
                .collect(),
            plan_data,
        })
}

/// A raw update mixing owned and foreign keys
fn arb_raw_update() -> impl Strategy<Value = Value> {
    (
        proptest::option::of(arb_tag()),
        proptest::option::of("[a-z ]{0,10}"),
        proptest::collection::vec(("[a-z_]{1,8}", arb_info_value()), 0..3),
        proptest::option::of(arb_plan_data()),
    )
        .prop_map(|(tag, intent, infos, plan_data)| {
            let mut update = serde_json::Map::new();
            if let Some(tag) = tag {
                update.insert("currentContext".into(), json!(tag));
            }
            if let Some(intent) = intent {
                update.insert("userIntent".into(), json!(intent));
            }
            if !infos.is_empty() {
                let items: Vec<Value> = infos
                    .into_iter()
                    .map(|(name, value)| json!({ "name": name, "value": value }))
                    .collect();
                update.insert("currentInfoList".into(), Value::Array(items));
            }
            if let Some(plan_data) = plan_data {
                update.insert("planData".into(), json!(plan_data));
            }
            Value::Object(update)
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_front_patch_never_touches_plan_fields(
        memory in arb_memory(),
        update in arb_raw_update(),
    ) {
        let scoped = ContextPatch::parse(ContextTag::Front, &update).unwrap();
        let mut patched = memory.clone();
        if scoped.patch.apply(&mut patched).is_ok() {
            prop_assert_eq!(&patched.current_info_list, &memory.current_info_list);
            prop_assert_eq!(&patched.plan_data, &memory.plan_data);
        }
    }

    #[test]
    fn prop_plan_patch_never_switches_context(
        memory in arb_memory(),
        update in arb_raw_update(),
    ) {
        let scoped = ContextPatch::parse(ContextTag::Plan, &update).unwrap();
        let mut patched = memory.clone();
        let _ = scoped.patch.apply(&mut patched);
        prop_assert_eq!(patched.current_context, memory.current_context);
        prop_assert_eq!(&patched.user_intent, &memory.user_intent);
    }

    #[test]
    fn prop_list_patch_is_noop(memory in arb_memory(), update in arb_raw_update()) {
        let scoped = ContextPatch::parse(ContextTag::List, &update).unwrap();
        let mut patched = memory.clone();
        scoped.patch.apply(&mut patched).unwrap();
        prop_assert_eq!(patched, memory);
    }

    #[test]
    fn prop_failed_apply_leaves_memory_untouched(
        tag in arb_tag(),
        memory in arb_memory(),
        update in arb_raw_update(),
    ) {
        let scoped = ContextPatch::parse(tag, &update).unwrap();
        let mut patched = memory.clone();
        if scoped.patch.apply(&mut patched).is_err() {
            prop_assert_eq!(patched, memory);
        }
    }

    #[test]
    fn prop_no_handler_writes_plan_data(
        tag in arb_tag(),
        memory in arb_memory(),
        update in arb_raw_update(),
    ) {
        let scoped = ContextPatch::parse(tag, &update).unwrap();
        let mut patched = memory.clone();
        let _ = scoped.patch.apply(&mut patched);
        prop_assert_eq!(&patched.plan_data, &memory.plan_data);
    }

    #[test]
    fn prop_patched_memory_stays_valid(
        tag in arb_tag(),
        memory in arb_memory(),
        update in arb_raw_update(),
    ) {
        let scoped = ContextPatch::parse(tag, &update).unwrap();
        let mut patched = memory;
        if scoped.patch.apply(&mut patched).is_ok() {
            let raw = patched.to_json().unwrap();
            prop_assert_eq!(ContextMemory::from_json(&raw).unwrap(), patched);
        }
    }
}

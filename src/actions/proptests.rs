//! Property-based tests for action guards

use super::*;
use crate::context::{InfoItem, PlanData, PlanStatus};
use proptest::prelude::*;
use serde_json::{json, Value};

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

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        Just(json!("")),
        Just(json!([])),
        "[a-z]{1,6}".prop_map(Value::from),
        any::<u16>().prop_map(Value::from),
    ]
}

fn arb_memory() -> impl Strategy<Value = ContextMemory> {
    (
        arb_tag(),
        proptest::collection::btree_map(
            prop_oneof![
                Just("business_target".to_string()),
                Just("business_goal".to_string()),
                Just("method".to_string()),
                Just("customer_profile".to_string()),
            ],
            arb_value(),
            0..4,
        ),
        arb_status(),
    )
        .prop_map(|(current_context, infos, status)| ContextMemory {
            current_context,
            user_intent: String::new(),
            current_info_list: infos
                .into_iter()
                .map(|(name, value)| InfoItem { name, value })
                .collect(),
            plan_data: PlanData {
                status,
                ..PlanData::default()
            },
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_guards_are_deterministic_and_pure(tag in arb_tag(), memory in arb_memory()) {
        let before = memory.clone();
        let first: Vec<&str> = available_actions(tag, &memory).iter().map(|a| a.id).collect();
        let second: Vec<&str> = available_actions(tag, &memory).iter().map(|a| a.id).collect();
        prop_assert_eq!(first, second);
        prop_assert_eq!(memory, before);
    }

    #[test]
    fn prop_invoke_agrees_with_availability(tag in arb_tag(), memory in arb_memory()) {
        let available: Vec<&str> = available_actions(tag, &memory).iter().map(|a| a.id).collect();
        for action in definition(tag).actions {
            let result = invoke(tag, action.id, &memory);
            prop_assert_eq!(result.is_ok(), available.contains(&action.id));
        }
    }

    #[test]
    fn prop_plan_unreachable_with_short_list(memory in arb_memory()) {
        if memory.current_info_list.len() < definition(ContextTag::Plan).required_info.len() {
            prop_assert!(invoke(ContextTag::Plan, "plan", &memory).is_err());
        }
    }
}

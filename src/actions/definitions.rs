//! Per-context action definitions

use super::{Action, ActionDefinition, ActionHandler, ActionKind, RequiredInfo};
use crate::context::{ContextMemory, ContextTag, PlanStatus, WorkflowName};

// ============================================================================
// Front
// ============================================================================

pub static FRONT: ActionDefinition = ActionDefinition {
    required_info: &[],
    actions: &[
        Action {
            id: "plan",
            kind: ActionKind::Button,
            label: "Sales consultation",
            handler: ActionHandler::SendMessage("I would like to consult about a sales plan."),
            can_execute: in_front,
        },
        Action {
            id: "listData",
            kind: ActionKind::Button,
            label: "Fetch customer data",
            handler: ActionHandler::SendMessage("I would like to fetch customer data."),
            can_execute: in_front,
        },
    ],
    immediate_execution: false,
};

fn in_front(memory: &ContextMemory) -> bool {
    memory.current_context == ContextTag::Front
}

// ============================================================================
// Plan
// ============================================================================

pub static PLAN: ActionDefinition = ActionDefinition {
    required_info: &[
        RequiredInfo {
            name: "business_target",
            description: "Sales target",
        },
        RequiredInfo {
            name: "business_goal",
            description: "Sales goal",
        },
        RequiredInfo {
            name: "method",
            description: "Sales method",
        },
    ],
    actions: &[
        Action {
            id: "plan",
            kind: ActionKind::Button,
            label: "Run plan",
            handler: ActionHandler::RunWorkflow(WorkflowName::PlanWorkflow),
            can_execute: ready_to_plan,
        },
        Action {
            id: "execution",
            kind: ActionKind::Button,
            label: "Confirm sales plan",
            handler: ActionHandler::RunWorkflow(WorkflowName::ApplyPlanWorkflow),
            can_execute: plan_is_planned,
        },
        Action {
            id: "reset",
            kind: ActionKind::Button,
            label: "Cancel conversation",
            handler: ActionHandler::RunWorkflow(WorkflowName::ResetContextWorkflow),
            can_execute: can_reset_plan,
        },
    ],
    immediate_execution: false,
};

/// Every required entry collected and nothing planned yet
pub fn ready_to_plan(memory: &ContextMemory) -> bool {
    memory.info_list_complete(PLAN.required_info.len())
        && memory.plan_data.status == PlanStatus::None
}

fn plan_is_planned(memory: &ContextMemory) -> bool {
    memory.plan_data.status == PlanStatus::Planned
}

fn can_reset_plan(memory: &ContextMemory) -> bool {
    memory.current_context == ContextTag::Plan && memory.plan_data.status != PlanStatus::Completed
}

// ============================================================================
// List
// ============================================================================

pub static LIST: ActionDefinition = ActionDefinition {
    required_info: &[RequiredInfo {
        name: "customer_profile",
        description: "Customer profile",
    }],
    actions: &[Action {
        id: "list_data",
        kind: ActionKind::Button,
        label: "Run sales list data",
        handler: ActionHandler::SendMessage("Please run the sales list data."),
        can_execute: in_list,
    }],
    immediate_execution: false,
};

fn in_list(memory: &ContextMemory) -> bool {
    memory.current_context == ContextTag::List
}

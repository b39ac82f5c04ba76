//! Action registry
//!
//! Each context declares the info it needs and the actions a user may
//! trigger. Availability is a pure guard over the working memory; invoking
//! an action only emits what the client should send next.

mod definitions;

#[cfg(test)]
mod proptests;

pub use definitions::ready_to_plan;

use crate::context::{ContextMemory, ContextTag, WorkflowName};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Button,
    Select,
}

/// What invoking an action asks the client to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionHandler {
    SendMessage(&'static str),
    RunWorkflow(WorkflowName),
}

impl ActionHandler {
    pub fn to_emit(self) -> ActionEmit {
        match self {
            ActionHandler::SendMessage(text) => ActionEmit::SendMessage {
                text: text.to_string(),
            },
            ActionHandler::RunWorkflow(workflow_name) => ActionEmit::RunWorkflow { workflow_name },
        }
    }
}

/// Result of an invocation, returned to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ActionEmit {
    SendMessage {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    RunWorkflow {
        workflow_name: WorkflowName,
    },
}

pub type Guard = fn(&ContextMemory) -> bool;

#[derive(Debug)]
pub struct Action {
    pub id: &'static str,
    pub kind: ActionKind,
    pub label: &'static str,
    pub handler: ActionHandler,
    pub can_execute: Guard,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequiredInfo {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct ActionDefinition {
    pub required_info: &'static [RequiredInfo],
    pub actions: &'static [Action],
    pub immediate_execution: bool,
}

/// Client-facing summary of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionView {
    pub id: &'static str,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub label: &'static str,
}

impl From<&Action> for ActionView {
    fn from(action: &Action) -> Self {
        Self {
            id: action.id,
            kind: action.kind,
            label: action.label,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Unknown action '{id}' for context {tag}")]
    UnknownAction { tag: ContextTag, id: String },
    #[error("Action '{id}' cannot run in the current state")]
    NotExecutable { id: String },
}

pub fn definition(tag: ContextTag) -> &'static ActionDefinition {
    match tag {
        ContextTag::Front => &definitions::FRONT,
        ContextTag::Plan => &definitions::PLAN,
        ContextTag::List => &definitions::LIST,
    }
}

/// Actions of `tag` whose guard holds for `memory`
pub fn available_actions(tag: ContextTag, memory: &ContextMemory) -> Vec<&'static Action> {
    definition(tag)
        .actions
        .iter()
        .filter(|action| (action.can_execute)(memory))
        .collect()
}

/// Re-check the guard against `memory` and return what to emit
///
/// `memory` must be a fresh read; a guard that no longer holds rejects the
/// invocation before anything runs.
pub fn invoke(tag: ContextTag, id: &str, memory: &ContextMemory) -> Result<ActionEmit, ActionError> {
    let action = definition(tag)
        .actions
        .iter()
        .find(|action| action.id == id)
        .ok_or_else(|| ActionError::UnknownAction {
            tag,
            id: id.to_string(),
        })?;

    if !(action.can_execute)(memory) {
        tracing::info!(context = %tag, action = %id, "Rejected action with false guard");
        return Err(ActionError::NotExecutable { id: id.to_string() });
    }

    Ok(action.handler.to_emit())
}

//! Context memory document types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Which handler currently owns the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextTag {
    #[default]
    Front,
    Plan,
    #[serde(alias = "listData")]
    List,
}

impl ContextTag {
    pub const ALL: [ContextTag; 3] = [ContextTag::Front, ContextTag::Plan, ContextTag::List];

    pub fn as_str(self) -> &'static str {
        match self {
            ContextTag::Front => "front",
            ContextTag::Plan => "plan",
            ContextTag::List => "list",
        }
    }

    /// Parse a raw tag, falling back to `Front` for anything unrecognized
    pub fn parse_or_front(raw: &str) -> Self {
        match raw.trim() {
            "plan" => ContextTag::Plan,
            "list" | "listData" => ContextTag::List,
            "front" => ContextTag::Front,
            other => {
                tracing::debug!(tag = %other, "Unrecognized context tag, using front");
                ContextTag::Front
            }
        }
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named workflows that can run against the working memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowName {
    PlanWorkflow,
    ApplyPlanWorkflow,
    ResetContextWorkflow,
}

impl WorkflowName {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowName::PlanWorkflow => "planWorkflow",
            WorkflowName::ApplyPlanWorkflow => "applyPlanWorkflow",
            WorkflowName::ResetContextWorkflow => "resetContextWorkflow",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "planWorkflow" => Some(WorkflowName::PlanWorkflow),
            "applyPlanWorkflow" => Some(WorkflowName::ApplyPlanWorkflow),
            "resetContextWorkflow" => Some(WorkflowName::ResetContextWorkflow),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collected fact, unique by name within the info list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoItem {
    pub name: String,
    pub value: Value,
}

impl InfoItem {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Whether the value carries actual content
    pub fn has_value(&self) -> bool {
        match &self.value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        }
    }
}

/// Status of the latest plan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    None,
    Planning,
    Planned,
    Executing,
    Completed,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::None => "none",
            PlanStatus::Planning => "planning",
            PlanStatus::Planned => "planned",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of the latest workflow attempt for the plan context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlanData {
    #[serde(default)]
    pub status: PlanStatus,
    pub plan: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<WorkflowName>,
}

impl PlanData {
    pub fn planned(plan: impl Into<String>, workflow_name: WorkflowName) -> Self {
        Self {
            status: PlanStatus::Planned,
            plan: Some(plan.into()),
            workflow_name: Some(workflow_name),
        }
    }
}

/// The working memory document
///
/// `Default` is the canonical reset document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContextMemory {
    #[serde(default)]
    pub current_context: ContextTag,
    #[serde(default)]
    pub user_intent: String,
    #[serde(default)]
    pub current_info_list: Vec<InfoItem>,
    pub plan_data: PlanData,
}

/// Reasons a stored document does not match its declared shape
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("info item name must not be empty")]
    EmptyInfoName,
    #[error("duplicate info item: {0}")]
    DuplicateInfo(String),
}

impl ContextMemory {
    /// Parse and validate a stored document
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let memory: ContextMemory = serde_json::from_str(raw)?;
        memory.validate()?;
        Ok(memory)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for item in &self.current_info_list {
            if item.name.trim().is_empty() {
                return Err(ValidationError::EmptyInfoName);
            }
            if !seen.insert(item.name.as_str()) {
                return Err(ValidationError::DuplicateInfo(item.name.clone()));
            }
        }
        Ok(())
    }

    pub fn info(&self, name: &str) -> Option<&InfoItem> {
        self.current_info_list.iter().find(|item| item.name == name)
    }

    /// Replace the entry with the same name in place, or append
    pub fn upsert_info(&mut self, item: InfoItem) {
        match self
            .current_info_list
            .iter_mut()
            .find(|existing| existing.name == item.name)
        {
            Some(existing) => existing.value = item.value,
            None => self.current_info_list.push(item),
        }
    }

    /// Info list has exactly `required_count` entries and all of them carry a value
    pub fn info_list_complete(&self, required_count: usize) -> bool {
        self.current_info_list.len() == required_count
            && self.current_info_list.iter().all(InfoItem::has_value)
    }
}

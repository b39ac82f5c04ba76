//! Context-scoped working memory patches
//!
//! Each context handler may only write the fields its patch type names.
//! A model-issued update is parsed into the patch of the active context, so
//! a front handler cannot touch plan data and a plan handler cannot switch
//! the context. No handler writes `planData`: its status only moves through
//! the plan, apply and reset workflows.

use super::memory::{ContextMemory, ContextTag, InfoItem};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Fields the front handler owns
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontPatch {
    #[serde(default)]
    pub current_context: Option<ContextTag>,
    #[serde(default)]
    pub user_intent: Option<String>,
}

/// Fields the plan handler owns
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPatch {
    /// Upserted by name into the info list
    #[serde(default)]
    pub current_info_list: Vec<InfoItem>,
}

/// The list handler does not write working memory
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ListPatch {}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextPatch {
    Front(FrontPatch),
    Plan(PlanPatch),
    List(ListPatch),
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("working memory update must be a JSON object")]
    NotAnObject,
    #[error("invalid working memory update: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("info item name must not be empty")]
    EmptyInfoName,
}

/// A parsed patch plus the keys that were outside the handler's scope
#[derive(Debug)]
pub struct ScopedPatch {
    pub patch: ContextPatch,
    pub dropped: Vec<String>,
}

impl ContextPatch {
    /// Field names the handler for `tag` is allowed to write
    pub fn writable_fields(tag: ContextTag) -> &'static [&'static str] {
        match tag {
            ContextTag::Front => &["currentContext", "userIntent"],
            ContextTag::Plan => &["currentInfoList"],
            ContextTag::List => &[],
        }
    }

    /// Parse a raw update for the handler owning `tag`
    pub fn parse(tag: ContextTag, raw: &Value) -> Result<ScopedPatch, PatchError> {
        let Value::Object(fields) = raw else {
            return Err(PatchError::NotAnObject);
        };

        let writable = Self::writable_fields(tag);
        let mut scoped = Map::new();
        let mut dropped = Vec::new();
        for (key, value) in fields {
            if writable.contains(&key.as_str()) {
                scoped.insert(key.clone(), value.clone());
            } else {
                dropped.push(key.clone());
            }
        }

        let scoped = Value::Object(scoped);
        let patch = match tag {
            ContextTag::Front => ContextPatch::Front(serde_json::from_value(scoped)?),
            ContextTag::Plan => ContextPatch::Plan(serde_json::from_value(scoped)?),
            ContextTag::List => ContextPatch::List(ListPatch {}),
        };
        Ok(ScopedPatch { patch, dropped })
    }

    /// Apply to `memory`; on error `memory` is left untouched
    pub fn apply(&self, memory: &mut ContextMemory) -> Result<(), PatchError> {
        match self {
            ContextPatch::Front(patch) => {
                if let Some(tag) = patch.current_context {
                    memory.current_context = tag;
                }
                if let Some(intent) = &patch.user_intent {
                    memory.user_intent.clone_from(intent);
                }
            }
            ContextPatch::Plan(patch) => {
                if patch.current_info_list.iter().any(|i| i.name.trim().is_empty()) {
                    return Err(PatchError::EmptyInfoName);
                }
                for item in &patch.current_info_list {
                    memory.upsert_info(item.clone());
                }
            }
            ContextPatch::List(_) => {}
        }
        Ok(())
    }
}

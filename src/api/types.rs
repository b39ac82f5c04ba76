//! API request and response types

use crate::actions::ActionView;
use crate::catalog::{Detection, Readiness, WorkflowDefinition};
use crate::context::{ContextKey, ContextMemory, ContextTag};
use crate::db::StoredMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_THREAD: &str = "default-thread";
const DEFAULT_RESOURCE: &str = "default-user";

/// Default page size of `GET /api/messages`
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;

fn key_or_default(thread_id: Option<&str>, resource_id: Option<&str>) -> ContextKey {
    let pick = |value: Option<&str>, default: &str| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    };
    ContextKey::new(pick(thread_id, DEFAULT_THREAD), pick(resource_id, DEFAULT_RESOURCE))
}

/// Thread and resource ids, from a query string or a body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyParams {
    pub thread_id: Option<String>,
    pub resource_id: Option<String>,
}

impl KeyParams {
    pub fn key(&self) -> ContextKey {
        key_or_default(self.thread_id.as_deref(), self.resource_id.as_deref())
    }
}

/// A chat message as sent by the UI
#[derive(Debug, Deserialize)]
pub struct UiMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Value>,
    /// Older clients send plain content instead of parts
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl UiMessage {
    pub fn text(&self) -> String {
        let from_parts: String = self
            .parts
            .iter()
            .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if from_parts.is_empty() {
            self.content.clone().unwrap_or_default()
        } else {
            from_parts
        }
    }

    /// `metadata.workflow.name`, set when an action asked for a workflow
    pub fn workflow_name(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get("workflow")?
            .get("name")?
            .as_str()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<UiMessage>,
    #[serde(flatten)]
    pub key: KeyParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub workflow_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(flatten)]
    pub key: KeyParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeActionRequest {
    pub action_id: String,
    #[serde(flatten)]
    pub key: KeyParams,
}

/// Query strings stay flat; serde's flatten loses number parsing there
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub thread_id: Option<String>,
    pub resource_id: Option<String>,
    pub limit: Option<usize>,
}

impl MessagesQuery {
    pub fn key(&self) -> ContextKey {
        key_or_default(self.thread_id.as_deref(), self.resource_id.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectQuery {
    #[serde(default)]
    pub text: String,
}

/// The stored document, `null` when missing or malformed
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    pub context_data: Option<ContextMemory>,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ActionsResponse {
    pub context: ContextTag,
    pub actions: Vec<ActionView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub messages: Vec<StoredMessage>,
    pub thread_id: String,
    pub resource_id: String,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct WorkflowsResponse {
    pub workflows: &'static [WorkflowDefinition],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    #[serde(flatten)]
    pub detection: Detection,
    pub extracted_data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<Readiness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

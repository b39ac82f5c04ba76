//! Events in and out of the multiplexer

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event written to the client, one per SSE `data:` line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    DataStatus { id: String, data: StatusData },
    DataCustom { id: String, data: Value },
}

impl StreamEvent {
    pub fn id(&self) -> &str {
        match self {
            StreamEvent::TextStart { id }
            | StreamEvent::TextDelta { id, .. }
            | StreamEvent::TextEnd { id }
            | StreamEvent::DataStatus { id, .. }
            | StreamEvent::DataCustom { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Started,
    #[serde(rename = "first chunk")]
    FirstChunk,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    pub status: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a router or workflow step produces
///
/// Text ids are chosen by the producer; errors are turned into visible text
/// by the multiplexer.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    Custom { id: String, data: Value },
    /// A tool was called; produces no visible text
    ToolCall { name: String },
    /// A tool or step failed; the stream carries on
    ToolError { message: String },
    /// The source could not produce anything further
    Failed { message: String },
}

//! Stream multiplexer core
//!
//! A synchronous state machine: feed it [`SourceEvent`]s, get the
//! [`StreamEvent`]s to write. The async adapter in `stream.rs` drives it.

use super::event::{SourceEvent, StatusData, StatusKind, StreamEvent};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

pub const FALLBACK_TEXT: &str =
    "Processing is complete. Is there anything else I can help you with?";

/// Final assistant output, persisted once the stream completes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// All visible text, including error and fallback notices
    pub text: String,
    pub custom: Vec<Value>,
}

pub struct Multiplexer {
    status_id: String,
    /// Open text ids in the order they were started
    open: Vec<String>,
    /// Ids whose end was written; later text for them is dropped
    ended: HashSet<String>,
    first_chunk_sent: bool,
    visible_text: bool,
    failure: Option<String>,
    transcript: Transcript,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::with_status_id(Uuid::new_v4().to_string())
    }

    pub fn with_status_id(status_id: impl Into<String>) -> Self {
        Self {
            status_id: status_id.into(),
            open: Vec::new(),
            ended: HashSet::new(),
            first_chunk_sent: false,
            visible_text: false,
            failure: None,
            transcript: Transcript::default(),
        }
    }

    pub fn status_id(&self) -> &str {
        &self.status_id
    }

    /// Events written before the source is consumed
    pub fn start(&mut self) -> Vec<StreamEvent> {
        vec![self.status(StatusKind::Started, None)]
    }

    pub fn push(&mut self, event: SourceEvent) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        match event {
            SourceEvent::TextStart { id } => {
                if self.ended.contains(&id) {
                    tracing::debug!(id = %id, "Dropping text-start for an id that already ended");
                } else if !self.is_open(&id) {
                    self.open.push(id.clone());
                    out.push(StreamEvent::TextStart { id });
                }
            }
            SourceEvent::TextDelta { id, .. } if self.ended.contains(&id) => {
                tracing::debug!(id = %id, "Dropping text-delta for an id that already ended");
            }
            SourceEvent::TextDelta { id, delta } => {
                if !delta.is_empty() {
                    if !self.first_chunk_sent {
                        self.first_chunk_sent = true;
                        out.push(self.status(StatusKind::FirstChunk, None));
                    }
                    self.visible_text = true;
                    self.transcript.text.push_str(&delta);
                }
                if !self.is_open(&id) {
                    self.open.push(id.clone());
                    out.push(StreamEvent::TextStart { id: id.clone() });
                }
                out.push(StreamEvent::TextDelta { id, delta });
            }
            SourceEvent::TextEnd { id } => {
                if let Some(pos) = self.open.iter().position(|open| *open == id) {
                    self.open.remove(pos);
                    self.ended.insert(id.clone());
                    out.push(StreamEvent::TextEnd { id });
                } else {
                    tracing::debug!(id = %id, "Dropping text-end for an id that is not open");
                }
            }
            SourceEvent::Custom { id, data } => {
                self.transcript.custom.push(data.clone());
                out.push(StreamEvent::DataCustom { id, data });
            }
            SourceEvent::ToolCall { name } => {
                tracing::debug!(tool = %name, "Tool called");
            }
            SourceEvent::ToolError { message } => {
                tracing::warn!(error = %message, "Tool error surfaced to stream");
                out.extend(self.notice(&format!("\n\n⚠️ An error occurred: {message}")));
            }
            SourceEvent::Failed { message } => {
                tracing::error!(error = %message, "Stream source failed");
                out.extend(self.notice(&format!("An error occurred: {message}")));
                self.failure.get_or_insert(message);
            }
        }
        out
    }

    /// Close what is still open and write the final status
    pub fn finish(mut self) -> (Vec<StreamEvent>, Transcript) {
        let mut out: Vec<StreamEvent> = self
            .open
            .drain(..)
            .map(|id| StreamEvent::TextEnd { id })
            .collect();

        if self.failure.is_none() && !self.visible_text {
            out.extend(self.notice(FALLBACK_TEXT));
        }

        let last = match self.failure.take() {
            Some(error) => self.status(StatusKind::Error, Some(error)),
            None => self.status(StatusKind::Completed, None),
        };
        out.push(last);
        (out, self.transcript)
    }

    fn is_open(&self, id: &str) -> bool {
        self.open.iter().any(|open| open == id)
    }

    fn status(&self, status: StatusKind, error: Option<String>) -> StreamEvent {
        StreamEvent::DataStatus {
            id: self.status_id.clone(),
            data: StatusData { status, error },
        }
    }

    /// A self-contained text triple under a fresh id
    fn notice(&mut self, text: &str) -> [StreamEvent; 3] {
        self.visible_text = true;
        self.transcript.text.push_str(text);
        let id = Uuid::new_v4().to_string();
        [
            StreamEvent::TextStart { id: id.clone() },
            StreamEvent::TextDelta {
                id: id.clone(),
                delta: text.to_string(),
            },
            StreamEvent::TextEnd { id },
        ]
    }
}

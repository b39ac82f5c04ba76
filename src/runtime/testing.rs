//! Mock implementations for testing
//!
//! These mocks enable testing the router, workflows and orchestrator without
//! a model or a database.

use super::traits::MessageStore;
use crate::context::{ContextError, ContextKey, ContextMemory, ContextStore};
use crate::db::{MessagePart, MessageRole, StoredMessage};
use crate::llm::{FinishReason, LlmChunk, LlmError, LlmRequest, LlmService, LlmStream, Usage};
use crate::stream::{Transcript, TranscriptSink};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Mock LLM Service
// ============================================================================

enum Script {
    Chunks(Vec<Result<LlmChunk, LlmError>>),
    OpenError(LlmError),
}

/// Mock model that replays queued chunk scripts, one per call
pub struct MockLlmService {
    scripts: Mutex<VecDeque<Script>>,
    model_id: String,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a stream that yields `chunks` and ends
    pub fn queue_chunks(&self, chunks: Vec<LlmChunk>) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Chunks(chunks.into_iter().map(Ok).collect()));
    }

    /// Queue a stream that fails right after opening
    pub fn queue_stream_error(&self, error: LlmError) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Chunks(vec![Err(error)]));
    }

    /// Queue a call that cannot start
    pub fn queue_error(&self, error: LlmError) {
        self.scripts.lock().unwrap().push_back(Script::OpenError(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Chunks(items)) => Ok(stream::iter(items).boxed()),
            Some(Script::OpenError(error)) => Err(error),
            None => Ok(stream::iter(vec![Ok(LlmChunk::Finish {
                reason: FinishReason::Stop,
                usage: Usage::default(),
            })])
            .boxed()),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Context stores
// ============================================================================

/// Keeps raw documents so malformed rows can be planted
#[derive(Default)]
pub struct InMemoryContextStore {
    documents: Mutex<HashMap<ContextKey, String>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, key: &ContextKey, raw: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(key.clone(), raw.to_string());
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(&self, key: &ContextKey) -> Result<ContextMemory, ContextError> {
        let raw = self
            .documents
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ContextError::NotFound(key.clone()))?;
        ContextMemory::from_json(&raw).map_err(|e| ContextError::MalformedState {
            key: key.clone(),
            reason: e.to_string(),
        })
    }

    async fn set(&self, key: &ContextKey, memory: &ContextMemory) -> Result<(), ContextError> {
        let raw = memory
            .to_json()
            .map_err(|e| ContextError::StorageUnavailable(e.to_string()))?;
        self.insert_raw(key, &raw);
        Ok(())
    }
}

/// Store whose backend is always down
pub struct FailingContextStore;

#[async_trait]
impl ContextStore for FailingContextStore {
    async fn get(&self, _key: &ContextKey) -> Result<ContextMemory, ContextError> {
        Err(ContextError::StorageUnavailable("database is locked".to_string()))
    }

    async fn set(&self, _key: &ContextKey, _memory: &ContextMemory) -> Result<(), ContextError> {
        Err(ContextError::StorageUnavailable("database is locked".to_string()))
    }
}

// ============================================================================
// Message store and transcript sink
// ============================================================================

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<StoredMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<StoredMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn add_message(
        &self,
        key: &ContextKey,
        role: MessageRole,
        parts: &[MessagePart],
    ) -> Result<StoredMessage, String> {
        let mut messages = self.messages.lock().unwrap();
        let sequence_id = i64::try_from(messages.len()).unwrap() + 1;
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: key.thread_id.clone(),
            resource_id: key.resource_id.clone(),
            sequence_id,
            role,
            parts: parts.to_vec(),
            created_at: Utc::now(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn get_messages(&self, key: &ContextKey, limit: usize) -> Result<Vec<StoredMessage>, String> {
        let thread: Vec<StoredMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.thread_id == key.thread_id && m.resource_id == key.resource_id)
            .cloned()
            .collect();
        let skip = thread.len().saturating_sub(limit);
        Ok(thread.into_iter().skip(skip).collect())
    }

    async fn count_messages(&self, key: &ContextKey) -> Result<usize, String> {
        Ok(self.get_messages(key, usize::MAX).await?.len())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    transcripts: Mutex<Vec<Transcript>>,
}

impl RecordingSink {
    pub fn transcripts(&self) -> Vec<Transcript> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptSink for RecordingSink {
    async fn persist(&self, transcript: Transcript) {
        self.transcripts.lock().unwrap().push(transcript);
    }
}

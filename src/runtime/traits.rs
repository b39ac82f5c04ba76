//! Trait abstractions for runtime I/O
//!
//! The orchestrator talks to storage through these so tests can swap in
//! in-memory versions.

use crate::context::{ContextError, ContextKey, ContextMemory, ContextStore};
use crate::db::{Database, MessagePart, MessageRole, StoredMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for chat messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to the thread
    async fn add_message(
        &self,
        key: &ContextKey,
        role: MessageRole,
        parts: &[MessagePart],
    ) -> Result<StoredMessage, String>;

    /// The latest `limit` messages, oldest first
    async fn get_messages(&self, key: &ContextKey, limit: usize) -> Result<Vec<StoredMessage>, String>;

    async fn count_messages(&self, key: &ContextKey) -> Result<usize, String>;
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn add_message(
        &self,
        key: &ContextKey,
        role: MessageRole,
        parts: &[MessagePart],
    ) -> Result<StoredMessage, String> {
        (**self).add_message(key, role, parts).await
    }

    async fn get_messages(&self, key: &ContextKey, limit: usize) -> Result<Vec<StoredMessage>, String> {
        (**self).get_messages(key, limit).await
    }

    async fn count_messages(&self, key: &ContextKey) -> Result<usize, String> {
        (**self).count_messages(key).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as message and context storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn add_message(
        &self,
        key: &ContextKey,
        role: MessageRole,
        parts: &[MessagePart],
    ) -> Result<StoredMessage, String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db
            .add_message(&id, &key.thread_id, &key.resource_id, role, parts)
            .map_err(|e| e.to_string())
    }

    async fn get_messages(&self, key: &ContextKey, limit: usize) -> Result<Vec<StoredMessage>, String> {
        self.db
            .get_messages(&key.thread_id, &key.resource_id, limit)
            .map_err(|e| e.to_string())
    }

    async fn count_messages(&self, key: &ContextKey) -> Result<usize, String> {
        self.db
            .count_messages(&key.thread_id, &key.resource_id)
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ContextStore for DatabaseStorage {
    async fn get(&self, key: &ContextKey) -> Result<ContextMemory, ContextError> {
        let raw = self
            .db
            .get_working_memory(&key.thread_id, &key.resource_id)
            .map_err(|e| ContextError::StorageUnavailable(e.to_string()))?
            .ok_or_else(|| ContextError::NotFound(key.clone()))?;
        ContextMemory::from_json(&raw).map_err(|e| ContextError::MalformedState {
            key: key.clone(),
            reason: e.to_string(),
        })
    }

    async fn set(&self, key: &ContextKey, memory: &ContextMemory) -> Result<(), ContextError> {
        let document = memory
            .to_json()
            .map_err(|e| ContextError::StorageUnavailable(e.to_string()))?;
        self.db
            .set_working_memory(&key.thread_id, &key.resource_id, &document)
            .map_err(|e| ContextError::StorageUnavailable(e.to_string()))
    }
}

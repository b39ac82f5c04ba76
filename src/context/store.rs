//! Context store contract

use super::memory::ContextMemory;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Working memory key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub thread_id: String,
    pub resource_id: String,
}

impl ContextKey {
    pub fn new(thread_id: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread_id, self.resource_id)
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("No working memory stored for {0}")]
    NotFound(ContextKey),
    #[error("Stored working memory for {key} is malformed: {reason}")]
    MalformedState { key: ContextKey, reason: String },
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Get/set/reset of the working memory document
///
/// No retries at this layer.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Read and validate the stored document
    async fn get(&self, key: &ContextKey) -> Result<ContextMemory, ContextError>;

    /// Overwrite the whole document
    async fn set(&self, key: &ContextKey, memory: &ContextMemory) -> Result<(), ContextError>;

    /// Write and return the canonical default document
    async fn reset(&self, key: &ContextKey) -> Result<ContextMemory, ContextError> {
        let memory = ContextMemory::default();
        self.set(key, &memory).await?;
        Ok(memory)
    }
}

#[async_trait]
impl<T: ContextStore + ?Sized> ContextStore for Arc<T> {
    async fn get(&self, key: &ContextKey) -> Result<ContextMemory, ContextError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &ContextKey, memory: &ContextMemory) -> Result<(), ContextError> {
        (**self).set(key, memory).await
    }

    async fn reset(&self, key: &ContextKey) -> Result<ContextMemory, ContextError> {
        (**self).reset(key).await
    }
}

/// Read the document, resetting it when absent or malformed
///
/// Only storage unavailability reaches the caller.
pub async fn load_or_reset(
    store: &dyn ContextStore,
    key: &ContextKey,
) -> Result<ContextMemory, ContextError> {
    match store.get(key).await {
        Ok(memory) => Ok(memory),
        Err(ContextError::NotFound(_)) => {
            tracing::debug!(key = %key, "No working memory yet, writing default");
            store.reset(key).await
        }
        Err(ContextError::MalformedState { reason, .. }) => {
            tracing::warn!(key = %key, reason = %reason, "Malformed working memory, resetting");
            store.reset(key).await
        }
        Err(e @ ContextError::StorageUnavailable(_)) => Err(e),
    }
}

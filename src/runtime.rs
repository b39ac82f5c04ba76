//! Per-request orchestration
//!
//! Serializes requests per (thread, resource), persists the user message,
//! picks the router or a workflow, and records the assistant transcript
//! once the merged stream completes.

pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::{DatabaseStorage, MessageStore};

use crate::actions::{self, ActionEmit, ActionError, ActionView};
use crate::context::{load_or_reset, ContextError, ContextKey, ContextMemory, ContextStore, ContextTag, WorkflowName};
use crate::db::{MessagePart, MessageRole, StoredMessage};
use crate::llm::{ContentBlock, LlmMessage, LlmService};
use crate::router::ContextRouter;
use crate::stream::{self, SourceEvent, StreamEvent, Transcript, TranscriptSink};
use crate::workflow::{WorkflowEngine, WorkflowError, WorkflowInput};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Stored messages replayed to the model on each turn
const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("Message storage error: {0}")]
    Storage(String),
}

/// One user turn of `POST /api/chat`
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub text: String,
    /// Set when the message was sent by a `runWorkflow` action
    pub workflow: Option<WorkflowInput>,
}

impl ChatTurn {
    /// Build a turn, turning a workflow name from message metadata into its input
    ///
    /// `planWorkflow` takes the message text as feedback; the others take `{}`.
    pub fn new(text: impl Into<String>, workflow_name: Option<&str>) -> Result<Self, WorkflowError> {
        let text = text.into();
        let workflow = match workflow_name {
            None => None,
            Some(name) => {
                let input = match WorkflowName::parse(name) {
                    Some(WorkflowName::PlanWorkflow) => json!({ "userFeedback": text }),
                    _ => json!({}),
                };
                Some(WorkflowInput::from_request(name, input)?)
            }
        };
        Ok(Self { text, workflow })
    }
}

type Sessions = Arc<Mutex<HashMap<ContextKey, Session>>>;

#[derive(Default)]
struct Session {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Token of the request holding the lock, if it can be cancelled
    cancel: Option<CancellationToken>,
}

/// Exclusive hold on one key
///
/// Dropping it ends the request's cancel token, releases the key and forgets
/// the session once nobody else is waiting on it.
struct SessionGuard {
    sessions: Sessions,
    key: ContextKey,
    lock: Option<tokio::sync::OwnedMutexGuard<()>>,
    cancel: Option<CancellationToken>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        drop(self.lock.take());

        let mut sessions = self.sessions.lock().unwrap();
        let idle = sessions
            .get(&self.key)
            .is_some_and(|session| Arc::strong_count(&session.lock) == 1);
        if idle {
            sessions.remove(&self.key);
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn ContextStore>,
    messages: Arc<dyn MessageStore>,
    router: ContextRouter,
    engine: WorkflowEngine,
    sessions: Sessions,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ContextStore>,
        messages: Arc<dyn MessageStore>,
        llm: Arc<dyn LlmService>,
        temperature: f32,
    ) -> Self {
        Self {
            router: ContextRouter::new(store.clone(), llm.clone(), temperature),
            engine: WorkflowEngine::new(store.clone(), llm, temperature),
            store,
            messages,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // ==================== Streaming requests ====================

    /// Handle one chat message
    pub async fn chat(
        &self,
        key: &ContextKey,
        turn: ChatTurn,
    ) -> Result<BoxStream<'static, StreamEvent>, OrchestratorError> {
        let mut guard = self.acquire(key).await;
        let cancel = self.arm_cancel(&mut guard);

        self.messages
            .add_message(key, MessageRole::User, &[MessagePart::text(&turn.text)])
            .await
            .map_err(OrchestratorError::Storage)?;

        let source = match turn.workflow {
            Some(input) => self.workflow_source(key, input).await?,
            None => {
                let history = self
                    .messages
                    .get_messages(key, HISTORY_LIMIT)
                    .await
                    .map_err(OrchestratorError::Storage)?;
                self.router.route(key, to_llm_messages(&history)).await?
            }
        };

        Ok(self.finish(key, source, cancel, guard))
    }

    /// Run a workflow directly, without a user message
    pub async fn run_workflow(
        &self,
        key: &ContextKey,
        input: WorkflowInput,
    ) -> Result<BoxStream<'static, StreamEvent>, OrchestratorError> {
        let mut guard = self.acquire(key).await;
        let cancel = self.arm_cancel(&mut guard);
        let source = self.workflow_source(key, input).await?;
        Ok(self.finish(key, source, cancel, guard))
    }

    /// Cancel the in-flight request for `key`, if any
    pub fn cancel(&self, key: &ContextKey) -> bool {
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(key).and_then(|session| session.cancel.as_ref()) {
            Some(token) if !token.is_cancelled() => {
                tracing::info!(key = %key, "Cancelling request");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    async fn workflow_source(
        &self,
        key: &ContextKey,
        input: WorkflowInput,
    ) -> Result<BoxStream<'static, SourceEvent>, OrchestratorError> {
        let workflow = input.workflow();
        let steps = self.engine.run(key, input).await?;
        Ok(steps.map(move |event| event.into_source(workflow)).boxed())
    }

    fn finish(
        &self,
        key: &ContextKey,
        source: BoxStream<'static, SourceEvent>,
        cancel: CancellationToken,
        guard: SessionGuard,
    ) -> BoxStream<'static, StreamEvent> {
        let sink = Arc::new(MessageSink {
            messages: self.messages.clone(),
            key: key.clone(),
        });
        let mut merged = stream::merge(source, cancel, sink);

        // The key stays locked until the response stream is done or dropped
        let stream = async_stream::stream! {
            while let Some(event) = merged.next().await {
                yield event;
            }
            drop(guard);
        };
        stream.boxed()
    }

    async fn acquire(&self, key: &ContextKey) -> SessionGuard {
        let lock = self
            .sessions
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .lock
            .clone();
        let held = lock.lock_owned().await;
        SessionGuard {
            sessions: self.sessions.clone(),
            key: key.clone(),
            lock: Some(held),
            cancel: None,
        }
    }

    fn arm_cancel(&self, guard: &mut SessionGuard) -> CancellationToken {
        let token = CancellationToken::new();
        self.sessions
            .lock()
            .unwrap()
            .entry(guard.key.clone())
            .or_default()
            .cancel = Some(token.clone());
        guard.cancel = Some(token.clone());
        token
    }

    #[cfg(test)]
    fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    // ==================== Working memory and actions ====================

    /// Stored document, `None` when missing or malformed
    pub async fn context(&self, key: &ContextKey) -> Result<Option<ContextMemory>, OrchestratorError> {
        match self.store.get(key).await {
            Ok(memory) => Ok(Some(memory)),
            Err(ContextError::NotFound(_) | ContextError::MalformedState { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn reset_context(&self, key: &ContextKey) -> Result<ContextMemory, OrchestratorError> {
        let _guard = self.acquire(key).await;
        tracing::info!(key = %key, "Resetting working memory");
        Ok(self.store.reset(key).await?)
    }

    /// Actions available in the current context
    pub async fn actions(&self, key: &ContextKey) -> Result<(ContextTag, Vec<ActionView>), OrchestratorError> {
        let memory = load_or_reset(self.store.as_ref(), key).await?;
        let tag = memory.current_context;
        let views = actions::available_actions(tag, &memory)
            .into_iter()
            .map(ActionView::from)
            .collect();
        Ok((tag, views))
    }

    /// Invoke an action of the current context against a fresh read
    pub async fn invoke_action(&self, key: &ContextKey, action_id: &str) -> Result<ActionEmit, OrchestratorError> {
        let _guard = self.acquire(key).await;
        let memory = load_or_reset(self.store.as_ref(), key).await?;
        let emit = actions::invoke(memory.current_context, action_id, &memory)?;
        tracing::info!(key = %key, action = %action_id, "Action invoked");
        Ok(emit)
    }

    // ==================== History ====================

    /// Latest `limit` messages and the total count
    pub async fn messages(
        &self,
        key: &ContextKey,
        limit: usize,
    ) -> Result<(Vec<StoredMessage>, usize), OrchestratorError> {
        let messages = self
            .messages
            .get_messages(key, limit)
            .await
            .map_err(OrchestratorError::Storage)?;
        let total = self
            .messages
            .count_messages(key)
            .await
            .map_err(OrchestratorError::Storage)?;
        Ok((messages, total))
    }
}

fn to_llm_messages(history: &[StoredMessage]) -> Vec<LlmMessage> {
    history
        .iter()
        .filter_map(|message| {
            let text = message.text();
            if text.trim().is_empty() {
                return None;
            }
            Some(match message.role {
                MessageRole::User => LlmMessage::user(text),
                MessageRole::Assistant => LlmMessage::assistant(vec![ContentBlock::text(text)]),
            })
        })
        .collect()
}

/// Persists the assistant transcript as one message
struct MessageSink {
    messages: Arc<dyn MessageStore>,
    key: ContextKey,
}

#[async_trait]
impl TranscriptSink for MessageSink {
    async fn persist(&self, transcript: Transcript) {
        let mut parts = vec![MessagePart::text(transcript.text)];
        parts.extend(
            transcript
                .custom
                .into_iter()
                .map(|data: Value| MessagePart::Custom { data }),
        );
        if let Err(e) = self
            .messages
            .add_message(&self.key, MessageRole::Assistant, &parts)
            .await
        {
            tracing::error!(key = %self.key, error = %e, "Failed to persist assistant message");
        }
    }
}

//! Context router
//!
//! Picks the handler for the stored `currentContext`, streams the model's
//! answer through, and commits the handler's working memory patch once the
//! model is done.

pub mod instructions;

use crate::context::{load_or_reset, ContextError, ContextKey, ContextMemory, ContextPatch, ContextStore, ContextTag};
use crate::llm::{ContentBlock, FinishReason, LlmChunk, LlmMessage, LlmRequest, LlmService, ToolDefinition};
use crate::stream::SourceEvent;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Name of the working memory tool offered to the model
pub const MEMORY_TOOL: &str = "update_working_memory";

/// Model turns per request; a turn ending in tool calls gets one follow-up
const MAX_MODEL_TURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextHandler {
    Front,
    Plan,
    List,
}

impl ContextHandler {
    pub fn for_tag(tag: ContextTag) -> Self {
        match tag {
            ContextTag::Front => ContextHandler::Front,
            ContextTag::Plan => ContextHandler::Plan,
            ContextTag::List => ContextHandler::List,
        }
    }

    /// Handler for an unvalidated tag string, `Front` when unrecognized
    pub fn for_raw_tag(raw: &str) -> Self {
        Self::for_tag(ContextTag::parse_or_front(raw))
    }

    pub fn tag(self) -> ContextTag {
        match self {
            ContextHandler::Front => ContextTag::Front,
            ContextHandler::Plan => ContextTag::Plan,
            ContextHandler::List => ContextTag::List,
        }
    }

    pub fn instructions(self, memory: &ContextMemory) -> String {
        match self {
            ContextHandler::Front => instructions::front(memory),
            ContextHandler::Plan => instructions::plan(memory),
            ContextHandler::List => instructions::list(memory),
        }
    }

    /// The list handler writes nothing, so it gets no tool
    pub fn memory_tool(self) -> Option<ToolDefinition> {
        match self {
            ContextHandler::Front => Some(instructions::front_memory_tool()),
            ContextHandler::Plan => Some(instructions::plan_memory_tool()),
            ContextHandler::List => None,
        }
    }

    /// Run a memory tool call against the working copy
    ///
    /// Returns the tool result handed back to the model. A failed update
    /// leaves `working` untouched and reports `{error: true, message}`.
    pub fn run_memory_tool(self, working: &mut ContextMemory, name: &str, input: &Value) -> Value {
        if name != MEMORY_TOOL {
            return tool_error(format!("Unknown tool: {name}"));
        }
        let scoped = match ContextPatch::parse(self.tag(), input) {
            Ok(scoped) => scoped,
            Err(e) => return tool_error(e.to_string()),
        };
        if !scoped.dropped.is_empty() {
            tracing::warn!(
                context = %self.tag(),
                dropped = ?scoped.dropped,
                "Dropped working memory fields outside the handler's scope"
            );
        }
        match scoped.patch.apply(working) {
            Ok(()) => json!({ "ok": true }),
            Err(e) => tool_error(e.to_string()),
        }
    }
}

fn tool_error(message: String) -> Value {
    json!({ "error": true, "message": message })
}

/// Message of a tool result shaped `{error: true, message}`
pub fn tool_error_message(result: &Value) -> Option<String> {
    if result.get("error").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    Some(
        result
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Tool execution failed")
            .to_string(),
    )
}

pub struct ContextRouter {
    store: Arc<dyn ContextStore>,
    llm: Arc<dyn LlmService>,
    temperature: f32,
}

impl ContextRouter {
    pub fn new(store: Arc<dyn ContextStore>, llm: Arc<dyn LlmService>, temperature: f32) -> Self {
        Self {
            store,
            llm,
            temperature,
        }
    }

    /// Stream the active handler's answer
    ///
    /// Only a storage failure while loading the document is returned as an
    /// error; everything after that shows up in the stream. The patch is
    /// written after the model stream is exhausted, so a consumer that stops
    /// early writes nothing.
    pub async fn route(
        &self,
        key: &ContextKey,
        messages: Vec<LlmMessage>,
    ) -> Result<BoxStream<'static, SourceEvent>, ContextError> {
        let snapshot = load_or_reset(self.store.as_ref(), key).await?;
        let handler = ContextHandler::for_tag(snapshot.current_context);
        tracing::info!(key = %key, context = %handler.tag(), "Routing message");

        let request = LlmRequest {
            system: handler.instructions(&snapshot),
            messages,
            tools: handler.memory_tool().into_iter().collect(),
            temperature: Some(self.temperature),
        };

        let store = self.store.clone();
        let llm = self.llm.clone();
        let key = key.clone();

        let stream = async_stream::stream! {
            let mut request = request;
            let mut working = snapshot.clone();

            for turn in 0..MAX_MODEL_TURNS {
                let mut chunks = match llm.stream(&request).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        yield SourceEvent::Failed { message: e.message };
                        return;
                    }
                };

                let message_id = Uuid::new_v4().to_string();
                let mut text = String::new();
                let mut tool_uses = Vec::new();
                let mut tool_results = Vec::new();
                let mut finish = FinishReason::Stop;

                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(LlmChunk::TextDelta(delta)) => {
                            if text.is_empty() {
                                yield SourceEvent::TextStart { id: message_id.clone() };
                            }
                            text.push_str(&delta);
                            yield SourceEvent::TextDelta { id: message_id.clone(), delta };
                        }
                        Ok(LlmChunk::ToolCall { id, name, input }) => {
                            yield SourceEvent::ToolCall { name: name.clone() };
                            let result = handler.run_memory_tool(&mut working, &name, &input);
                            let error = tool_error_message(&result);
                            if let Some(message) = &error {
                                yield SourceEvent::ToolError { message: message.clone() };
                            }
                            tool_results.push(ContentBlock::tool_result(
                                id.clone(),
                                result.to_string(),
                                error.is_some(),
                            ));
                            tool_uses.push(ContentBlock::tool_use(id, name, input));
                        }
                        Ok(LlmChunk::Finish { reason, .. }) => finish = reason,
                        Err(e) => {
                            yield SourceEvent::Failed { message: e.message };
                            return;
                        }
                    }
                }
                if !text.is_empty() {
                    yield SourceEvent::TextEnd { id: message_id.clone() };
                }

                let follow_up = finish == FinishReason::ToolCalls
                    && !tool_uses.is_empty()
                    && turn + 1 < MAX_MODEL_TURNS;
                if !follow_up {
                    break;
                }

                let mut assistant = Vec::new();
                if !text.is_empty() {
                    assistant.push(ContentBlock::text(text));
                }
                assistant.extend(tool_uses);
                request.messages.push(LlmMessage::assistant(assistant));
                request.messages.push(LlmMessage {
                    role: crate::llm::MessageRole::User,
                    content: tool_results,
                });
            }

            if working != snapshot {
                match store.set(&key, &working).await {
                    Ok(()) => tracing::info!(key = %key, context = %handler.tag(), "Working memory updated"),
                    Err(e) => {
                        tracing::error!(key = %key, error = %e, "Failed to write working memory");
                        yield SourceEvent::Failed { message: e.to_string() };
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

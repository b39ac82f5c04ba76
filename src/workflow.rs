//! Workflow engine
//!
//! Named single-step procedures over the working memory. Input is checked
//! before anything runs; a failing step writes nothing and reports
//! `success: false`.

use crate::actions::ready_to_plan;
use crate::context::{load_or_reset, ContextError, ContextKey, ContextMemory, ContextStore, ContextTag, PlanData, PlanStatus, WorkflowName};
use crate::llm::{LlmChunk, LlmMessage, LlmRequest, LlmService};
use crate::router::instructions;
use crate::stream::SourceEvent;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Inputs and outputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    pub user_feedback: String,
}

/// Any `contextMemory` sent along is ignored; the stored document wins
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPlanInput {
    #[serde(default)]
    pub context_memory: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResetInput {}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowInput {
    Plan(PlanInput),
    ApplyPlan(ApplyPlanInput),
    Reset(ResetInput),
}

impl WorkflowInput {
    /// Validate `input` against the workflow's input shape
    ///
    /// A missing (`null`) input counts as `{}`.
    pub fn parse(workflow: WorkflowName, input: Value) -> Result<Self, WorkflowError> {
        let input = if input.is_null() { json!({}) } else { input };
        let invalid = |e: serde_json::Error| WorkflowError::InvalidInput {
            workflow,
            reason: e.to_string(),
        };
        Ok(match workflow {
            WorkflowName::PlanWorkflow => Self::Plan(serde_json::from_value(input).map_err(invalid)?),
            WorkflowName::ApplyPlanWorkflow => {
                Self::ApplyPlan(serde_json::from_value(input).map_err(invalid)?)
            }
            WorkflowName::ResetContextWorkflow => Self::Reset(serde_json::from_value(input).map_err(invalid)?),
        })
    }

    /// Parse both the wire workflow name and its input
    pub fn from_request(name: &str, input: Value) -> Result<Self, WorkflowError> {
        let workflow = WorkflowName::parse(name).ok_or_else(|| WorkflowError::UnknownWorkflow(name.to_string()))?;
        Self::parse(workflow, input)
    }

    pub fn workflow(&self) -> WorkflowName {
        match self {
            Self::Plan(_) => WorkflowName::PlanWorkflow,
            Self::ApplyPlan(_) => WorkflowName::ApplyPlanWorkflow,
            Self::Reset(_) => WorkflowName::ResetContextWorkflow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutput {
    pub result: String,
    pub success: bool,
}

/// Item of a workflow run: visible output, then exactly one `Finished`
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    Output(SourceEvent),
    Finished(StepOutput),
}

impl StepEvent {
    /// Fold into the multiplexer's input; the step output travels as custom data
    pub fn into_source(self, workflow: WorkflowName) -> SourceEvent {
        match self {
            StepEvent::Output(event) => event,
            StepEvent::Finished(output) => SourceEvent::Custom {
                id: Uuid::new_v4().to_string(),
                data: json!({
                    "workflowName": workflow,
                    "result": output.result,
                    "success": output.success,
                }),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),
    #[error("Invalid input for {workflow}: {reason}")]
    InvalidInput { workflow: WorkflowName, reason: String },
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("Model error: {0}")]
    Model(String),
}

// ============================================================================
// Engine
// ============================================================================

pub struct WorkflowEngine {
    store: Arc<dyn ContextStore>,
    llm: Arc<dyn LlmService>,
    temperature: f32,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn ContextStore>, llm: Arc<dyn LlmService>, temperature: f32) -> Self {
        Self {
            store,
            llm,
            temperature,
        }
    }

    /// Start a workflow run for `key`
    ///
    /// Fails up front only when the working memory cannot be read. Step
    /// failures are reported in the stream.
    pub async fn run(
        &self,
        key: &ContextKey,
        input: WorkflowInput,
    ) -> Result<BoxStream<'static, StepEvent>, WorkflowError> {
        let memory = load_or_reset(self.store.as_ref(), key).await?;
        let workflow = input.workflow();
        tracing::info!(key = %key, workflow = %workflow, "Running workflow");

        let store = self.store.clone();
        let llm = self.llm.clone();
        let temperature = self.temperature;
        let key = key.clone();

        let stream = async_stream::stream! {
            let mut text = String::new();
            let outcome: Result<String, WorkflowError> = match input {
                WorkflowInput::Plan(input) => {
                    match check_plan_preconditions(&memory) {
                        Err(e) => Err(e),
                        Ok(()) => {
                            let request = LlmRequest {
                                system: instructions::plan_executor(&memory),
                                messages: vec![LlmMessage::user(input.user_feedback)],
                                tools: Vec::new(),
                                temperature: Some(temperature),
                            };
                            let message_id = Uuid::new_v4().to_string();
                            let mut failure = None;
                            match llm.stream(&request).await {
                                Err(e) => failure = Some(WorkflowError::Model(e.message)),
                                Ok(mut chunks) => {
                                    while let Some(chunk) = chunks.next().await {
                                        match chunk {
                                            Ok(LlmChunk::TextDelta(delta)) => {
                                                if text.is_empty() {
                                                    yield StepEvent::Output(SourceEvent::TextStart { id: message_id.clone() });
                                                }
                                                text.push_str(&delta);
                                                yield StepEvent::Output(SourceEvent::TextDelta { id: message_id.clone(), delta });
                                            }
                                            Ok(_) => {}
                                            Err(e) => {
                                                failure = Some(WorkflowError::Model(e.message));
                                                break;
                                            }
                                        }
                                    }
                                }
                            }
                            if !text.is_empty() {
                                yield StepEvent::Output(SourceEvent::TextEnd { id: message_id });
                            }
                            match failure {
                                Some(e) => Err(e),
                                None if text.trim().is_empty() => {
                                    Err(WorkflowError::Model("the model returned no plan".to_string()))
                                }
                                None => {
                                    let mut planned = memory.clone();
                                    planned.plan_data = PlanData::planned(text.clone(), WorkflowName::PlanWorkflow);
                                    store.set(&key, &planned).await.map(|()| text.clone()).map_err(WorkflowError::from)
                                }
                            }
                        }
                    }
                }
                WorkflowInput::ApplyPlan(_) | WorkflowInput::Reset(_) => {
                    reset_step(store.as_ref(), &key, &memory, workflow).await
                }
            };

            match outcome {
                Ok(result) => {
                    tracing::info!(key = %key, workflow = %workflow, "Workflow step succeeded");
                    // The plan step already streamed its text
                    if workflow != WorkflowName::PlanWorkflow {
                        let id = Uuid::new_v4().to_string();
                        yield StepEvent::Output(SourceEvent::TextStart { id: id.clone() });
                        yield StepEvent::Output(SourceEvent::TextDelta { id: id.clone(), delta: result.clone() });
                        yield StepEvent::Output(SourceEvent::TextEnd { id });
                    }
                    yield StepEvent::Finished(StepOutput { result, success: true });
                }
                Err(e) => {
                    tracing::warn!(key = %key, workflow = %workflow, error = %e, "Workflow step failed");
                    let result = format!("Sorry, an error occurred: {e}");
                    yield StepEvent::Output(SourceEvent::ToolError { message: result.clone() });
                    yield StepEvent::Finished(StepOutput { result, success: false });
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// Apply and reset both end in a full reset; only the guard and message differ
async fn reset_step(
    store: &dyn ContextStore,
    key: &ContextKey,
    memory: &ContextMemory,
    workflow: WorkflowName,
) -> Result<String, WorkflowError> {
    let result = match workflow {
        WorkflowName::ApplyPlanWorkflow if memory.plan_data.status == PlanStatus::Planned => {
            let plan = memory.plan_data.plan.as_deref().unwrap_or_default();
            format!("{plan}\n\nhas been executed.")
        }
        WorkflowName::ApplyPlanWorkflow => {
            return Err(WorkflowError::PreconditionFailed(format!(
                "there is no planned plan to apply (status is {})",
                memory.plan_data.status
            )));
        }
        _ if memory.current_context == ContextTag::Plan => "The plan was cancelled.".to_string(),
        _ => {
            return Err(WorkflowError::PreconditionFailed(format!(
                "reset only applies to the plan context (current context is {})",
                memory.current_context
            )));
        }
    };
    store.reset(key).await?;
    Ok(result)
}

fn check_plan_preconditions(memory: &ContextMemory) -> Result<(), WorkflowError> {
    if memory.current_context != ContextTag::Plan {
        return Err(WorkflowError::PreconditionFailed(format!(
            "planning needs the plan context (current context is {})",
            memory.current_context
        )));
    }
    if memory.plan_data.status != PlanStatus::None {
        return Err(WorkflowError::PreconditionFailed(format!(
            "a plan already exists (status is {})",
            memory.plan_data.status
        )));
    }
    if !ready_to_plan(memory) {
        return Err(WorkflowError::PreconditionFailed(
            "the required information is not complete yet".to_string(),
        ));
    }
    Ok(())
}

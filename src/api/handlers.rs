//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ActionsResponse, CancelResponse, ChatRequest, ContextResponse, DetectQuery, DetectResponse, ErrorResponse,
    InvokeActionRequest, KeyParams, MessagesQuery, MessagesResponse, WorkflowRequest,
    WorkflowsResponse, DEFAULT_MESSAGE_LIMIT,
};
use super::AppState;
use crate::actions::{ActionEmit, ActionError};
use crate::catalog;
use crate::context::{ContextError, ContextMemory};
use crate::runtime::{ChatTurn, OrchestratorError};
use crate::workflow::{WorkflowError, WorkflowInput};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Streaming
        .route("/api/chat", post(chat))
        .route("/api/chat/cancel", post(cancel_chat))
        .route("/api/workflow", post(run_workflow))
        // Working memory
        .route("/api/context", get(get_context).delete(reset_context))
        // Actions
        .route("/api/actions", get(list_actions))
        .route("/api/actions/invoke", post(invoke_action))
        // History
        .route("/api/messages", get(list_messages))
        // Workflow catalog
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/detect", get(detect_workflow))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Streaming
// ============================================================

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Response, AppError> {
    let key = req.key.key();
    let last = req
        .messages
        .last()
        .ok_or_else(|| AppError::BadRequest("messages must not be empty".to_string()))?;

    let text = last.text();
    if text.trim().is_empty() && last.workflow_name().is_none() {
        return Err(AppError::BadRequest("last message has no text".to_string()));
    }

    let turn = ChatTurn::new(text, last.workflow_name()).map_err(OrchestratorError::from)?;
    tracing::info!(
        key = %key,
        workflow = ?turn.workflow.as_ref().map(WorkflowInput::workflow),
        "Chat request"
    );

    let events = state.orchestrator.chat(&key, turn).await?;
    Ok(sse_stream(events).into_response())
}

async fn run_workflow(
    State(state): State<AppState>,
    Json(req): Json<WorkflowRequest>,
) -> Result<Response, AppError> {
    let key = req.key.key();
    let input = WorkflowInput::from_request(&req.workflow_name, req.input).map_err(OrchestratorError::from)?;
    let events = state.orchestrator.run_workflow(&key, input).await?;
    Ok(sse_stream(events).into_response())
}

async fn cancel_chat(State(state): State<AppState>, Json(req): Json<KeyParams>) -> Json<CancelResponse> {
    let cancelled = state.orchestrator.cancel(&req.key());
    Json(CancelResponse { ok: cancelled })
}

// ============================================================
// Working memory
// ============================================================

async fn get_context(
    State(state): State<AppState>,
    Query(query): Query<KeyParams>,
) -> Result<Json<ContextResponse>, AppError> {
    let context_data = state.orchestrator.context(&query.key()).await?;
    Ok(Json(ContextResponse { context_data }))
}

async fn reset_context(
    State(state): State<AppState>,
    Query(query): Query<KeyParams>,
) -> Result<Json<ContextMemory>, AppError> {
    let memory = state.orchestrator.reset_context(&query.key()).await?;
    Ok(Json(memory))
}

// ============================================================
// Actions
// ============================================================

async fn list_actions(
    State(state): State<AppState>,
    Query(query): Query<KeyParams>,
) -> Result<Json<ActionsResponse>, AppError> {
    let (context, actions) = state.orchestrator.actions(&query.key()).await?;
    Ok(Json(ActionsResponse { context, actions }))
}

async fn invoke_action(
    State(state): State<AppState>,
    Json(req): Json<InvokeActionRequest>,
) -> Result<Json<ActionEmit>, AppError> {
    let emit = state.orchestrator.invoke_action(&req.key.key(), &req.action_id).await?;
    Ok(Json(emit))
}

// ============================================================
// History
// ============================================================

async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, AppError> {
    let key = query.key();
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let (messages, total_count) = state.orchestrator.messages(&key, limit).await?;
    Ok(Json(MessagesResponse {
        messages,
        thread_id: key.thread_id,
        resource_id: key.resource_id,
        total_count,
    }))
}

// ============================================================
// Workflow catalog
// ============================================================

async fn list_workflows() -> Json<WorkflowsResponse> {
    Json(WorkflowsResponse {
        workflows: catalog::WORKFLOWS,
    })
}

async fn detect_workflow(Query(query): Query<DetectQuery>) -> Json<DetectResponse> {
    let detection = catalog::detect_workflows(&query.text);
    let (extracted_data, readiness, suggestion) = match detection.workflows.first() {
        Some(workflow) => {
            let extracted = catalog::extract_workflow_data(&query.text, workflow);
            let readiness = catalog::check_readiness(workflow, &extracted);
            let suggestion = catalog::suggestion_message(workflow, &readiness.missing_data, &extracted);
            (extracted, Some(readiness), Some(suggestion))
        }
        None => (serde_json::Map::new(), None, None),
    };
    Json(DetectResponse {
        detection,
        extracted_data,
        readiness,
        suggestion,
    })
}

async fn get_version() -> &'static str {
    concat!("context-orchestrator ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<ContextError> for AppError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::StorageUnavailable(_) => AppError::Unavailable(e.to_string()),
            ContextError::NotFound(_) | ContextError::MalformedState { .. } => AppError::Internal(e.to_string()),
        }
    }
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Workflow(WorkflowError::Context(e)) | OrchestratorError::Context(e) => e.into(),
            OrchestratorError::Workflow(e @ (WorkflowError::UnknownWorkflow(_) | WorkflowError::InvalidInput { .. })) => {
                AppError::BadRequest(e.to_string())
            }
            OrchestratorError::Workflow(e @ WorkflowError::PreconditionFailed(_)) => AppError::Conflict(e.to_string()),
            OrchestratorError::Workflow(e @ WorkflowError::Model(_)) => AppError::Internal(e.to_string()),
            OrchestratorError::Action(e @ ActionError::UnknownAction { .. }) => AppError::NotFound(e.to_string()),
            OrchestratorError::Action(e @ ActionError::NotExecutable { .. }) => AppError::Conflict(e.to_string()),
            OrchestratorError::Storage(msg) => AppError::Unavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        }

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextKey, ContextStore, ContextTag};
    use crate::llm::{FinishReason, LlmChunk, Usage};
    use crate::runtime::testing::{InMemoryContextStore, InMemoryMessageStore, MockLlmService};
    use crate::runtime::Orchestrator;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        store: Arc<InMemoryContextStore>,
        llm: Arc<MockLlmService>,
    }

    fn app() -> TestApp {
        let store = Arc::new(InMemoryContextStore::new());
        let llm = Arc::new(MockLlmService::new("mock"));
        let orchestrator = Orchestrator::new(store.clone(), Arc::new(InMemoryMessageStore::new()), llm.clone(), 0.0);
        TestApp {
            router: create_router(AppState::new(orchestrator)),
            store,
            llm,
        }
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn json_body(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    fn chat_body(text: &str, workflow: Option<&str>) -> Value {
        let mut message = json!({ "role": "user", "parts": [{ "type": "text", "text": text }] });
        if let Some(name) = workflow {
            message["metadata"] = json!({ "workflow": { "name": name } });
        }
        json!({ "messages": [message], "threadId": "t-1", "resourceId": "u-1" })
    }

    #[tokio::test]
    async fn test_context_missing_then_reset() {
        let app = app();
        let (status, body) = send(&app.router, Method::GET, "/api/context?threadId=t-1&resourceId=u-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({ "contextData": null }));

        let (status, body) = send(&app.router, Method::DELETE, "/api/context?threadId=t-1&resourceId=u-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["currentContext"], "front");
        assert_eq!(json_body(&body)["planData"]["plan"], Value::Null);

        // A present document comes back under the same key
        let (status, body) = send(&app.router, Method::GET, "/api/context?threadId=t-1&resourceId=u-1", None).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(&body);
        assert_eq!(body["contextData"]["currentContext"], "front");
        assert_eq!(body["contextData"]["planData"]["status"], "none");
        assert_eq!(body.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_streams_sse_and_records_history() {
        let app = app();
        app.llm.queue_chunks(vec![
            LlmChunk::TextDelta("Hi there".to_string()),
            LlmChunk::Finish {
                reason: FinishReason::Stop,
                usage: Usage::default(),
            },
        ]);

        let (status, body) = send(&app.router, Method::POST, "/api/chat", Some(chat_body("hello", None))).await;
        assert_eq!(status, StatusCode::OK);

        let data: Vec<&str> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        assert_eq!(data.last(), Some(&"[DONE]"));
        let events: Vec<Value> = data[..data.len() - 1].iter().map(|d| json_body(d)).collect();
        assert_eq!(events[0]["type"], "data-status");
        assert_eq!(events[0]["data"]["status"], "started");
        assert!(events
            .iter()
            .any(|e| e["type"] == "text-delta" && e["delta"] == "Hi there"));

        let (_, body) = send(&app.router, Method::GET, "/api/messages?threadId=t-1&resourceId=u-1&limit=1", None).await;
        let messages = json_body(&body);
        assert_eq!(messages["totalCount"], 2);
        assert_eq!(messages["messages"].as_array().unwrap().len(), 1);
        assert_eq!(messages["messages"][0]["role"], "assistant");
    }

    #[tokio::test]
    async fn test_chat_rejects_unknown_workflow_and_empty_messages() {
        let app = app();
        let (status, _) = send(
            &app.router,
            Method::POST,
            "/api/chat",
            Some(chat_body("go", Some("deployWorkflow"))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app.router, Method::POST, "/api/chat", Some(json!({ "messages": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_body(&body)["error"].is_string());
    }

    #[tokio::test]
    async fn test_workflow_input_validation() {
        let app = app();
        let (status, _) = send(
            &app.router,
            Method::POST,
            "/api/workflow",
            Some(json!({ "workflowName": "planWorkflow", "input": { "feedback": "x" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/workflow",
            Some(json!({ "workflowName": "resetContextWorkflow", "input": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // Default context is front, so the reset step refuses
        assert!(body.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn test_actions_listing_and_invoke() {
        let app = app();
        let (status, body) = send(&app.router, Method::GET, "/api/actions", None).await;
        assert_eq!(status, StatusCode::OK);
        let listing = json_body(&body);
        assert_eq!(listing["context"], "front");
        assert_eq!(listing["actions"][0]["id"], "plan");
        assert_eq!(listing["actions"][0]["type"], "button");

        app.store
            .set(
                &ContextKey::new("default-thread", "default-user"),
                &ContextMemory {
                    current_context: ContextTag::Plan,
                    ..ContextMemory::default()
                },
            )
            .await
            .unwrap();

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/api/actions/invoke",
            Some(json!({ "actionId": "plan" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/api/actions/invoke",
            Some(json!({ "actionId": "self-destruct" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/actions/invoke",
            Some(json!({ "actionId": "reset" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_body(&body),
            json!({ "event": "runWorkflow", "workflowName": "resetContextWorkflow" })
        );
    }

    #[tokio::test]
    async fn test_cancel_without_request() {
        let app = app();
        let (status, body) = send(&app.router, Method::POST, "/api/chat/cancel", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({ "ok": false }));
    }

    #[tokio::test]
    async fn test_catalog_endpoints() {
        let app = app();
        let (status, body) = send(&app.router, Method::GET, "/api/workflows", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["workflows"].as_array().unwrap().len(), 4);

        let (status, body) = send(
            &app.router,
            Method::GET,
            "/api/workflows/detect?text=monthly%20report%20please",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let detection = json_body(&body);
        assert_eq!(detection["workflows"][0]["id"], "report-generation");
        assert!(detection["suggestion"].is_string());

        let (_, body) = send(&app.router, Method::GET, "/api/workflows/detect?text=hello", None).await;
        assert!(json_body(&body)["workflows"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_version() {
        let (status, body) = send(&app().router, Method::GET, "/version", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("context-orchestrator "));
    }
}

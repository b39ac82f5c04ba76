//! Context orchestrator
//!
//! Routes a conversation across context handlers and workflows, keeps the
//! per-thread working memory, and streams merged events to the client.

mod actions;
mod api;
mod catalog;
mod context;
mod db;
mod llm;
mod router;
mod runtime;
mod stream;
mod workflow;

use api::{create_router, AppState};
use db::Database;
use llm::{LlmConfig, LlmService};
use runtime::{DatabaseStorage, Orchestrator};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "context_orchestrator=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("ORCHESTRATOR_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.context-orchestrator/orchestrator.db")
    });

    let port: u16 = std::env::var("ORCHESTRATOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %db_path, "Opening database");
    let storage = Arc::new(DatabaseStorage::new(Database::open(&db_path)?));

    let llm_config = LlmConfig::from_env();
    let llm = llm_config.build()?;
    tracing::info!(model = %llm.model_id(), base_url = %llm_config.base_url, "Model client ready");

    let orchestrator = Orchestrator::new(storage.clone(), storage, llm, llm_config.temperature);
    let state = AppState::new(orchestrator);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Context orchestrator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

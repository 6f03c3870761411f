//! HTTP front-end for the orchestrator.
//!
//! Each analysis request prepares its own copy of the repository (a
//! shallow clone in a temporary directory) and runs the orchestrator
//! against it. `file://` repositories are analyzed in place, so they are
//! refused unless they sit under the configured local root, and even then
//! fixes are never written. The run is tied to the request: if the client goes away
//! the handler future is dropped, the drop guard fires and the agents
//! are cancelled.

mod error;
mod handlers;

use crate::orchestrator::AgentTaskOrchestrator;
use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AgentTaskOrchestrator>,
    /// Only `file://` repositories under this directory are served.
    /// `None` rejects them all.
    pub local_root: Option<Arc<PathBuf>>,
}

impl AppState {
    pub fn new(orchestrator: AgentTaskOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            local_root: None,
        }
    }

    pub fn with_local_root(mut self, root: Option<PathBuf>) -> Self {
        self.local_root = root.map(Arc::new);
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/agent-tasks", api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(handlers::list_agents))
        .route("/execute-full-analysis", post(handlers::execute_full_analysis))
        .route(
            "/execute-specific-agents",
            post(handlers::execute_specific_agents),
        )
        .route(
            "/estimate-execution-time",
            post(handlers::estimate_execution_time),
        )
}

/// Serve until Ctrl-C.
pub async fn run_server(state: AppState, address: &str) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("Server listening on {}", address);

    match axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => error!("Server error: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

use super::error::{ApiError, Result};
use super::AppState;
use crate::models::{
    AgentTaskExecutionRequest, AgentTaskExecutionResponse, AvailableAgentsResponse,
    ExecutionTimeEstimate, SpecificAgentAnalysisRequest,
};
use crate::repo::{prepare_repository, CloneResult};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "agent-tasks",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/agent-tasks/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AvailableAgentsResponse> {
    Json(state.orchestrator.available_agents_response())
}

/// POST /api/agent-tasks/execute-full-analysis
pub async fn execute_full_analysis(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AgentTaskExecutionRequest>, JsonRejection>,
) -> Result<Json<AgentTaskExecutionResponse>> {
    let Json(mut request) = payload?;
    request.validate()?;
    confine_local(&state, &request.repository_url, &mut request.dry_run)?;

    info!("Full analysis requested for {}", request.repository_url);
    let repo = prepare(&request.repository_url, &request.branch).await?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let response = state
        .orchestrator
        .execute(&request, repo.repo_path(), &cancel)
        .await?;

    Ok(Json(response))
}

/// POST /api/agent-tasks/execute-specific-agents
pub async fn execute_specific_agents(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SpecificAgentAnalysisRequest>, JsonRejection>,
) -> Result<Json<AgentTaskExecutionResponse>> {
    let Json(mut request) = payload?;
    request.validate()?;
    confine_local(&state, &request.repository_url, &mut request.dry_run)?;
    // Reject unknown names before paying for a clone.
    state.orchestrator.check_known(&request.agent_names)?;

    info!(
        "Specific analysis ({}) requested for {}",
        request.agent_names.join(", "),
        request.repository_url
    );
    let repo = prepare(&request.repository_url, &request.branch).await?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let response = state
        .orchestrator
        .execute_specific(request, repo.repo_path(), &cancel)
        .await?;

    Ok(Json(response))
}

/// POST /api/agent-tasks/estimate-execution-time
pub async fn estimate_execution_time(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<ExecutionTimeEstimate>> {
    let Json(names) = payload?;

    let estimate = state.orchestrator.estimate_total_execution_time(&names);
    let agents_count = state
        .orchestrator
        .registry()
        .iter()
        .filter(|a| names.is_empty() || names.iter().any(|n| n == a.name()))
        .count();

    Ok(Json(ExecutionTimeEstimate {
        estimated_execution_time_seconds: estimate.as_secs(),
        agents_count,
        specified_agents: names,
    }))
}

/// Admit a `file://` repository only when it resolves to a path under
/// the server's local root, and never write fixes into it.
fn confine_local(state: &AppState, url: &str, dry_run: &mut bool) -> Result<()> {
    let Some(local) = url.trim().strip_prefix("file://") else {
        return Ok(());
    };
    let Some(root) = state.local_root.as_deref() else {
        return Err(ApiError::BadRequest(
            "file:// repositories are not accepted by this server".to_string(),
        ));
    };

    let root = root
        .canonicalize()
        .map_err(|e| ApiError::Internal(format!("local root {}: {}", root.display(), e)))?;
    let outside = || ApiError::BadRequest(format!("{} is not under the server's local root", url));
    let path = Path::new(local).canonicalize().map_err(|_| outside())?;
    if !path.starts_with(&root) {
        return Err(outside());
    }

    if !*dry_run {
        info!("Local repository {} is analyzed in dry-run mode", path.display());
        *dry_run = true;
    }
    Ok(())
}

/// Clone (or open) the repository off the async runtime.
async fn prepare(url: &str, branch: &str) -> Result<CloneResult> {
    let url = url.to_string();
    let branch = branch.to_string();
    tokio::task::spawn_blocking(move || prepare_repository(&url, Some(&branch), false))
        .await?
        .map_err(ApiError::Repository)
}

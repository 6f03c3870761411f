//! The agent task orchestrator.
//!
//! One execution runs like this:
//!
//! 1. The request is validated and an immutable
//!    [`RepositoryAnalysisContext`] is built for the prepared repository.
//! 2. Every registered agent admitted by the include/exclude lists and
//!    whose [`Agent::can_execute`] returns true is selected.
//! 3. Selected agents are spawned in priority order and run behind a
//!    semaphore. Each finished result is truncated and its fixes are
//!    applied (or only previewed in dry-run mode).
//! 4. When the time budget expires, or the caller cancels, agents still
//!    waiting for a permit are skipped and running agents are cancelled
//!    and marked failed. Their partial findings are discarded.
//! 5. Results are ordered by priority and consolidated into a report.

use crate::agent::{Agent, AgentRegistry};
use crate::analysis::{consolidate, polish_summary};
use crate::error::OrchestratorError;
use crate::fixes::FixApplier;
use crate::llm::AiGateway;
use crate::models::{
    AgentInfo, AgentTaskExecutionRequest, AgentTaskExecutionResponse, AgentTaskResult,
    AvailableAgentsResponse, ExecutionStatus, RepositoryAnalysisContext,
    SpecificAgentAnalysisRequest,
};
use crate::repo::{owner_from_url, repository_name_from_url};
use crate::scanner::{detect_languages_async, ScanConfig};
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long cancelled agents get to wind down before their tasks are aborted.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Tunables that do not come from the request.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Upper bound on concurrently running agents.
    pub max_concurrent_agents: usize,
    /// Ask the completion service to reword the executive summary.
    pub ai_summary: bool,
    /// Scanner settings used for language detection.
    pub scan: ScanConfig,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_concurrency(),
            ai_summary: false,
            scan: ScanConfig::default(),
        }
    }
}

/// Half the available cores, at least one.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

/// What happened to one spawned agent task.
enum AgentOutcome {
    Finished(AgentTaskResult),
    /// Stopped before a permit was granted.
    NotStarted,
    /// Cancelled while the agent was running.
    Interrupted { elapsed_ms: u64 },
}

/// Per-request limits every agent task needs after it finishes.
#[derive(Debug, Clone, Copy)]
struct RunLimits {
    max_findings: usize,
    include_auto_fix: bool,
    dry_run: bool,
}

pub struct AgentTaskOrchestrator {
    registry: Arc<AgentRegistry>,
    fixes: Arc<FixApplier>,
    settings: OrchestratorSettings,
    ai: Option<AiGateway>,
}

impl AgentTaskOrchestrator {
    pub fn new(registry: AgentRegistry, settings: OrchestratorSettings) -> Self {
        Self {
            registry: Arc::new(registry),
            fixes: Arc::new(FixApplier::new()),
            settings,
            ai: None,
        }
    }

    /// Gateway used for the optional AI executive summary.
    pub fn with_ai(mut self, ai: Option<AiGateway>) -> Self {
        self.ai = ai;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Every registered agent, in priority order.
    pub fn available_agents(&self) -> Vec<AgentInfo> {
        self.registry
            .iter()
            .map(|agent| AgentInfo {
                name: agent.name().to_string(),
                description: agent.description().to_string(),
                priority: agent.priority(),
                estimated_execution_time_seconds: agent.estimate_execution_time().as_secs(),
            })
            .collect()
    }

    pub fn available_agents_response(&self) -> AvailableAgentsResponse {
        let agents = self.available_agents();
        AvailableAgentsResponse {
            estimated_total_time_seconds: agents
                .iter()
                .map(|a| a.estimated_execution_time_seconds)
                .sum(),
            total_agents: agents.len(),
            agents,
        }
    }

    /// Sum of the estimates of the named agents, or of all agents when
    /// `names` is empty. Unknown names contribute nothing.
    pub fn estimate_total_execution_time(&self, names: &[String]) -> Duration {
        self.registry
            .iter()
            .filter(|agent| names.is_empty() || names.iter().any(|n| n == agent.name()))
            .map(|agent| agent.estimate_execution_time())
            .sum()
    }

    /// Run a full analysis against an already prepared repository.
    pub async fn execute(
        &self,
        request: &AgentTaskExecutionRequest,
        repo_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<AgentTaskExecutionResponse, OrchestratorError> {
        request.validate()?;
        let budget = Duration::from_secs(request.max_execution_time_minutes.saturating_mul(60));
        Ok(self.run(request, repo_path, cancel, budget).await)
    }

    /// Run exactly the named agents.
    pub async fn execute_specific(
        &self,
        request: SpecificAgentAnalysisRequest,
        repo_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<AgentTaskExecutionResponse, OrchestratorError> {
        request.validate()?;
        self.check_known(&request.agent_names)?;
        let request = request.into_execution_request();
        self.execute(&request, repo_path, cancel).await
    }

    /// Reject names that match no registered agent.
    pub fn check_known(&self, names: &[String]) -> Result<(), OrchestratorError> {
        let unknown: Vec<String> = names
            .iter()
            .filter(|n| !n.trim().is_empty() && self.registry.get(n).is_none())
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::UnknownAgents(unknown))
        }
    }

    async fn build_context(
        &self,
        execution_id: Uuid,
        request: &AgentTaskExecutionRequest,
        repo_path: &Path,
    ) -> RepositoryAnalysisContext {
        let detected = detect_languages_async(repo_path, &self.settings.scan).await;
        let programming_languages = match detected {
            Ok(languages) => languages,
            Err(e) => {
                warn!(execution_id = %execution_id, "Language detection failed: {}", e);
                Vec::new()
            }
        };

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert(
            "repositoryPath".to_string(),
            Value::from(repo_path.display().to_string()),
        );

        RepositoryAnalysisContext {
            execution_id,
            repository_url: request.repository_url.clone(),
            branch: request.branch.clone(),
            repository_name: repository_name_from_url(&request.repository_url),
            owner: owner_from_url(&request.repository_url),
            programming_languages,
            include_auto_fix: request.include_auto_fix,
            dry_run: request.dry_run,
            max_findings_per_agent: request.max_findings_per_agent,
            agent_options: request.agent_specific_options.clone(),
            metadata,
        }
    }

    /// Select agents in priority order, keeping their registry index.
    async fn select(
        &self,
        request: &AgentTaskExecutionRequest,
        repo_path: &Path,
        ctx: &RepositoryAnalysisContext,
    ) -> Vec<(usize, Arc<dyn Agent>)> {
        if self.registry.is_empty() {
            warn!("No agents registered");
        }

        let mut selected = Vec::new();
        for (idx, agent) in self.registry.iter().enumerate() {
            if !request.admits(agent.name()) {
                debug!(agent = agent.name(), "Not requested");
                continue;
            }
            if !agent.can_execute(repo_path, ctx).await {
                info!(agent = agent.name(), "Not applicable to this repository");
                continue;
            }
            selected.push((idx, agent.clone()));
        }
        selected
    }

    /// Run a validated request with an explicit time budget.
    pub(crate) async fn run(
        &self,
        request: &AgentTaskExecutionRequest,
        repo_path: &Path,
        cancel: &CancellationToken,
        budget: Duration,
    ) -> AgentTaskExecutionResponse {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            execution_id = %execution_id,
            repository = %request.repository_url,
            "Starting agent task execution"
        );

        let ctx = Arc::new(self.build_context(execution_id, request, repo_path).await);
        let selected = self.select(request, repo_path, &ctx).await;
        info!(
            execution_id = %execution_id,
            "Selected {} of {} agents",
            selected.len(),
            self.registry.len()
        );

        let limits = RunLimits {
            max_findings: request.max_findings_per_agent,
            include_auto_fix: request.include_auto_fix,
            dry_run: request.dry_run,
        };
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_agents.max(1)));
        let run_token = cancel.child_token();

        let handles: Vec<_> = selected
            .iter()
            .map(|(_, agent)| {
                let agent = agent.clone();
                let ctx = ctx.clone();
                let path = repo_path.to_path_buf();
                let semaphore = semaphore.clone();
                let token = run_token.clone();
                let fixes = self.fixes.clone();
                tokio::spawn(run_agent(agent, ctx, path, semaphore, token, fixes, limits))
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let mut timed_out = false;
        let joined = join_all(handles);
        tokio::pin!(joined);

        let outcomes = tokio::select! {
            outcomes = &mut joined => outcomes,
            _ = tokio::time::sleep(budget) => {
                timed_out = true;
                warn!(
                    execution_id = %execution_id,
                    "Execution budget of {}s exhausted, cancelling remaining agents",
                    budget.as_secs()
                );
                run_token.cancel();
                match tokio::time::timeout(CANCEL_GRACE, &mut joined).await {
                    Ok(outcomes) => outcomes,
                    Err(_) => {
                        warn!(execution_id = %execution_id, "Aborting agents that ignored cancellation");
                        for abort in &aborts {
                            abort.abort();
                        }
                        joined.await
                    }
                }
            }
        };

        // Only a cancellation that stopped some agent makes the run cancelled.
        let interrupted = outcomes.iter().any(|outcome| {
            matches!(
                outcome,
                Ok(AgentOutcome::NotStarted | AgentOutcome::Interrupted { .. })
            )
        });
        let caller_cancelled = !timed_out && interrupted && cancel.is_cancelled();
        let (skip_reason, interrupt_reason) = if timed_out {
            (
                "execution time budget exhausted".to_string(),
                format!(
                    "timed out after exceeding the {}s execution budget",
                    budget.as_secs()
                ),
            )
        } else {
            ("execution cancelled".to_string(), "cancelled".to_string())
        };

        let mut ordered: Vec<(usize, AgentTaskResult)> = selected
            .iter()
            .zip(outcomes)
            .map(|((idx, agent), outcome)| {
                let result = match outcome {
                    Ok(AgentOutcome::Finished(result)) => result,
                    Ok(AgentOutcome::NotStarted) => AgentTaskResult::skipped(
                        execution_id,
                        agent.name(),
                        agent.priority(),
                        &skip_reason,
                    ),
                    Ok(AgentOutcome::Interrupted { elapsed_ms }) => AgentTaskResult::failed(
                        execution_id,
                        agent.name(),
                        agent.priority(),
                        &interrupt_reason,
                        elapsed_ms,
                    ),
                    Err(e) if e.is_panic() => {
                        let message = panic_message(e.into_panic());
                        warn!(execution_id = %execution_id, agent = agent.name(), "Agent panicked: {}", message);
                        AgentTaskResult::failed(
                            execution_id,
                            agent.name(),
                            agent.priority(),
                            &format!("agent panicked: {}", message),
                            0,
                        )
                    }
                    Err(_) => AgentTaskResult::failed(
                        execution_id,
                        agent.name(),
                        agent.priority(),
                        &interrupt_reason,
                        0,
                    ),
                };
                (*idx, result)
            })
            .collect();
        ordered.sort_by_key(|(idx, result)| (result.priority, *idx));
        let agent_results: Vec<AgentTaskResult> = ordered.into_iter().map(|(_, r)| r).collect();

        let total_time = clock.elapsed();
        let mut report = consolidate(&agent_results, total_time);
        if self.settings.ai_summary && !caller_cancelled {
            if let Some(ai) = &self.ai {
                report.executive_summary =
                    polish_summary(ai, &report.executive_summary, cancel).await;
            }
        }

        let status = if timed_out {
            ExecutionStatus::TimedOut
        } else if caller_cancelled {
            ExecutionStatus::Cancelled
        } else {
            ExecutionStatus::Completed
        };

        info!(
            execution_id = %execution_id,
            status = %status,
            findings = report.total_findings,
            "Agent task execution finished in {}ms",
            total_time.as_millis()
        );

        AgentTaskExecutionResponse {
            execution_id,
            status,
            started_at,
            completed_at: Utc::now(),
            total_execution_time_ms: total_time.as_millis() as u64,
            error_message: None,
            repository_url: request.repository_url.clone(),
            repository_name: ctx.repository_name.clone(),
            agent_results,
            consolidated_report: Some(report),
        }
    }
}

/// Body of one spawned agent task.
async fn run_agent(
    agent: Arc<dyn Agent>,
    ctx: Arc<RepositoryAnalysisContext>,
    path: PathBuf,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    fixes: Arc<FixApplier>,
    limits: RunLimits,
) -> AgentOutcome {
    let _permit = tokio::select! {
        biased;
        _ = token.cancelled() => return AgentOutcome::NotStarted,
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return AgentOutcome::NotStarted,
        },
    };

    debug!(execution_id = %ctx.execution_id, agent = agent.name(), "Agent started");
    let start = Instant::now();
    let agent_token = token.child_token();

    let mut result = tokio::select! {
        biased;
        _ = token.cancelled() => {
            return AgentOutcome::Interrupted {
                elapsed_ms: start.elapsed().as_millis() as u64,
            };
        }
        result = agent.execute(&path, &ctx, &agent_token) => result,
    };

    truncate_findings(&mut result, limits.max_findings);

    if !limits.include_auto_fix {
        result.fixes.clear();
    } else if !result.fixes.is_empty() {
        let applied = fixes.apply_all(&path, &mut result.fixes, limits.dry_run).await;
        debug!(
            execution_id = %ctx.execution_id,
            agent = agent.name(),
            "Applied {} of {} fixes",
            applied,
            result.fixes.len()
        );
    }

    info!(
        execution_id = %ctx.execution_id,
        agent = agent.name(),
        status = %result.status,
        findings = result.findings.len(),
        "Agent finished in {}ms",
        result.execution_time_ms
    );

    AgentOutcome::Finished(result)
}

/// Keep the first `max` findings and drop fixes for the removed ones.
fn truncate_findings(result: &mut AgentTaskResult, max: usize) {
    let original = result.findings.len();
    if original <= max {
        return;
    }

    result.findings.truncate(max);
    let kept: HashSet<Uuid> = result.findings.iter().map(|f| f.id).collect();
    result.fixes.retain(|fix| kept.contains(&fix.finding_id));
    result
        .additional_data
        .insert("findings_truncated".to_string(), Value::Bool(true));
    result
        .additional_data
        .insert("original_findings_count".to_string(), Value::from(original));
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{Behavior, ScriptedAgent};
    use crate::llm::testing::StubClient;
    use crate::models::{AgentFinding, AgentFix, AgentStatus, FixType, Severity};
    use std::fs;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn orchestrator(agents: Vec<ScriptedAgent>, concurrency: usize) -> AgentTaskOrchestrator {
        let mut registry = AgentRegistry::new();
        for agent in agents {
            registry.register(Arc::new(agent));
        }
        let settings = OrchestratorSettings {
            max_concurrent_agents: concurrency,
            ..OrchestratorSettings::default()
        };
        AgentTaskOrchestrator::new(registry, settings)
    }

    fn request() -> AgentTaskExecutionRequest {
        AgentTaskExecutionRequest::new("https://github.com/acme/widgets")
    }

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        dir
    }

    fn names(response: &AgentTaskExecutionResponse) -> Vec<&str> {
        response
            .agent_results
            .iter()
            .map(|r| r.agent_name.as_str())
            .collect()
    }

    #[test]
    fn test_available_agents_and_estimate() {
        let orch = orchestrator(
            vec![
                ScriptedAgent::new("B", 2),
                ScriptedAgent::new("A", 1),
                ScriptedAgent::new("C", 3).not_applicable(),
            ],
            2,
        );

        let agents = orch.available_agents();
        let listed: Vec<_> = agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(listed, vec!["A", "B", "C"]);

        let response = orch.available_agents_response();
        assert_eq!(response.total_agents, 3);
        assert_eq!(response.estimated_total_time_seconds, 180);

        assert_eq!(orch.estimate_total_execution_time(&[]), Duration::from_secs(180));
        assert_eq!(
            orch.estimate_total_execution_time(&["A".to_string(), "nope".to_string()]),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_selection_honours_lists_and_applicability() {
        let dir = repo();
        let orch = orchestrator(
            vec![
                ScriptedAgent::new("A", 1),
                ScriptedAgent::new("B", 2),
                ScriptedAgent::new("C", 3).not_applicable(),
                ScriptedAgent::new("D", 4),
            ],
            4,
        );

        let mut req = request();
        req.excluded_agents = vec!["D".to_string()];
        let response = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&response), vec!["A", "B"]);
        assert_eq!(response.status, ExecutionStatus::Completed);

        req.included_agents = vec!["B".to_string(), "D".to_string()];
        let response = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&response), vec!["B"]);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_running() {
        let dir = repo();
        let agent = ScriptedAgent::new("A", 1);
        let started = agent.started.clone();
        let orch = orchestrator(vec![agent], 1);

        let mut req = request();
        req.repository_url = String::new();
        let err = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_budget_is_rejected() {
        let dir = repo();
        let agent = ScriptedAgent::new("A", 1);
        let started = agent.started.clone();
        let orch = orchestrator(vec![agent], 1);

        let mut req = request();
        req.max_execution_time_minutes = u64::MAX;
        let err = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidRequest(crate::error::RequestError::BudgetTooLarge(_))
        ));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let dir = repo();
        let orch = orchestrator(
            vec![
                ScriptedAgent::new("Ok1", 1),
                ScriptedAgent::new("Broken", 2).behaving(Behavior::Fail),
                ScriptedAgent::new("Crashing", 3).behaving(Behavior::Panic),
                ScriptedAgent::new("Ok2", 4).with_findings(2),
            ],
            2,
        );

        let response = orch
            .execute(&request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, ExecutionStatus::Completed);

        let statuses: Vec<_> = response.agent_results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                AgentStatus::Success,
                AgentStatus::Failed,
                AgentStatus::Failed,
                AgentStatus::Success
            ]
        );
        assert!(response.agent_results[2]
            .error_message
            .as_deref()
            .unwrap()
            .contains("agent panicked: scripted panic"));
        for result in &response.agent_results {
            assert_eq!(result.execution_id, response.execution_id);
        }

        let report = response.consolidated_report.unwrap();
        assert_eq!(report.successful_agents, 2);
        assert_eq!(report.failed_agents, 2);
        assert_eq!(report.total_findings, 3);
        assert_eq!(
            report.total_findings,
            response
                .agent_results
                .iter()
                .map(|r| r.findings.len())
                .sum::<usize>()
        );
    }

    #[tokio::test]
    async fn test_results_ordered_by_priority_not_completion() {
        let dir = repo();
        let orch = orchestrator(
            vec![
                ScriptedAgent::new("Slow", 1).with_delay(Duration::from_millis(150)),
                ScriptedAgent::new("Fast", 2),
                ScriptedAgent::new("AlsoFirst", 1),
            ],
            3,
        );

        let response = orch
            .execute(&request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&response), vec!["Slow", "AlsoFirst", "Fast"]);
    }

    #[tokio::test]
    async fn test_truncation_keeps_first_findings() {
        let dir = repo();
        let orch = orchestrator(vec![ScriptedAgent::new("Chatty", 1).with_findings(8)], 1);

        let mut req = request();
        req.max_findings_per_agent = 3;
        let response = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        let result = &response.agent_results[0];
        let titles: Vec<_> = result.findings.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, vec!["finding 0", "finding 1", "finding 2"]);
        assert_eq!(result.additional_data["findings_truncated"], true);
        assert_eq!(result.additional_data["original_findings_count"], 8);
    }

    #[test]
    fn test_truncation_drops_orphaned_fixes() {
        let mut result = AgentTaskResult::success(Uuid::nil(), "A", 1);
        let findings: Vec<_> = (0..3)
            .map(|i| AgentFinding::new("T", Severity::Low, format!("{}", i), ""))
            .collect();
        result.fixes = findings
            .iter()
            .map(|f| AgentFix::for_finding(f, FixType::CodeFix, "a", "", "", ""))
            .collect();
        result.findings = findings;

        truncate_findings(&mut result, 1);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.fixes.len(), 1);
        assert_eq!(result.fixes[0].finding_id, result.findings[0].id);

        let mut small = AgentTaskResult::success(Uuid::nil(), "B", 1);
        truncate_findings(&mut small, 1);
        assert!(!small.additional_data.contains_key("findings_truncated"));
    }

    #[tokio::test]
    async fn test_budget_skips_waiting_and_fails_running_agents() {
        let dir = repo();
        let orch = orchestrator(
            vec![
                ScriptedAgent::new("Quick", 1),
                ScriptedAgent::new("Stuck", 2).behaving(Behavior::Hang),
                ScriptedAgent::new("Waiting", 3),
            ],
            1,
        );

        let response = orch
            .run(
                &request(),
                dir.path(),
                &CancellationToken::new(),
                Duration::from_millis(200),
            )
            .await;

        assert_eq!(response.status, ExecutionStatus::TimedOut);
        let statuses: Vec<_> = response.agent_results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![AgentStatus::Success, AgentStatus::Failed, AgentStatus::Skipped]
        );
        assert!(response.agent_results[1]
            .error_message
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert!(response.agent_results[1].findings.is_empty());
        assert!(response.agent_results[2]
            .summary
            .contains("execution time budget exhausted"));

        let report = response.consolidated_report.unwrap();
        assert_eq!(report.total_agents_executed, 3);
        assert_eq!(report.skipped_agents, 1);
    }

    #[tokio::test]
    async fn test_caller_cancellation_before_start() {
        let dir = repo();
        let agent = ScriptedAgent::new("A", 1);
        let started = agent.started.clone();
        let orch = orchestrator(vec![agent, ScriptedAgent::new("B", 2)], 2);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let response = orch.execute(&request(), dir.path(), &cancel).await.unwrap();

        assert_eq!(response.status, ExecutionStatus::Cancelled);
        assert!(response
            .agent_results
            .iter()
            .all(|r| r.status == AgentStatus::Skipped));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_caller_cancellation_while_running() {
        let dir = repo();
        let orch = orchestrator(vec![ScriptedAgent::new("Stuck", 1).behaving(Behavior::Hang)], 1);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let response = orch.execute(&request(), dir.path(), &cancel).await.unwrap();
        assert_eq!(response.status, ExecutionStatus::Cancelled);
        assert_eq!(response.agent_results[0].status, AgentStatus::Failed);
        assert_eq!(
            response.agent_results[0].error_message.as_deref(),
            Some("cancelled")
        );
    }

    #[tokio::test]
    async fn test_cancellation_after_agents_finish_keeps_completed() {
        let dir = repo();
        let cancel = CancellationToken::new();
        let orch = orchestrator(
            vec![ScriptedAgent::new("Done", 1).cancelling_on_finish(cancel.clone())],
            1,
        );

        let response = orch.execute(&request(), dir.path(), &cancel).await.unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(response.status, ExecutionStatus::Completed);
        assert_eq!(response.agent_results[0].status, AgentStatus::Success);
    }

    #[tokio::test]
    async fn test_execute_specific_rejects_unknown_names() {
        let dir = repo();
        let orch = orchestrator(vec![ScriptedAgent::new("A", 1)], 1);

        let request = SpecificAgentAnalysisRequest {
            repository_url: "https://github.com/acme/widgets".to_string(),
            branch: "main".to_string(),
            agent_names: vec!["A".to_string(), "Ghost".to_string()],
            include_auto_fix: false,
            dry_run: false,
            agent_specific_options: Default::default(),
        };
        let err = orch
            .execute_specific(request.clone(), dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownAgents(ref n) if n == &["Ghost"]));

        let request = SpecificAgentAnalysisRequest {
            agent_names: vec!["A".to_string()],
            ..request
        };
        let response = orch
            .execute_specific(request, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(names(&response), vec!["A"]);
    }

    fn default_orchestrator() -> AgentTaskOrchestrator {
        let registry = AgentRegistry::with_default_agents(None, ScanConfig::default());
        AgentTaskOrchestrator::new(registry, OrchestratorSettings::default())
    }

    #[tokio::test]
    async fn test_default_agents_dry_run_without_documentation() {
        let dir = repo();
        let orch = default_orchestrator();

        let mut req = request();
        req.excluded_agents = vec!["Documentation Agent".to_string()];
        req.dry_run = true;
        let response = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            names(&response),
            vec!["Code Review Agent", "Security Analysis Agent"]
        );
        assert!(response
            .agent_results
            .iter()
            .all(|r| r.status == AgentStatus::Success));
        assert_eq!(response.repository_name, "widgets");
        assert_eq!(response.consolidated_report.unwrap().total_agents_executed, 2);
    }

    #[tokio::test]
    async fn test_auto_fix_writes_unless_dry_run() {
        let source = "fn main() {}   \n";
        let orch = default_orchestrator();
        let mut req = request();
        req.included_agents = vec!["Code Review Agent".to_string()];
        req.include_auto_fix = true;

        // Dry run: fix proposed, file untouched.
        let dir = repo();
        fs::write(dir.path().join("src/main.rs"), source).unwrap();
        req.dry_run = true;
        let response = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        let fixes = &response.agent_results[0].fixes;
        assert_eq!(fixes.len(), 1);
        assert!(!fixes[0].applied);
        assert_eq!(fs::read_to_string(dir.path().join("src/main.rs")).unwrap(), source);

        // Real run: the file is rewritten.
        req.dry_run = false;
        let response = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.agent_results[0].fixes[0].applied);
        assert_eq!(
            fs::read_to_string(dir.path().join("src/main.rs")).unwrap(),
            "fn main() {}\n"
        );
        assert_eq!(response.consolidated_report.unwrap().applied_fixes, 1);
    }

    #[tokio::test]
    async fn test_fixes_dropped_without_auto_fix() {
        let dir = repo();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}   \n").unwrap();
        let orch = default_orchestrator();
        let mut req = request();
        req.included_agents = vec!["Code Review Agent".to_string()];

        let response = orch
            .execute(&req, dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.agent_results[0].fixes.is_empty());
        assert!(response.agent_results[0]
            .findings
            .iter()
            .any(|f| f.can_auto_fix));
    }

    #[tokio::test]
    async fn test_ai_summary_is_used_when_enabled() {
        let dir = repo();
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(ScriptedAgent::new("A", 1)));
        let settings = OrchestratorSettings {
            ai_summary: true,
            ..OrchestratorSettings::default()
        };
        let orch = AgentTaskOrchestrator::new(registry, settings)
            .with_ai(Some(StubClient::replying("All good.").gateway()));

        let response = orch
            .execute(&request(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            response.consolidated_report.unwrap().executive_summary,
            "All good."
        );
    }
}

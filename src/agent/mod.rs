//! Analysis agents.
//!
//! Every agent implements [`Agent`]. Implementors provide
//! [`Agent::is_applicable`] and [`Agent::analyze`]; the provided
//! [`Agent::can_execute`] and [`Agent::execute`] wrap them so that an
//! agent never lets an error escape: a broken precondition check means
//! "do not run", and a failed analysis becomes a `Failed` result.

mod code_review;
mod documentation;
mod registry;
mod security;

pub use code_review::CodeReviewAgent;
pub use documentation::DocumentationAgent;
pub use registry::AgentRegistry;
pub use security::SecurityAnalysisAgent;

use crate::error::AgentError;
use crate::models::{
    AgentFinding, AgentFix, AgentRecommendation, AgentTaskResult, RepositoryAnalysisContext,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Raw output of a successful analysis.
#[derive(Debug, Default)]
pub struct AgentOutput {
    pub summary: String,
    pub findings: Vec<AgentFinding>,
    pub fixes: Vec<AgentFix>,
    pub recommendations: Vec<AgentRecommendation>,
    pub additional_data: BTreeMap<String, Value>,
}

impl AgentOutput {
    pub fn record(&mut self, key: &str, value: impl Into<Value>) {
        self.additional_data.insert(key.to_string(), value.into());
    }
}

/// A self-contained repository analyzer.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique, human-readable name.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> u32 {
        10
    }

    fn estimate_execution_time(&self) -> Duration {
        Duration::from_secs(5 * 60)
    }

    /// Agent-specific applicability check.
    async fn is_applicable(
        &self,
        repo_path: &Path,
        ctx: &RepositoryAnalysisContext,
    ) -> Result<bool, AgentError>;

    /// Perform the analysis.
    async fn analyze(
        &self,
        repo_path: &Path,
        ctx: &RepositoryAnalysisContext,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError>;

    /// Whether this agent should run against `repo_path`.
    ///
    /// Fails closed: an empty or missing path, or any error while
    /// checking, yields `false`.
    async fn can_execute(&self, repo_path: &Path, ctx: &RepositoryAnalysisContext) -> bool {
        if repo_path.as_os_str().is_empty() || !repo_path.is_dir() {
            debug!("{}: repository path {:?} is not usable", self.name(), repo_path);
            return false;
        }

        match self.is_applicable(repo_path, ctx).await {
            Ok(applicable) => applicable,
            Err(e) => {
                warn!("{}: applicability check failed: {}", self.name(), e);
                false
            }
        }
    }

    /// Run the analysis and package the outcome as a result.
    async fn execute(
        &self,
        repo_path: &Path,
        ctx: &RepositoryAnalysisContext,
        cancel: &CancellationToken,
    ) -> AgentTaskResult {
        let start = Instant::now();
        let outcome = self.analyze(repo_path, ctx, cancel).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let mut result =
                    AgentTaskResult::success(ctx.execution_id, self.name(), self.priority());
                result.summary = output.summary;
                result.findings = output.findings;
                result.fixes = output.fixes;
                result.recommendations = output.recommendations;
                result.additional_data = output.additional_data;
                result.execution_time_ms = elapsed_ms;
                result
            }
            Err(e) => {
                warn!("{} failed: {}", self.name(), e);
                AgentTaskResult::failed(
                    ctx.execution_id,
                    self.name(),
                    self.priority(),
                    &e.to_string(),
                    elapsed_ms,
                )
            }
        }
    }
}

/// Shorten a source line for inclusion in a finding.
pub(crate) fn excerpt(line: &str) -> String {
    const MAX: usize = 160;
    let line = line.trim();
    if line.chars().count() <= MAX {
        line.to_string()
    } else {
        let cut: String = line.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), AgentError> {
    if cancel.is_cancelled() {
        Err(AgentError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Configurable agents for orchestrator tests.

    use super::*;
    use crate::models::Severity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    pub struct ScriptedAgent {
        pub name: String,
        pub priority: u32,
        pub findings: usize,
        pub delay: Duration,
        pub behavior: Behavior,
        pub applicable: bool,
        pub started: Arc<AtomicUsize>,
        pub cancel_on_finish: Option<CancellationToken>,
    }

    impl ScriptedAgent {
        pub fn new(name: &str, priority: u32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                findings: 1,
                delay: Duration::ZERO,
                behavior: Behavior::Succeed,
                applicable: true,
                started: Arc::new(AtomicUsize::new(0)),
                cancel_on_finish: None,
            }
        }

        pub fn with_findings(mut self, n: usize) -> Self {
            self.findings = n;
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn behaving(mut self, behavior: Behavior) -> Self {
            self.behavior = behavior;
            self
        }

        pub fn not_applicable(mut self) -> Self {
            self.applicable = false;
            self
        }

        /// Cancel `token` just before returning a successful result.
        pub fn cancelling_on_finish(mut self, token: CancellationToken) -> Self {
            self.cancel_on_finish = Some(token);
            self
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "scripted test agent"
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn estimate_execution_time(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn is_applicable(
            &self,
            _repo_path: &Path,
            _ctx: &RepositoryAnalysisContext,
        ) -> Result<bool, AgentError> {
            Ok(self.applicable)
        }

        async fn analyze(
            &self,
            _repo_path: &Path,
            _ctx: &RepositoryAnalysisContext,
            _cancel: &CancellationToken,
        ) -> Result<AgentOutput, AgentError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.behavior {
                Behavior::Succeed => {}
                Behavior::Fail => return Err(AgentError::Analysis("scripted failure".into())),
                Behavior::Panic => panic!("scripted panic"),
                Behavior::Hang => std::future::pending::<()>().await,
            }

            let findings = (0..self.findings)
                .map(|i| {
                    AgentFinding::new("Test", Severity::Medium, format!("finding {}", i), "")
                        .in_file("src/lib.rs")
                        .at_line(i + 1)
                })
                .collect();

            if let Some(token) = &self.cancel_on_finish {
                token.cancel();
            }

            Ok(AgentOutput {
                summary: format!("{} done", self.name),
                findings,
                ..AgentOutput::default()
            })
        }
    }
}

//! Data models for the agent task orchestrator.
//!
//! This module contains the core data structures shared by agents, the
//! orchestrator, the consolidated report and the HTTP layer. Everything
//! that crosses the wire is serialized with camelCase field names.

use crate::error::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Longest accepted repository URL.
pub const MAX_REPOSITORY_URL_LEN: usize = 500;

/// Longest accepted branch name.
pub const MAX_BRANCH_LEN: usize = 100;

/// Upper bound on a single execution's time budget (one day).
pub const MAX_EXECUTION_TIME_MINUTES: u64 = 24 * 60;

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity - style issues, minor suggestions
    Low,
    /// Medium severity - code quality issues, potential bugs
    Medium,
    /// High severity - bugs, security concerns
    High,
    /// Critical severity - exposed secrets, exploitable vulnerabilities
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }

    /// Parse a loosely formatted severity, defaulting to medium.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "low" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

/// Priority of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

impl fmt::Display for RecommendationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationPriority::Low => write!(f, "Low"),
            RecommendationPriority::Medium => write!(f, "Medium"),
            RecommendationPriority::High => write!(f, "High"),
        }
    }
}

/// Terminal status of a single agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Success => write!(f, "Success"),
            AgentStatus::Failed => write!(f, "Failed"),
            AgentStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// Overall status of an orchestrated execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    /// Every selected agent reached a terminal status within the budget.
    Completed,
    /// The time budget ran out; late agents were skipped or cancelled.
    TimedOut,
    /// The caller cancelled the run.
    Cancelled,
    /// The run could not be carried out at all.
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "Completed"),
            ExecutionStatus::TimedOut => write!(f, "Timed out"),
            ExecutionStatus::Cancelled => write!(f, "Cancelled"),
            ExecutionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Kind of change a fix makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixType {
    CodeFix,
    ConfigurationFix,
    DocumentationFix,
}

/// Immutable input shared by every agent of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryAnalysisContext {
    /// Identifier of the execution this context belongs to.
    pub execution_id: Uuid,
    pub repository_url: String,
    pub branch: String,
    pub repository_name: String,
    pub owner: String,
    /// Languages detected in the prepared repository.
    pub programming_languages: Vec<String>,
    pub include_auto_fix: bool,
    pub dry_run: bool,
    pub max_findings_per_agent: usize,
    /// Per-agent option bags keyed by agent name.
    pub agent_options: BTreeMap<String, Value>,
    pub metadata: BTreeMap<String, Value>,
}

impl Default for RepositoryAnalysisContext {
    fn default() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            repository_url: String::new(),
            branch: default_branch(),
            repository_name: String::new(),
            owner: String::new(),
            programming_languages: Vec::new(),
            include_auto_fix: false,
            dry_run: false,
            max_findings_per_agent: default_max_findings(),
            agent_options: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl RepositoryAnalysisContext {
    /// Look up an option from the named agent's option bag.
    pub fn agent_option(&self, agent: &str, key: &str) -> Option<&Value> {
        self.agent_options.get(agent).and_then(|opts| opts.get(key))
    }

    /// Numeric agent option, ignoring values of the wrong type.
    pub fn agent_option_usize(&self, agent: &str, key: &str) -> Option<usize> {
        self.agent_option(agent, key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
    }

    /// Boolean agent option, ignoring values of the wrong type.
    pub fn agent_option_bool(&self, agent: &str, key: &str) -> Option<bool> {
        self.agent_option(agent, key).and_then(Value::as_bool)
    }
}

/// A single problem an agent detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFinding {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub finding_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub can_auto_fix: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl AgentFinding {
    /// Create a finding with a fresh id.
    pub fn new(
        finding_type: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            finding_type: finding_type.into(),
            severity,
            title: title.into(),
            description: description.into(),
            file_path: None,
            line_number: None,
            column_number: None,
            code: None,
            rule: None,
            can_auto_fix: false,
            suggested_fix: None,
        }
    }

    pub fn in_file(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line_number = Some(line);
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn auto_fixable(mut self) -> Self {
        self.can_auto_fix = true;
        self
    }

    /// Formatted `path:line` location, if any.
    pub fn location(&self) -> Option<String> {
        match (&self.file_path, self.line_number) {
            (Some(path), Some(line)) => Some(format!("{}:{}", path, line)),
            (Some(path), None) => Some(path.clone()),
            _ => None,
        }
    }
}

/// A concrete change that resolves a finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFix {
    pub id: Uuid,
    pub finding_id: Uuid,
    #[serde(rename = "type")]
    pub fix_type: FixType,
    pub description: String,
    /// Path relative to the repository root.
    pub file_path: String,
    /// Content the file is expected to hold before the fix. Empty for new files.
    pub original_content: String,
    pub fixed_content: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentFix {
    /// Propose a fix for `finding`. Nothing is written until the fix is applied.
    pub fn for_finding(
        finding: &AgentFinding,
        fix_type: FixType,
        file_path: impl Into<String>,
        original_content: impl Into<String>,
        fixed_content: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            finding_id: finding.id,
            fix_type,
            description: description.into(),
            file_path: file_path.into(),
            original_content: original_content.into(),
            fixed_content: fixed_content.into(),
            applied: false,
            applied_at: None,
            error: None,
        }
    }
}

/// A higher-level improvement suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecommendation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub recommendation_type: String,
    pub priority: RecommendationPriority,
    pub title: String,
    pub description: String,
    pub action_items: Vec<String>,
    pub resources: Vec<String>,
    pub estimated_effort: String,
}

impl AgentRecommendation {
    pub fn new(
        recommendation_type: impl Into<String>,
        priority: RecommendationPriority,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recommendation_type: recommendation_type.into(),
            priority,
            title: title.into(),
            description: description.into(),
            action_items: Vec::new(),
            resources: Vec::new(),
            estimated_effort: "Medium".to_string(),
        }
    }

    pub fn with_action_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action_items = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_effort(mut self, effort: impl Into<String>) -> Self {
        self.estimated_effort = effort.into();
        self
    }
}

/// The outcome of one agent within one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskResult {
    pub execution_id: Uuid,
    pub agent_name: String,
    pub priority: u32,
    pub status: AgentStatus,
    pub summary: String,
    pub execution_time_ms: u64,
    pub executed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub findings: Vec<AgentFinding>,
    pub fixes: Vec<AgentFix>,
    pub recommendations: Vec<AgentRecommendation>,
    pub additional_data: BTreeMap<String, Value>,
}

impl AgentTaskResult {
    fn empty(execution_id: Uuid, agent_name: &str, priority: u32, status: AgentStatus) -> Self {
        Self {
            execution_id,
            agent_name: agent_name.to_string(),
            priority,
            status,
            summary: String::new(),
            execution_time_ms: 0,
            executed_at: Utc::now(),
            error_message: None,
            findings: Vec::new(),
            fixes: Vec::new(),
            recommendations: Vec::new(),
            additional_data: BTreeMap::new(),
        }
    }

    /// Result for an agent that never started.
    pub fn skipped(execution_id: Uuid, agent_name: &str, priority: u32, reason: &str) -> Self {
        let mut result = Self::empty(execution_id, agent_name, priority, AgentStatus::Skipped);
        result.summary = format!("Skipped: {}", reason);
        result
    }

    /// Result for an agent that started but did not finish cleanly.
    pub fn failed(
        execution_id: Uuid,
        agent_name: &str,
        priority: u32,
        error: &str,
        execution_time_ms: u64,
    ) -> Self {
        let error = if error.trim().is_empty() {
            "unknown error"
        } else {
            error
        };
        let mut result = Self::empty(execution_id, agent_name, priority, AgentStatus::Failed);
        result.summary = format!("Execution failed: {}", error);
        result.error_message = Some(error.to_string());
        result.execution_time_ms = execution_time_ms;
        result
    }

    /// Result for an agent that finished.
    pub fn success(execution_id: Uuid, agent_name: &str, priority: u32) -> Self {
        Self::empty(execution_id, agent_name, priority, AgentStatus::Success)
    }
}

/// Aggregate statistics over every result of an execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedReport {
    pub total_agents_executed: usize,
    pub successful_agents: usize,
    pub failed_agents: usize,
    pub skipped_agents: usize,
    pub total_findings: usize,
    pub critical_findings: usize,
    pub high_findings: usize,
    pub medium_findings: usize,
    pub low_findings: usize,
    pub total_recommendations: usize,
    pub high_priority_recommendations: usize,
    pub total_fixes: usize,
    pub applied_fixes: usize,
    pub total_execution_time_ms: u64,
    pub average_execution_time_per_agent_ms: u64,
    pub findings_by_severity: BTreeMap<Severity, usize>,
    pub findings_by_type: BTreeMap<String, usize>,
    pub findings_by_agent: BTreeMap<String, usize>,
    pub recommendations_by_type: BTreeMap<String, usize>,
    pub executive_summary: String,
}

/// Static description of a registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub priority: u32,
    pub estimated_execution_time_seconds: u64,
}

/// Response of the agent discovery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableAgentsResponse {
    pub agents: Vec<AgentInfo>,
    pub estimated_total_time_seconds: u64,
    pub total_agents: usize,
}

/// Response of the execution time estimate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTimeEstimate {
    pub estimated_execution_time_seconds: u64,
    /// Registered agents covered by the estimate.
    pub agents_count: usize,
    pub specified_agents: Vec<String>,
}

/// Request to run a full analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskExecutionRequest {
    pub repository_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub included_agents: Vec<String>,
    #[serde(default)]
    pub excluded_agents: Vec<String>,
    #[serde(default)]
    pub include_auto_fix: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_max_findings")]
    pub max_findings_per_agent: usize,
    #[serde(default = "default_max_minutes")]
    pub max_execution_time_minutes: u64,
    #[serde(default)]
    pub agent_specific_options: BTreeMap<String, Value>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_max_findings() -> usize {
    100
}

fn default_max_minutes() -> u64 {
    30
}

impl AgentTaskExecutionRequest {
    /// Request with default options for the given repository.
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: default_branch(),
            included_agents: Vec::new(),
            excluded_agents: Vec::new(),
            include_auto_fix: false,
            dry_run: false,
            max_findings_per_agent: default_max_findings(),
            max_execution_time_minutes: default_max_minutes(),
            agent_specific_options: BTreeMap::new(),
        }
    }

    /// Reject malformed requests before any agent runs.
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_repository_url(&self.repository_url)?;
        validate_branch(&self.branch)?;

        if self.max_findings_per_agent == 0 {
            return Err(RequestError::ZeroLimit("maxFindingsPerAgent"));
        }
        if self.max_execution_time_minutes == 0 {
            return Err(RequestError::ZeroLimit("maxExecutionTimeMinutes"));
        }
        if self.max_execution_time_minutes > MAX_EXECUTION_TIME_MINUTES {
            return Err(RequestError::BudgetTooLarge(MAX_EXECUTION_TIME_MINUTES));
        }

        Ok(())
    }

    /// Whether the include/exclude lists admit the named agent.
    pub fn admits(&self, agent_name: &str) -> bool {
        let included = self.included_agents.is_empty()
            || self.included_agents.iter().any(|n| n == agent_name);
        let excluded = self.excluded_agents.iter().any(|n| n == agent_name);
        included && !excluded
    }
}

/// Request to run a named subset of agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificAgentAnalysisRequest {
    pub repository_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub agent_names: Vec<String>,
    #[serde(default)]
    pub include_auto_fix: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub agent_specific_options: BTreeMap<String, Value>,
}

impl SpecificAgentAnalysisRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        validate_repository_url(&self.repository_url)?;
        validate_branch(&self.branch)?;
        if self.agent_names.iter().all(|n| n.trim().is_empty()) {
            return Err(RequestError::NoAgentsSpecified);
        }
        Ok(())
    }

    /// Expand into a full request that includes only the named agents.
    pub fn into_execution_request(self) -> AgentTaskExecutionRequest {
        AgentTaskExecutionRequest {
            repository_url: self.repository_url,
            branch: self.branch,
            included_agents: self.agent_names,
            excluded_agents: Vec::new(),
            include_auto_fix: self.include_auto_fix,
            dry_run: self.dry_run,
            max_findings_per_agent: default_max_findings(),
            max_execution_time_minutes: default_max_minutes(),
            agent_specific_options: self.agent_specific_options,
        }
    }
}

fn validate_repository_url(url: &str) -> Result<(), RequestError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RequestError::MissingRepositoryUrl);
    }
    if url.len() > MAX_REPOSITORY_URL_LEN {
        return Err(RequestError::RepositoryUrlTooLong(MAX_REPOSITORY_URL_LEN));
    }
    let supported = ["https://", "http://", "git@", "file://"];
    if !supported.iter().any(|prefix| url.starts_with(prefix)) {
        return Err(RequestError::InvalidRepositoryUrl(url.to_string()));
    }
    Ok(())
}

fn validate_branch(branch: &str) -> Result<(), RequestError> {
    if branch.len() > MAX_BRANCH_LEN {
        return Err(RequestError::BranchTooLong(MAX_BRANCH_LEN));
    }
    Ok(())
}

/// Full response of an orchestrated execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskExecutionResponse {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub repository_url: String,
    pub repository_name: String,
    pub agent_results: Vec<AgentTaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidated_report: Option<ConsolidatedReport>,
}

impl AgentTaskExecutionResponse {
    /// Highest finding severity across all agents.
    pub fn max_severity(&self) -> Option<Severity> {
        self.agent_results
            .iter()
            .flat_map(|r| r.findings.iter().map(|f| f.severity))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_emoji() {
        assert_eq!(Severity::Critical.emoji(), "🔴");
        assert_eq!(Severity::High.emoji(), "🟠");
        assert_eq!(Severity::Medium.emoji(), "🟡");
        assert_eq!(Severity::Low.emoji(), "🟢");
    }

    #[test]
    fn test_severity_from_label() {
        assert_eq!(Severity::from_label("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::from_label(" high "), Severity::High);
        assert_eq!(Severity::from_label("low"), Severity::Low);
        assert_eq!(Severity::from_label("whatever"), Severity::Medium);
    }

    #[test]
    fn test_context_defaults() {
        let ctx = RepositoryAnalysisContext::default();
        assert_eq!(ctx.branch, "main");
        assert!(!ctx.include_auto_fix);
        assert!(!ctx.dry_run);
        assert_eq!(ctx.max_findings_per_agent, 100);
        assert!(ctx.agent_options.is_empty());
    }

    #[test]
    fn test_agent_option_lookup() {
        let mut ctx = RepositoryAnalysisContext::default();
        ctx.agent_options.insert(
            "Code Review Agent".to_string(),
            serde_json::json!({"max_files": 3, "ai": false}),
        );

        assert_eq!(ctx.agent_option_usize("Code Review Agent", "max_files"), Some(3));
        assert_eq!(ctx.agent_option_bool("Code Review Agent", "ai"), Some(false));
        assert_eq!(ctx.agent_option_usize("Code Review Agent", "ai"), None);
        assert!(ctx.agent_option("Documentation Agent", "max_files").is_none());
    }

    #[test]
    fn test_finding_ids_are_unique() {
        let a = AgentFinding::new("Security", Severity::High, "A", "");
        let b = AgentFinding::new("Security", Severity::High, "A", "");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_finding_location() {
        let finding = AgentFinding::new("Style", Severity::Low, "t", "d")
            .in_file("src/lib.rs")
            .at_line(12);
        assert_eq!(finding.location().as_deref(), Some("src/lib.rs:12"));

        let bare = AgentFinding::new("Style", Severity::Low, "t", "d");
        assert!(bare.location().is_none());
    }

    #[test]
    fn test_finding_serializes_type_field() {
        let finding = AgentFinding::new("Security", Severity::Critical, "Key", "Exposed")
            .with_rule("SEC_001")
            .auto_fixable();
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "Security");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["canAutoFix"], true);
        assert!(json.get("filePath").is_none());
    }

    #[test]
    fn test_fix_references_finding() {
        let finding = AgentFinding::new("Code Style", Severity::Low, "ws", "");
        let fix = AgentFix::for_finding(&finding, FixType::CodeFix, "a.rs", "x ", "x", "trim");
        assert_eq!(fix.finding_id, finding.id);
        assert!(!fix.applied);
        assert!(fix.applied_at.is_none());
    }

    #[test]
    fn test_recommendation_default_effort() {
        let rec = AgentRecommendation::new("Security", RecommendationPriority::High, "t", "d");
        assert_eq!(rec.estimated_effort, "Medium");
        assert!(rec.action_items.is_empty());
    }

    #[test]
    fn test_failed_result_always_has_error() {
        let result = AgentTaskResult::failed(Uuid::new_v4(), "A", 1, "", 5);
        assert_eq!(result.status, AgentStatus::Failed);
        assert_eq!(result.error_message.as_deref(), Some("unknown error"));
        assert!(result.summary.starts_with("Execution failed"));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: AgentTaskExecutionRequest =
            serde_json::from_str(r#"{"repositoryUrl": "https://github.com/acme/widgets"}"#)
                .unwrap();
        assert_eq!(request.branch, "main");
        assert_eq!(request.max_findings_per_agent, 100);
        assert_eq!(request.max_execution_time_minutes, 30);
        assert!(!request.include_auto_fix);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let mut request = AgentTaskExecutionRequest::new("");
        assert!(matches!(
            request.validate(),
            Err(RequestError::MissingRepositoryUrl)
        ));

        request.repository_url = format!("https://github.com/{}", "a".repeat(600));
        assert!(matches!(
            request.validate(),
            Err(RequestError::RepositoryUrlTooLong(_))
        ));

        request.repository_url = "ftp://example.com/repo".to_string();
        assert!(request.validate().is_err());

        request.repository_url = "https://github.com/acme/widgets".to_string();
        request.branch = "b".repeat(101);
        assert!(matches!(request.validate(), Err(RequestError::BranchTooLong(_))));

        request.branch = "main".to_string();
        request.max_findings_per_agent = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_execution_budget_bounds() {
        let mut request = AgentTaskExecutionRequest::new("https://github.com/acme/widgets");

        request.max_execution_time_minutes = MAX_EXECUTION_TIME_MINUTES;
        assert!(request.validate().is_ok());

        request.max_execution_time_minutes = MAX_EXECUTION_TIME_MINUTES + 1;
        assert!(matches!(
            request.validate(),
            Err(RequestError::BudgetTooLarge(MAX_EXECUTION_TIME_MINUTES))
        ));

        request.max_execution_time_minutes = u64::MAX;
        assert!(matches!(
            request.validate(),
            Err(RequestError::BudgetTooLarge(_))
        ));
    }

    #[test]
    fn test_exclusion_wins_over_inclusion() {
        let mut request = AgentTaskExecutionRequest::new("https://github.com/acme/widgets");
        assert!(request.admits("Anything"));

        request.included_agents = vec!["Security Analysis Agent".to_string()];
        assert!(request.admits("Security Analysis Agent"));
        assert!(!request.admits("Code Review Agent"));

        request.excluded_agents = vec!["Security Analysis Agent".to_string()];
        assert!(!request.admits("Security Analysis Agent"));
    }

    #[test]
    fn test_specific_request_requires_agents() {
        let request = SpecificAgentAnalysisRequest {
            repository_url: "https://github.com/acme/widgets".to_string(),
            branch: "main".to_string(),
            agent_names: vec![],
            include_auto_fix: false,
            dry_run: true,
            agent_specific_options: BTreeMap::new(),
        };
        assert!(matches!(
            request.validate(),
            Err(RequestError::NoAgentsSpecified)
        ));

        let request = SpecificAgentAnalysisRequest {
            agent_names: vec!["Documentation Agent".to_string()],
            ..request
        };
        assert!(request.validate().is_ok());
        let full = request.into_execution_request();
        assert_eq!(full.included_agents, vec!["Documentation Agent"]);
        assert!(full.dry_run);
    }
}

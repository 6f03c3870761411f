//! Consolidation of per-agent results.
//!
//! This module folds the results of one execution into a
//! [`ConsolidatedReport`] and renders the executive summary. Everything
//! here is pure except [`polish_summary`], which optionally asks the
//! completion service to reword the summary.

use crate::llm::AiGateway;
use crate::models::{
    AgentStatus, AgentTaskResult, ConsolidatedReport, RecommendationPriority, Severity,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Aggregate all results of an execution.
///
/// `total_time` is the wall-clock time of the whole execution; the
/// per-agent average is computed over every result, skipped ones
/// included.
pub fn consolidate(results: &[AgentTaskResult], total_time: Duration) -> ConsolidatedReport {
    let mut report = ConsolidatedReport {
        total_agents_executed: results.len(),
        total_execution_time_ms: total_time.as_millis() as u64,
        ..ConsolidatedReport::default()
    };

    let mut agent_time_ms = 0u64;
    for result in results {
        match result.status {
            AgentStatus::Success => report.successful_agents += 1,
            AgentStatus::Failed => report.failed_agents += 1,
            AgentStatus::Skipped => report.skipped_agents += 1,
        }
        agent_time_ms += result.execution_time_ms;

        for finding in &result.findings {
            match finding.severity {
                Severity::Critical => report.critical_findings += 1,
                Severity::High => report.high_findings += 1,
                Severity::Medium => report.medium_findings += 1,
                Severity::Low => report.low_findings += 1,
            }
            *report.findings_by_severity.entry(finding.severity).or_insert(0) += 1;
            *report
                .findings_by_type
                .entry(finding.finding_type.clone())
                .or_insert(0) += 1;
        }
        report.total_findings += result.findings.len();
        report
            .findings_by_agent
            .insert(result.agent_name.clone(), result.findings.len());

        for rec in &result.recommendations {
            if rec.priority == RecommendationPriority::High {
                report.high_priority_recommendations += 1;
            }
            *report
                .recommendations_by_type
                .entry(rec.recommendation_type.clone())
                .or_insert(0) += 1;
        }
        report.total_recommendations += result.recommendations.len();

        report.total_fixes += result.fixes.len();
        report.applied_fixes += result.fixes.iter().filter(|f| f.applied).count();
    }

    if !results.is_empty() {
        report.average_execution_time_per_agent_ms = agent_time_ms / results.len() as u64;
    }

    report.executive_summary = executive_summary(&report);
    report
}

/// Templated, deterministic executive summary.
pub fn executive_summary(report: &ConsolidatedReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Analysis executed by {} agents in {}",
        report.total_agents_executed,
        format_duration(Duration::from_millis(report.total_execution_time_ms))
    ));
    lines.push(format!(
        "Found {} issues ({} critical, {} high, {} medium, {} low)",
        report.total_findings,
        report.critical_findings,
        report.high_findings,
        report.medium_findings,
        report.low_findings
    ));
    lines.push(format!(
        "Generated {} recommendations ({} high priority)",
        report.total_recommendations, report.high_priority_recommendations
    ));

    if report.total_fixes > 0 {
        lines.push(format!(
            "Proposed {} fixes ({} applied)",
            report.total_fixes, report.applied_fixes
        ));
    }

    if report.critical_findings > 0 {
        lines.push(format!(
            "⚠️ {} critical issues require immediate attention",
            report.critical_findings
        ));
    }

    if report.failed_agents > 0 {
        lines.push(format!(
            "⚠️ {} agents failed to complete; results may be incomplete",
            report.failed_agents
        ));
    }

    if report.skipped_agents > 0 {
        lines.push(format!("{} agents were skipped", report.skipped_agents));
    }

    let top = top_finding_types(report, 3);
    if !top.is_empty() {
        let parts: Vec<String> = top
            .iter()
            .map(|(t, n)| format!("{} ({})", t, n))
            .collect();
        lines.push(format!("Top issue types: {}", parts.join(", ")));
    }

    lines.join("\n")
}

/// The `n` most frequent finding types, ties broken by name.
pub fn top_finding_types(report: &ConsolidatedReport, n: usize) -> Vec<(String, usize)> {
    let mut types: Vec<(String, usize)> = report
        .findings_by_type
        .iter()
        .map(|(t, c)| (t.clone(), *c))
        .collect();
    types.sort_by_key(|(t, c)| (Reverse(*c), t.clone()));
    types.truncate(n);
    types
}

/// Files with the most findings across all agents.
pub fn most_affected_files(results: &[AgentTaskResult], n: usize) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for finding in results.iter().flat_map(|r| &r.findings) {
        if let Some(path) = finding.file_path.as_deref() {
            *counts.entry(path).or_insert(0) += 1;
        }
    }

    let mut files: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(p, c)| (p.to_string(), c))
        .collect();
    files.sort_by_key(|(p, c)| (Reverse(*c), p.clone()));
    files.truncate(n);
    files
}

/// Format a duration as `hh:mm:ss`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Ask the completion service to reword the summary for a human reader.
///
/// Any failure, including an empty answer, falls back to `summary`.
pub async fn polish_summary(
    gateway: &AiGateway,
    summary: &str,
    cancel: &CancellationToken,
) -> String {
    let prompt = format!(
        "Rewrite the following repository analysis summary as a short executive summary \
         for an engineering manager. Keep every number. Plain text, at most 6 sentences.\n\n{}",
        summary
    );

    match gateway.complete(&prompt, cancel).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            debug!("Empty AI summary, keeping template");
            summary.to_string()
        }
        Err(e) => {
            warn!("AI summary failed, keeping template: {}", e);
            summary.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::StubClient;
    use crate::models::{AgentFinding, AgentRecommendation};
    use uuid::Uuid;

    fn result(name: &str, status: AgentStatus, severities: &[Severity], ms: u64) -> AgentTaskResult {
        let mut r = match status {
            AgentStatus::Success => AgentTaskResult::success(Uuid::nil(), name, 1),
            AgentStatus::Failed => AgentTaskResult::failed(Uuid::nil(), name, 1, "boom", ms),
            AgentStatus::Skipped => AgentTaskResult::skipped(Uuid::nil(), name, 1, "budget"),
        };
        r.execution_time_ms = ms;
        r.findings = severities
            .iter()
            .enumerate()
            .map(|(i, s)| {
                AgentFinding::new(if i % 2 == 0 { "Security" } else { "Style" }, *s, "t", "")
                    .in_file(format!("src/{}.rs", name))
                    .at_line(i + 1)
            })
            .collect();
        r
    }

    #[test]
    fn test_consolidate_counts() {
        let mut a = result(
            "a",
            AgentStatus::Success,
            &[Severity::Critical, Severity::High, Severity::Low],
            1000,
        );
        a.recommendations = vec![
            AgentRecommendation::new("Security", RecommendationPriority::High, "r1", ""),
            AgentRecommendation::new("Quality", RecommendationPriority::Low, "r2", ""),
        ];
        let b = result("b", AgentStatus::Failed, &[], 500);
        let c = result("c", AgentStatus::Skipped, &[], 0);
        let d = result("d", AgentStatus::Success, &[Severity::Medium], 1500);

        let report = consolidate(&[a, b, c, d], Duration::from_secs(4));

        assert_eq!(report.total_agents_executed, 4);
        assert_eq!(report.successful_agents, 2);
        assert_eq!(report.failed_agents, 1);
        assert_eq!(report.skipped_agents, 1);
        assert_eq!(report.total_findings, 4);
        assert_eq!(
            report.critical_findings
                + report.high_findings
                + report.medium_findings
                + report.low_findings,
            report.total_findings
        );
        assert_eq!(report.findings_by_agent["a"], 3);
        assert_eq!(report.findings_by_agent["b"], 0);
        assert_eq!(report.findings_by_type["Security"], 3);
        assert_eq!(report.findings_by_severity[&Severity::Critical], 1);
        assert_eq!(report.total_recommendations, 2);
        assert_eq!(report.high_priority_recommendations, 1);
        assert_eq!(report.recommendations_by_type["Quality"], 1);
        assert_eq!(report.total_execution_time_ms, 4000);
        assert_eq!(report.average_execution_time_per_agent_ms, 750);
    }

    #[test]
    fn test_consolidate_empty() {
        let report = consolidate(&[], Duration::ZERO);
        assert_eq!(report.total_agents_executed, 0);
        assert_eq!(report.average_execution_time_per_agent_ms, 0);
        assert!(report
            .executive_summary
            .starts_with("Analysis executed by 0 agents in 00:00:00"));
    }

    #[test]
    fn test_executive_summary_warnings() {
        let results = vec![
            result("a", AgentStatus::Success, &[Severity::Critical, Severity::Low], 10),
            result("b", AgentStatus::Failed, &[], 10),
        ];
        let report = consolidate(&results, Duration::from_secs(3725));
        let summary = &report.executive_summary;

        assert!(summary.contains("Analysis executed by 2 agents in 01:02:05"));
        assert!(summary.contains("Found 2 issues (1 critical, 0 high, 0 medium, 1 low)"));
        assert!(summary.contains("1 critical issues require immediate attention"));
        assert!(summary.contains("1 agents failed to complete"));
        assert!(summary.contains("Top issue types: Security (1), Style (1)"));
    }

    #[test]
    fn test_no_warnings_when_clean() {
        let report = consolidate(
            &[result("a", AgentStatus::Success, &[], 10)],
            Duration::from_secs(1),
        );
        assert!(!report.executive_summary.contains("⚠️"));
        assert!(!report.executive_summary.contains("Top issue types"));
    }

    #[test]
    fn test_most_affected_files() {
        let results = vec![
            result("a", AgentStatus::Success, &[Severity::Low; 3], 0),
            result("b", AgentStatus::Success, &[Severity::Low; 1], 0),
        ];
        assert_eq!(
            most_affected_files(&results, 1),
            vec![("src/a.rs".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_polish_summary_falls_back() {
        let cancel = CancellationToken::new();

        let ok = StubClient::replying("  Polished.  ").gateway();
        assert_eq!(polish_summary(&ok, "raw", &cancel).await, "Polished.");

        let empty = StubClient::replying("   ").gateway();
        assert_eq!(polish_summary(&empty, "raw", &cancel).await, "raw");

        let failing = StubClient::failing("down").gateway();
        assert_eq!(polish_summary(&failing, "raw", &cancel).await, "raw");
    }
}

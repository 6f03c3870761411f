//! Markdown and JSON report generation.
//!
//! Renders a complete [`AgentTaskExecutionResponse`]: execution
//! metadata, the consolidated report, each agent's findings and fixes,
//! and the merged recommendations.

use crate::analysis::{format_duration, most_affected_files};
use crate::models::{
    AgentFinding, AgentFix, AgentRecommendation, AgentStatus, AgentTaskExecutionResponse,
    AgentTaskResult, ConsolidatedReport, Severity,
};
use anyhow::Result;
use std::cmp::Reverse;
use std::time::Duration;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(response: &AgentTaskExecutionResponse) -> String {
    let mut output = String::new();

    output.push_str("# Repository Analysis Report\n\n");
    output.push_str(&generate_metadata_section(response));
    output.push_str(&generate_table_of_contents(response));

    if let Some(report) = &response.consolidated_report {
        output.push_str(&generate_executive_summary_section(report));
        output.push_str(&generate_summary_section(report, &response.agent_results));
    }

    output.push_str(&generate_agents_section(&response.agent_results));
    output.push_str(&generate_recommendations_section(&response.agent_results));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(response: &AgentTaskExecutionResponse) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Repository:** {} ({})\n",
        response.repository_name, response.repository_url
    ));
    section.push_str(&format!("- **Execution ID:** `{}`\n", response.execution_id));
    section.push_str(&format!("- **Status:** {}\n", response.status));
    section.push_str(&format!(
        "- **Started:** {}\n",
        response.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {}\n",
        format_duration(Duration::from_millis(response.total_execution_time_ms))
    ));
    if let Some(ref error) = response.error_message {
        section.push_str(&format!("- **Error:** {}\n", error));
    }
    section.push('\n');

    section
}

fn generate_table_of_contents(response: &AgentTaskExecutionResponse) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    if response.consolidated_report.is_some() {
        toc.push_str("- [Executive Summary](#executive-summary)\n");
        toc.push_str("- [Summary](#summary)\n");
    }
    toc.push_str("- [Agent Results](#agent-results)\n");
    for result in &response.agent_results {
        toc.push_str(&format!(
            "  - [{}](#{})\n",
            result.agent_name,
            anchor(&result.agent_name)
        ));
    }
    if response
        .agent_results
        .iter()
        .any(|r| !r.recommendations.is_empty())
    {
        toc.push_str("- [Recommendations](#recommendations)\n");
    }
    toc.push('\n');

    toc
}

fn anchor(text: &str) -> String {
    text.replace(['/', '.', ' '], "-").to_lowercase()
}

fn generate_executive_summary_section(report: &ConsolidatedReport) -> String {
    let mut section = String::new();

    section.push_str("## Executive Summary\n\n");
    for line in report.executive_summary.lines() {
        section.push_str(line);
        section.push_str("  \n");
    }
    section.push('\n');

    section
}

fn generate_summary_section(report: &ConsolidatedReport, results: &[AgentTaskResult]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    section.push_str("### Finding Severity Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        Severity::Critical.emoji(),
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        report.critical_findings,
        report.high_findings,
        report.medium_findings,
        report.low_findings,
        report.total_findings
    ));

    section.push_str("### Agents\n\n");
    section.push_str("| Agent | Status | Findings | Fixes | Time |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|\n");
    for result in results {
        section.push_str(&format!(
            "| {} | {} {} | {} | {} | {:.1}s |\n",
            result.agent_name,
            status_icon(result.status),
            result.status,
            result.findings.len(),
            result.fixes.len(),
            result.execution_time_ms as f64 / 1000.0
        ));
    }
    section.push('\n');

    if !report.findings_by_type.is_empty() {
        section.push_str("### Findings by Type\n\n");
        section.push_str("| Type | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut types: Vec<_> = report.findings_by_type.iter().collect();
        types.sort_by_key(|(_, count)| Reverse(**count));
        for (finding_type, count) in types {
            section.push_str(&format!("| {} | {} |\n", finding_type, count));
        }
        section.push('\n');
    }

    let affected = most_affected_files(results, 5);
    if !affected.is_empty() {
        section.push_str("### Most Affected Files\n\n");
        section.push_str("| File | Findings |\n");
        section.push_str("|:---|:---:|\n");
        for (path, count) in affected {
            section.push_str(&format!("| `{}` | {} |\n", path, count));
        }
        section.push('\n');
    }

    section
}

fn status_icon(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Success => "✅",
        AgentStatus::Failed => "❌",
        AgentStatus::Skipped => "⏭️",
    }
}

fn generate_agents_section(results: &[AgentTaskResult]) -> String {
    let mut section = String::new();

    section.push_str("## Agent Results\n\n");

    if results.is_empty() {
        section.push_str("No agents were applicable to this repository.\n\n");
        return section;
    }

    for result in results {
        section.push_str(&generate_agent_block(result));
    }

    section
}

fn generate_agent_block(result: &AgentTaskResult) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {} {{#{}}}\n\n",
        result.agent_name,
        anchor(&result.agent_name)
    ));
    block.push_str(&format!(
        "*Status: {} {} | Priority: {} | Findings: {}*\n\n",
        status_icon(result.status),
        result.status,
        result.priority,
        result.findings.len()
    ));

    if !result.summary.is_empty() {
        block.push_str(&format!("{}\n\n", result.summary));
    }
    if let Some(ref error) = result.error_message {
        block.push_str(&format!("> ⚠️ **Error:** {}\n\n", error));
    }

    if result.status == AgentStatus::Success && result.findings.is_empty() {
        block.push_str("No issues found. 🎉\n\n");
    }

    // Highest severity first, then by location.
    let mut findings: Vec<&AgentFinding> = result.findings.iter().collect();
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.line_number.cmp(&b.line_number))
    });
    for finding in findings {
        block.push_str(&generate_finding_block(finding));
    }

    if !result.fixes.is_empty() {
        block.push_str("#### Fixes\n\n");
        for fix in &result.fixes {
            block.push_str(&generate_fix_line(fix));
        }
        block.push('\n');
    }

    block
}

/// Generate a single finding block.
fn generate_finding_block(finding: &AgentFinding) -> String {
    let mut block = String::new();

    let severity_badge = match finding.severity {
        Severity::Critical => "🔴 **CRITICAL**",
        Severity::High => "🟠 **HIGH**",
        Severity::Medium => "🟡 **MEDIUM**",
        Severity::Low => "🟢 **LOW**",
    };

    block.push_str(&format!(
        "#### {} {} - {}\n\n",
        severity_badge, finding.finding_type, finding.title
    ));

    if let Some(location) = finding.location() {
        block.push_str(&format!("**Location:** `{}`", location));
        if let Some(ref rule) = finding.rule {
            block.push_str(&format!(" | **Rule:** `{}`", rule));
        }
        block.push_str("\n\n");
    }

    if !finding.description.is_empty() {
        block.push_str(&format!("**Description:** {}\n\n", finding.description));
    }

    if let Some(ref code) = finding.code {
        block.push_str("<details>\n<summary>View Code</summary>\n\n```\n");
        block.push_str(code);
        block.push_str("\n```\n</details>\n\n");
    }

    if let Some(ref suggestion) = finding.suggested_fix {
        block.push_str(&format!("> 💡 **Suggestion:** {}\n\n", suggestion));
    }

    block.push_str("---\n\n");

    block
}

fn generate_fix_line(fix: &AgentFix) -> String {
    let state = if fix.applied {
        "applied".to_string()
    } else if let Some(ref error) = fix.error {
        format!("not applied: {}", error)
    } else {
        "proposed".to_string()
    };
    format!("- `{}`: {} ({})\n", fix.file_path, fix.description, state)
}

/// Recommendations from every agent, high priority first.
fn generate_recommendations_section(results: &[AgentTaskResult]) -> String {
    let mut recommendations: Vec<(&str, &AgentRecommendation)> = results
        .iter()
        .flat_map(|r| r.recommendations.iter().map(move |rec| (r.agent_name.as_str(), rec)))
        .collect();
    if recommendations.is_empty() {
        return String::new();
    }
    recommendations.sort_by_key(|(_, rec)| Reverse(rec.priority));

    let mut section = String::new();

    section.push_str("## Recommendations\n\n");
    for (i, (agent, rec)) in recommendations.iter().enumerate() {
        section.push_str(&format!(
            "{}. **{}** ({} priority, effort: {}, from {})\n",
            i + 1,
            rec.title,
            rec.priority,
            rec.estimated_effort,
            agent
        ));
        if !rec.description.is_empty() {
            section.push_str(&format!("   {}\n", rec.description));
        }
        for item in &rec.action_items {
            section.push_str(&format!("   - {}\n", item));
        }
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by agent-tasks v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(response: &AgentTaskExecutionResponse) -> Result<String> {
    serde_json::to_string_pretty(response).map_err(Into::into)
}

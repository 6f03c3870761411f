//! Line-level code review with optional AI-assisted review of small files.

use super::{check_cancelled, excerpt, Agent, AgentOutput};
use crate::error::{AgentError, CompletionError};
use crate::llm::{parse_findings, AiGateway};
use crate::models::{
    AgentFinding, AgentFix, AgentRecommendation, FixType, RecommendationPriority,
    RepositoryAnalysisContext, Severity,
};
use crate::scanner::{FileScanner, ScanConfig, ScannedFile};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const NAME: &str = "Code Review Agent";

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "cs", "js", "jsx", "ts", "tsx", "py", "java", "kt", "cpp", "cc", "c", "h", "hpp", "php",
    "rb", "go", "swift", "scala",
];

const MAX_LINE_LENGTH: usize = 120;

/// Files at or above this size are reviewed by rules only.
const AI_REVIEW_MAX_BYTES: usize = 10_000;

struct LineRule {
    regex: Regex,
    finding_type: &'static str,
    severity: Severity,
    rule: &'static str,
    title: &'static str,
    description: &'static str,
    suggestion: &'static str,
}

pub struct CodeReviewAgent {
    ai: Option<AiGateway>,
    scan: ScanConfig,
    rules: Vec<LineRule>,
}

impl CodeReviewAgent {
    pub fn new(ai: Option<AiGateway>, scan: ScanConfig) -> Self {
        Self {
            ai,
            scan: scan.with_extensions(CODE_EXTENSIONS),
            rules: build_rules(),
        }
    }

    fn scanner(&self, repo_path: &Path) -> FileScanner {
        FileScanner::new(repo_path, self.scan.clone())
    }

    /// Apply the line rules and whole-file checks to one file.
    fn review_content(
        &self,
        file: &ScannedFile,
        content: &str,
        ctx: &RepositoryAnalysisContext,
        output: &mut AgentOutput,
    ) {
        let mut trailing_ws_lines = 0usize;
        let mut first_trailing_ws = 0usize;

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;

            for rule in &self.rules {
                if !rule.regex.is_match(line) {
                    continue;
                }
                if rule.rule == "ERROR_002" && is_test_path(&file.path) {
                    continue;
                }
                output.findings.push(
                    AgentFinding::new(
                        rule.finding_type,
                        rule.severity,
                        rule.title,
                        rule.description,
                    )
                    .in_file(&file.path)
                    .at_line(line_no)
                    .with_rule(rule.rule)
                    .with_code(excerpt(line))
                    .with_suggested_fix(rule.suggestion),
                );
            }

            if line.chars().count() > MAX_LINE_LENGTH {
                output.findings.push(
                    AgentFinding::new(
                        "Code Style",
                        Severity::Low,
                        "Line too long",
                        format!(
                            "Line is {} characters long (limit {})",
                            line.chars().count(),
                            MAX_LINE_LENGTH
                        ),
                    )
                    .in_file(&file.path)
                    .at_line(line_no)
                    .with_rule("STYLE_001")
                    .with_suggested_fix("Break the line into smaller expressions"),
                );
            }

            if line.ends_with([' ', '\t']) {
                if trailing_ws_lines == 0 {
                    first_trailing_ws = line_no;
                }
                trailing_ws_lines += 1;
            }
        }

        if trailing_ws_lines > 0 {
            let finding = AgentFinding::new(
                "Code Style",
                Severity::Low,
                "Trailing whitespace",
                format!("{} line(s) end with trailing whitespace", trailing_ws_lines),
            )
            .in_file(&file.path)
            .at_line(first_trailing_ws)
            .with_rule("STYLE_002")
            .with_suggested_fix("Strip trailing whitespace")
            .auto_fixable();

            if ctx.include_auto_fix {
                output.fixes.push(AgentFix::for_finding(
                    &finding,
                    FixType::CodeFix,
                    &file.path,
                    content,
                    strip_trailing_whitespace(content),
                    format!("Strip trailing whitespace from {} line(s)", trailing_ws_lines),
                ));
            }
            output.findings.push(finding);
        }
    }

    /// Ask the completion service to review one file.
    async fn ai_review(
        &self,
        gateway: &AiGateway,
        file: &ScannedFile,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentFinding>, CompletionError> {
        let prompt = format!(
            "Review the following file for bugs, security problems and maintainability issues.\n\
             Report each issue as one JSON object per line with the keys \
             file_path, line_number, severity (low|medium|high|critical), category, title, \
             description, suggestion. Output only JSON lines. Output nothing if the file is fine.\n\n\
             ### FILE: {}\n```\n{}\n```\n",
            file.path, content
        );
        let response = gateway.complete(&prompt, cancel).await?;
        Ok(parse_findings(&response, Some(&file.path), "AI_001"))
    }
}

fn rule(
    pattern: &str,
    finding_type: &'static str,
    severity: Severity,
    rule: &'static str,
    title: &'static str,
    description: &'static str,
    suggestion: &'static str,
) -> LineRule {
    LineRule {
        regex: Regex::new(pattern).expect("built-in code review pattern"),
        finding_type,
        severity,
        rule,
        title,
        description,
        suggestion,
    }
}

fn build_rules() -> Vec<LineRule> {
    vec![
        rule(
            r"\b(Console\.WriteLine|console\.log|System\.out\.println|printStackTrace)\s*\(",
            "Code Quality",
            Severity::Medium,
            "LOGGING_001",
            "Console output used for logging",
            "Direct console output bypasses log levels and structured logging",
            "Use the project's logging framework instead",
        ),
        rule(
            r#"(?i)\b(password|passwd|pwd|secret|api_?key)\b\s*[:=]\s*["'][^"']{3,}["']"#,
            "Security",
            Severity::High,
            "SECURITY_001",
            "Hardcoded credential",
            "A credential appears to be assigned a literal value in source code",
            "Load credentials from the environment or a secret store",
        ),
        rule(
            r"(//|#|/\*)\s*(TODO|FIXME|HACK)\b",
            "Maintenance",
            Severity::Low,
            "MAINT_001",
            "Unresolved TODO comment",
            "A TODO/FIXME marker indicates unfinished work",
            "Resolve the TODO or track it in the issue tracker",
        ),
        rule(
            r"catch\s*\(\s*(\.\.\.|(Exception|Throwable)\b)|^\s*except\s*(Exception\s*)?:",
            "Error Handling",
            Severity::Medium,
            "ERROR_001",
            "Overly broad exception handler",
            "Catching every exception hides unrelated failures",
            "Catch the specific exception types you can handle",
        ),
        rule(
            r"\.unwrap\(\)",
            "Error Handling",
            Severity::Low,
            "ERROR_002",
            "Unchecked unwrap",
            "unwrap() panics on the error path instead of propagating the failure",
            "Propagate the error with ? or handle it explicitly",
        ),
    ]
}

fn is_test_path(path: &str) -> bool {
    path.split('/')
        .any(|seg| seg == "tests" || seg == "test" || seg.ends_with("_test.rs") || seg == "benches")
}

/// Drop spaces and tabs at the end of every line, keeping each line's
/// own terminator (`\n` or `\r\n`).
fn strip_trailing_whitespace(content: &str) -> String {
    content
        .split_inclusive('\n')
        .map(|line| {
            let (body, ending) = match line.strip_suffix("\r\n") {
                Some(body) => (body, "\r\n"),
                None => match line.strip_suffix('\n') {
                    Some(body) => (body, "\n"),
                    None => (line, ""),
                },
            };
            format!("{}{}", body.trim_end_matches([' ', '\t']), ending)
        })
        .collect()
}

#[async_trait]
impl Agent for CodeReviewAgent {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Reviews source code for quality, maintainability and risky patterns"
    }

    fn priority(&self) -> u32 {
        1
    }

    fn estimate_execution_time(&self) -> Duration {
        Duration::from_secs(10 * 60)
    }

    async fn is_applicable(
        &self,
        repo_path: &Path,
        _ctx: &RepositoryAnalysisContext,
    ) -> Result<bool, AgentError> {
        let probe = FileScanner::new(repo_path, self.scan.clone().with_max_files(Some(1)));
        Ok(!probe.scan_async().await?.is_empty())
    }

    async fn analyze(
        &self,
        repo_path: &Path,
        ctx: &RepositoryAnalysisContext,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError> {
        let scanner = self.scanner(repo_path);
        let files = scanner.scan_async().await?;

        let limit = ctx
            .agent_option_usize(NAME, "max_files")
            .unwrap_or(ctx.max_findings_per_agent / 10)
            .max(1);
        let use_ai = ctx.agent_option_bool(NAME, "ai").unwrap_or(true);
        let selected = &files[..files.len().min(limit)];

        info!(
            "Reviewing {} of {} code files{}",
            selected.len(),
            files.len(),
            if use_ai && self.ai.is_some() { " with AI assistance" } else { "" }
        );

        let mut output = AgentOutput::default();
        let mut ai_reviewed = 0usize;
        let mut ai_errors = 0usize;

        for file in selected {
            check_cancelled(cancel)?;

            let content = match scanner.read_async(file).await {
                Ok(c) => c,
                Err(e) => {
                    debug!("Cannot read {}: {}", file.path, e);
                    output.findings.push(
                        AgentFinding::new(
                            "Error",
                            Severity::Low,
                            "File could not be analyzed",
                            format!("Failed to read file: {}", e),
                        )
                        .in_file(&file.path),
                    );
                    continue;
                }
            };

            self.review_content(file, &content, ctx, &mut output);

            if let (true, Some(gateway)) = (use_ai, &self.ai) {
                if content.len() < AI_REVIEW_MAX_BYTES {
                    match self.ai_review(gateway, file, &content, cancel).await {
                        Ok(found) => {
                            ai_reviewed += 1;
                            output.findings.extend(found);
                        }
                        Err(CompletionError::Cancelled) => return Err(AgentError::Cancelled),
                        Err(e) => {
                            warn!("AI review of {} failed: {}", file.path, e);
                            ai_errors += 1;
                        }
                    }
                }
            }
        }

        output.recommendations.push(
            AgentRecommendation::new(
                "Code Quality",
                RecommendationPriority::Medium,
                "Implement continuous static analysis",
                "Run linters and static analyzers on every change so these issues are caught before review",
            )
            .with_action_items([
                "Add a linter to the CI pipeline",
                "Fail the build on new high-severity warnings",
                "Enforce a formatter to remove style noise",
            ])
            .with_effort("Low"),
        );

        if selected.len() < files.len() {
            output.recommendations.push(
                AgentRecommendation::new(
                    "Code Quality",
                    RecommendationPriority::Low,
                    "Extend code review coverage",
                    format!(
                        "Only {} of {} code files were reviewed; raise the file limit to cover the rest",
                        selected.len(),
                        files.len()
                    ),
                )
                .with_action_items(["Increase the max_files option for this agent"]),
            );
        }

        output.summary = format!(
            "Analyzed {} of {} code files. Found {} issues.",
            selected.len(),
            files.len(),
            output.findings.len()
        );
        output.record("files_total", files.len());
        output.record("files_analyzed", selected.len());
        output.record("ai_reviewed_files", ai_reviewed);
        output.record("ai_errors", ai_errors);

        Ok(output)
    }
}

//! Documentation completeness and quality.

use super::{check_cancelled, Agent, AgentOutput};
use crate::error::{AgentError, CompletionError};
use crate::llm::{parse_findings, AiGateway};
use crate::models::{
    AgentFinding, AgentFix, AgentRecommendation, FixType, RecommendationPriority,
    RepositoryAnalysisContext, Severity,
};
use crate::scanner::{FileScanner, ScanConfig, ScannedFile};
use async_trait::async_trait;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const NAME: &str = "Documentation Agent";

const MIN_README_CHARS: usize = 200;
const README_SECTIONS: &[&str] = &["Installation", "Usage", "Contributing", "License"];
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yml", "yaml", "ini", "conf", "properties"];
const SOURCE_EXTENSIONS: &[&str] = &["rs", "py", "js", "ts", "tsx", "java", "kt", "cs", "go"];

/// Essential repository files: (display name, accepted names, severity when missing).
const ESSENTIAL_FILES: &[(&str, &[&str], Severity)] = &[
    ("README.md", &["readme.md", "readme", "readme.rst", "readme.txt"], Severity::High),
    ("CONTRIBUTING.md", &["contributing.md", "contributing"], Severity::Medium),
    ("LICENSE", &["license", "license.md", "license.txt", "license-mit", "license-apache"], Severity::Medium),
    ("CHANGELOG.md", &["changelog.md", "changelog", "changes.md", "history.md"], Severity::Medium),
];

/// Public item counts for documentation coverage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Coverage {
    documented: usize,
    total: usize,
}

impl Coverage {
    fn add(&mut self, other: Coverage) {
        self.documented += other.documented;
        self.total += other.total;
    }

    fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.documented as f64 * 100.0 / self.total as f64)
        }
    }
}

pub struct DocumentationAgent {
    ai: Option<AiGateway>,
    scan: ScanConfig,
    public_item: Regex,
    python_item: Regex,
    api_route: Regex,
}

impl DocumentationAgent {
    pub fn new(ai: Option<AiGateway>, scan: ScanConfig) -> Self {
        let re = |p: &str| Regex::new(p).expect("built-in documentation pattern");
        Self {
            ai,
            scan: scan.with_max_files(None),
            public_item: re(
                r"^\s*(pub(\(crate\))?\s+(async\s+)?(fn|struct|enum|trait|type|const|mod)\s|export\s+(default\s+)?(async\s+)?(function|class|interface|const)\s|public\s+(static\s+)?(abstract\s+)?(class|interface|enum|record|[\w<>\[\],]+\s+\w+\s*\()|func\s+[A-Z])",
            ),
            python_item: re(r"^\s*(def|class)\s+[A-Za-z]\w*"),
            api_route: re(
                r"#\[(get|post|put|delete|route)\(|@(Get|Post|Put|Delete|Request)Mapping|\[Http(Get|Post|Put|Delete)|\bapp\.(get|post|put|delete)\(|@app\.route\(|\.route\(",
            ),
        }
    }

    fn root_entries(repo_path: &Path) -> Vec<String> {
        match fs::read_dir(repo_path) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_lowercase())
                .collect(),
            Err(e) => {
                debug!("Cannot list {}: {}", repo_path.display(), e);
                Vec::new()
            }
        }
    }

    fn find_readme(repo_path: &Path) -> Option<(String, String)> {
        let entries = fs::read_dir(repo_path).ok()?;
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.to_lowercase().starts_with("readme"))
            .collect();
        names.sort();
        let name = names.into_iter().next()?;
        let content = fs::read_to_string(repo_path.join(&name)).ok()?;
        Some((name, content))
    }

    fn check_essential_files(
        &self,
        repo_path: &Path,
        ctx: &RepositoryAnalysisContext,
        out: &mut AgentOutput,
    ) {
        let entries = Self::root_entries(repo_path);

        for (display, accepted, severity) in ESSENTIAL_FILES {
            if accepted.iter().any(|a| entries.iter().any(|e| e.as_str() == *a)) {
                continue;
            }

            let mut finding = AgentFinding::new(
                "Documentation",
                *severity,
                format!("Missing {}", display),
                format!("The repository has no {} file", display),
            )
            .in_file(*display)
            .with_rule("DOC_MISSING_001")
            .with_suggested_fix(format!("Add a {} file to the repository root", display));

            if *display == "README.md" {
                finding = finding.auto_fixable();
                if ctx.include_auto_fix {
                    out.fixes.push(AgentFix::for_finding(
                        &finding,
                        FixType::DocumentationFix,
                        "README.md",
                        "",
                        readme_stub(ctx),
                        "Create a README skeleton",
                    ));
                }
            }
            out.findings.push(finding);
        }

        if !repo_path.join("docs").is_dir() {
            out.findings.push(
                AgentFinding::new(
                    "Documentation",
                    Severity::Medium,
                    "Missing docs directory",
                    "There is no docs/ directory for guides beyond the README",
                )
                .in_file("docs/")
                .with_rule("DOC_MISSING_001"),
            );
        }
    }

    fn check_readme_quality(&self, name: &str, content: &str, out: &mut AgentOutput) {
        if content.trim().chars().count() < MIN_README_CHARS {
            out.findings.push(
                AgentFinding::new(
                    "Documentation",
                    Severity::Medium,
                    "README is too short",
                    format!(
                        "The README has fewer than {} characters of content",
                        MIN_README_CHARS
                    ),
                )
                .in_file(name)
                .with_rule("DOC_README_001"),
            );
        }

        let headings: Vec<String> = content
            .lines()
            .filter(|l| l.trim_start().starts_with('#'))
            .map(|l| l.to_lowercase())
            .collect();

        for section in README_SECTIONS {
            let needle = section.to_lowercase();
            if !headings.iter().any(|h| h.contains(&needle)) {
                out.findings.push(
                    AgentFinding::new(
                        "Documentation",
                        Severity::Low,
                        format!("README lacks a {} section", section),
                        format!("Readers look for a '{}' heading", section),
                    )
                    .in_file(name)
                    .with_rule("DOC_README_002"),
                );
            }
        }

        if !content.contains("```") {
            out.findings.push(
                AgentFinding::new(
                    "Documentation",
                    Severity::Medium,
                    "README has no code examples",
                    "Add at least one fenced code block showing how to use the project",
                )
                .in_file(name)
                .with_rule("DOC_README_003"),
            );
        }
    }

    async fn ai_readme_review(
        &self,
        gateway: &AiGateway,
        name: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentFinding>, CompletionError> {
        let prompt = format!(
            "Review this README for clarity and completeness for a new contributor.\n\
             Report each improvement as one JSON object per line with the keys \
             severity (low|medium|high), category, title, description, suggestion. \
             Output only JSON lines.\n\n```markdown\n{}\n```\n",
            content
        );
        let response = gateway.complete(&prompt, cancel).await?;
        Ok(parse_findings(&response, Some(name), "DOC_AI_001"))
    }

    fn file_coverage(&self, file: &ScannedFile, content: &str) -> Coverage {
        let lines: Vec<&str> = content.lines().collect();
        let mut cov = Coverage::default();

        for (idx, line) in lines.iter().enumerate() {
            if file.extension == "py" {
                // Names starting with an underscore never match, so private items are skipped.
                if !self.python_item.is_match(line) {
                    continue;
                }
                cov.total += 1;
                let next = lines[idx + 1..].iter().find(|l| !l.trim().is_empty());
                if next.is_some_and(|l| {
                    let t = l.trim_start();
                    t.starts_with("\"\"\"") || t.starts_with("'''")
                }) {
                    cov.documented += 1;
                }
            } else if self.public_item.is_match(line) {
                cov.total += 1;
                let prev = lines[..idx]
                    .iter()
                    .rev()
                    .map(|l| l.trim())
                    .find(|l| !(l.starts_with("#[") || l.starts_with('@')));
                if prev.is_some_and(is_doc_comment_line) {
                    cov.documented += 1;
                }
            }
        }

        cov
    }

    fn check_config_comments(&self, file: &ScannedFile, content: &str, out: &mut AgentOutput) {
        if content.len() <= 100 {
            return;
        }
        let has_comment = content.lines().any(|l| {
            let t = l.trim_start();
            t.starts_with('#') || t.starts_with(';') || t.starts_with("//")
        });
        if !has_comment {
            out.findings.push(
                AgentFinding::new(
                    "Documentation",
                    Severity::Low,
                    "Configuration file has no comments",
                    "Explain what the settings do and which values are valid",
                )
                .in_file(&file.path)
                .with_rule("DOC_CONFIG_001"),
            );
        }
    }
}

fn is_doc_comment_line(line: &str) -> bool {
    line.starts_with("///")
        || line.starts_with("//!")
        || line.starts_with("/**")
        || line.starts_with('*')
        || line.ends_with("*/")
        || line.starts_with("// ")
}

fn readme_stub(ctx: &RepositoryAnalysisContext) -> String {
    let name = if ctx.repository_name.is_empty() {
        "Project"
    } else {
        ctx.repository_name.as_str()
    };
    let languages = if ctx.programming_languages.is_empty() {
        String::new()
    } else {
        format!("\nWritten in {}.\n", ctx.programming_languages.join(", "))
    };

    format!(
        "# {name}\n\nShort description of what {name} does.\n{languages}\n\
         ## Installation\n\n```sh\ngit clone {url}\n```\n\n\
         ## Usage\n\n```sh\n# example command\n```\n\n\
         ## Contributing\n\nPull requests are welcome.\n\n\
         ## License\n\nSee LICENSE.\n",
        name = name,
        languages = languages,
        url = ctx.repository_url,
    )
}

#[async_trait]
impl Agent for DocumentationAgent {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Checks essential project files, README quality and API documentation coverage"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn estimate_execution_time(&self) -> Duration {
        Duration::from_secs(6 * 60)
    }

    async fn is_applicable(
        &self,
        _repo_path: &Path,
        _ctx: &RepositoryAnalysisContext,
    ) -> Result<bool, AgentError> {
        Ok(true)
    }

    async fn analyze(
        &self,
        repo_path: &Path,
        ctx: &RepositoryAnalysisContext,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError> {
        let mut output = AgentOutput::default();
        let mut ai_errors = 0usize;

        self.check_essential_files(repo_path, ctx, &mut output);

        if let Some((name, content)) = Self::find_readme(repo_path) {
            self.check_readme_quality(&name, &content, &mut output);

            let use_ai = ctx.agent_option_bool(NAME, "ai").unwrap_or(true);
            if let (true, Some(gateway)) = (use_ai, &self.ai) {
                match self.ai_readme_review(gateway, &name, &content, cancel).await {
                    Ok(found) => output.findings.extend(found),
                    Err(CompletionError::Cancelled) => return Err(AgentError::Cancelled),
                    Err(e) => {
                        warn!("AI README review failed: {}", e);
                        ai_errors += 1;
                    }
                }
            }
        }

        check_cancelled(cancel)?;

        let scanner = FileScanner::new(repo_path, self.scan.clone());
        let files = scanner.scan_async().await?;
        let mut coverage = Coverage::default();
        let mut has_routes = false;
        let mut has_api_spec = false;

        for file in &files {
            check_cancelled(cancel)?;

            let lower = file.path.to_lowercase();
            if lower.contains("openapi") || lower.contains("swagger") {
                has_api_spec = true;
            }

            let ext = file.extension.as_str();
            let is_source = SOURCE_EXTENSIONS.contains(&ext);
            let is_config = CONFIG_EXTENSIONS.contains(&ext);
            if !is_source && !is_config {
                continue;
            }

            let content = match scanner.read_async(file).await {
                Ok(c) => c,
                Err(e) => {
                    debug!("Skipping unreadable file {}: {}", file.path, e);
                    continue;
                }
            };

            if is_source {
                coverage.add(self.file_coverage(file, &content));
                has_routes |= content.lines().any(|l| self.api_route.is_match(l));
            } else {
                self.check_config_comments(file, &content, &mut output);
            }
        }

        if let Some(pct) = coverage.percent() {
            if coverage.total >= 5 && pct < 50.0 {
                output.findings.push(
                    AgentFinding::new(
                        "Code Documentation",
                        Severity::Medium,
                        "Low documentation coverage for public items",
                        format!(
                            "Only {} of {} public items ({:.0}%) have doc comments",
                            coverage.documented, coverage.total, pct
                        ),
                    )
                    .with_rule("DOC_CODE_001")
                    .with_suggested_fix("Document public functions, types and modules"),
                );
            }
            output.record("public_items", coverage.total);
            output.record("documented_public_items", coverage.documented);
        }

        if has_routes && !has_api_spec {
            output.findings.push(
                AgentFinding::new(
                    "API Documentation",
                    Severity::Medium,
                    "API endpoints without an API specification",
                    "HTTP routes were found but no OpenAPI/Swagger document",
                )
                .with_rule("DOC_API_001")
                .with_suggested_fix("Publish an OpenAPI description of the endpoints"),
            );
        }

        output.recommendations.push(
            AgentRecommendation::new(
                "Documentation",
                RecommendationPriority::High,
                "Maintain a comprehensive README",
                "The README is the entry point for users and contributors",
            )
            .with_action_items([
                "Describe what the project does and why",
                "Document installation and usage with examples",
                "Link to contribution guidelines and the license",
            ])
            .with_effort("Low"),
        );
        output.recommendations.push(
            AgentRecommendation::new(
                "Documentation",
                RecommendationPriority::Medium,
                "Document public APIs",
                "Doc comments on public items make the code base easier to adopt and review",
            )
            .with_action_items(["Add doc comments to public items", "Generate API docs in CI"]),
        );
        output.recommendations.push(
            AgentRecommendation::new(
                "Documentation",
                RecommendationPriority::Low,
                "Keep a changelog",
                "A changelog tells users what changed between releases",
            )
            .with_action_items(["Adopt the Keep a Changelog format"])
            .with_effort("Low"),
        );

        output.summary = match coverage.percent() {
            Some(pct) => format!(
                "Found {} documentation issues. Public item coverage: {:.0}%.",
                output.findings.len(),
                pct
            ),
            None => format!("Found {} documentation issues.", output.findings.len()),
        };
        output.record("ai_errors", ai_errors);
        Ok(output)
    }
}

//! Security analysis: secrets in configuration, risky dependencies,
//! sensitive files and insecure code patterns.

use super::{check_cancelled, excerpt, Agent, AgentOutput};
use crate::error::AgentError;
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
use tracing::{debug, info};

const NAME: &str = "Security Analysis Agent";

const SENSITIVE_EXTENSIONS: &[&str] = &["pem", "key", "p12", "pfx", "jks", "keystore"];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "cs", "cshtml", "js", "jsx", "ts", "tsx", "py", "java", "kt", "php", "rb", "go",
];

const RISKY_NPM_PACKAGES: &[&str] = &["lodash", "moment", "request"];

struct CodePattern {
    regex: Regex,
    finding_type: &'static str,
    severity: Severity,
    rule: &'static str,
    title: &'static str,
    suggestion: &'static str,
}

struct Patterns {
    credential: Regex,
    insecure_flag: Regex,
    unpinned_npm: Regex,
    cargo_wildcard: Regex,
    old_netcore: Regex,
    code: Vec<CodePattern>,
}

impl Patterns {
    fn new() -> Self {
        let re = |p: &str| Regex::new(p).expect("built-in security pattern");
        let code = |pattern: &str,
                    finding_type: &'static str,
                    severity: Severity,
                    rule: &'static str,
                    title: &'static str,
                    suggestion: &'static str| CodePattern {
            regex: re(pattern),
            finding_type,
            severity,
            rule,
            title,
            suggestion,
        };

        Self {
            credential: re(
                r#"(?i)["']?(password|passwd|secret|api[_-]?key|access[_-]?key|client[_-]?secret|token|connectionstring)["']?\s*[:=]\s*["']?([^\s"',;{}$<]{4,})"#,
            ),
            insecure_flag: re(r#"(?i)["']?\w*(ssl|https|secure|validate|verify)\w*["']?\s*[:=]\s*["']?false\b"#),
            unpinned_npm: re(r#""[^"]+"\s*:\s*"(latest|\*)""#),
            cargo_wildcard: re(r#"^\s*[\w-]+\s*=\s*"\*""#),
            old_netcore: re(r"<TargetFramework>netcoreapp[12]\.\d+</TargetFramework>"),
            code: vec![
                code(
                    r#"(?i)(CommandText\s*=.*\+|["'](select|insert|update|delete)\b[^"']*["']\s*\+|format!\(\s*"(select|insert|update|delete)\b)"#,
                    "SQL Injection",
                    Severity::High,
                    "SEC_CODE_001",
                    "SQL built by string concatenation",
                    "Use parameterized queries or a query builder",
                ),
                code(
                    r"Html\.Raw\(|\.innerHTML\s*=|dangerouslySetInnerHTML",
                    "Cross-Site Scripting",
                    Severity::High,
                    "SEC_CODE_002",
                    "Unescaped HTML output",
                    "Encode output or sanitize HTML before rendering",
                ),
                code(
                    r"(?i)\b(md5|sha1)\b",
                    "Cryptography",
                    Severity::Medium,
                    "SEC_CODE_003",
                    "Weak hash algorithm",
                    "Use SHA-256 or stronger; use a password hash such as Argon2 for passwords",
                ),
                code(
                    r"new Random\(\)|Math\.random\(\)|\brandom\.random\(\)",
                    "Cryptography",
                    Severity::Medium,
                    "SEC_CODE_004",
                    "Non-cryptographic random number generator",
                    "Use a cryptographically secure RNG for tokens and secrets",
                ),
            ],
        }
    }
}

pub struct SecurityAnalysisAgent {
    scan: ScanConfig,
    patterns: Patterns,
}

impl SecurityAnalysisAgent {
    pub fn new(scan: ScanConfig) -> Self {
        Self {
            scan: scan.with_hidden(true).with_max_files(None),
            patterns: Patterns::new(),
        }
    }

    fn check_config_file(&self, file: &ScannedFile, content: &str, out: &mut Vec<AgentFinding>) {
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }

            if let Some(caps) = self.patterns.credential.captures(line) {
                if !is_placeholder(&caps[2]) {
                    out.push(
                        AgentFinding::new(
                            "Security",
                            Severity::High,
                            "Credential stored in configuration file",
                            format!("'{}' is assigned a literal value", &caps[1]),
                        )
                        .in_file(&file.path)
                        .at_line(idx + 1)
                        .with_rule("SEC_CONFIG_001")
                        .with_suggested_fix(
                            "Move the value to environment variables or a secret manager",
                        ),
                    );
                }
            }

            if self.patterns.insecure_flag.is_match(line) {
                out.push(
                    AgentFinding::new(
                        "Security",
                        Severity::Medium,
                        "Security check disabled in configuration",
                        "A TLS, verification or validation setting is turned off",
                    )
                    .in_file(&file.path)
                    .at_line(idx + 1)
                    .with_rule("SEC_CONFIG_002")
                    .with_code(excerpt(line)),
                );
            }
        }
    }

    fn check_dependencies(&self, file: &ScannedFile, content: &str, out: &mut Vec<AgentFinding>) {
        let name = file.file_name();
        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            match name {
                "package.json" => {
                    if self.patterns.unpinned_npm.is_match(line) {
                        out.push(
                            AgentFinding::new(
                                "Dependency Security",
                                Severity::Medium,
                                "Unpinned npm dependency",
                                "A dependency resolves to 'latest' or '*', so builds can pull untested releases",
                            )
                            .in_file(&file.path)
                            .at_line(line_no)
                            .with_rule("SEC_DEP_001")
                            .with_code(excerpt(line)),
                        );
                    }
                    for pkg in RISKY_NPM_PACKAGES {
                        if line.trim_start().starts_with(&format!("\"{}\"", pkg)) {
                            out.push(
                                AgentFinding::new(
                                    "Dependency Security",
                                    Severity::Low,
                                    format!("Dependency '{}' has a history of vulnerabilities", pkg),
                                    "Check it is up to date or replace it with a maintained alternative",
                                )
                                .in_file(&file.path)
                                .at_line(line_no)
                                .with_rule("SEC_DEP_002"),
                            );
                        }
                    }
                }
                "Cargo.toml" => {
                    if self.patterns.cargo_wildcard.is_match(line) {
                        out.push(
                            AgentFinding::new(
                                "Dependency Security",
                                Severity::Medium,
                                "Wildcard crate version",
                                "A '*' version requirement accepts any release, including breaking ones",
                            )
                            .in_file(&file.path)
                            .at_line(line_no)
                            .with_rule("SEC_DEP_003")
                            .with_code(excerpt(line)),
                        );
                    }
                }
                "requirements.txt" => {
                    let spec = line.trim();
                    if !spec.is_empty()
                        && !spec.starts_with('#')
                        && !spec.starts_with('-')
                        && !["==", ">=", "~=", "<="].iter().any(|op| spec.contains(op))
                    {
                        out.push(
                            AgentFinding::new(
                                "Dependency Security",
                                Severity::Medium,
                                "Unpinned Python dependency",
                                format!("'{}' has no version constraint", spec),
                            )
                            .in_file(&file.path)
                            .at_line(line_no)
                            .with_rule("SEC_PY_001"),
                        );
                    }
                }
                _ if file.extension == "csproj" => {
                    if self.patterns.old_netcore.is_match(line) {
                        out.push(
                            AgentFinding::new(
                                "Dependency Security",
                                Severity::Medium,
                                "Unsupported .NET Core target",
                                "The project targets a .NET Core version that no longer receives security patches",
                            )
                            .in_file(&file.path)
                            .at_line(line_no)
                            .with_rule("SEC_DOTNET_001"),
                        );
                    }
                    if line.contains("<AllowUnsafeBlocks>true</AllowUnsafeBlocks>") {
                        out.push(
                            AgentFinding::new(
                                "Security",
                                Severity::Medium,
                                "Unsafe code enabled",
                                "AllowUnsafeBlocks permits unchecked memory access",
                            )
                            .in_file(&file.path)
                            .at_line(line_no)
                            .with_rule("SEC_DOTNET_002"),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn check_source(&self, file: &ScannedFile, content: &str, out: &mut Vec<AgentFinding>) {
        for (idx, line) in content.lines().enumerate() {
            for pattern in &self.patterns.code {
                if pattern.regex.is_match(line) {
                    out.push(
                        AgentFinding::new(
                            pattern.finding_type,
                            pattern.severity,
                            pattern.title,
                            format!("Potentially insecure pattern in {}", file.path),
                        )
                        .in_file(&file.path)
                        .at_line(idx + 1)
                        .with_rule(pattern.rule)
                        .with_code(excerpt(line))
                        .with_suggested_fix(pattern.suggestion),
                    );
                }
            }
        }
    }

    /// Propose adding `.env` to `.gitignore` when it is not already ignored.
    fn gitignore_fix(&self, repo_path: &Path, finding: &AgentFinding) -> Option<AgentFix> {
        let current = std::fs::read_to_string(repo_path.join(".gitignore")).unwrap_or_default();
        if current.lines().any(|l| matches!(l.trim(), ".env" | ".env*" | "*.env" | "/.env")) {
            return None;
        }

        let mut fixed = current.clone();
        if !fixed.is_empty() && !fixed.ends_with('\n') {
            fixed.push('\n');
        }
        fixed.push_str(".env\n");

        Some(AgentFix::for_finding(
            finding,
            FixType::ConfigurationFix,
            ".gitignore",
            current,
            fixed,
            "Ignore .env files so local secrets are not committed",
        ))
    }
}

fn is_config_file(name: &str, ext: &str) -> bool {
    let lower = name.to_lowercase();
    (lower.starts_with("appsettings") && ext == "json")
        || lower == "web.config"
        || lower == "config.json"
        || lower.starts_with(".env")
        || matches!(ext, "yml" | "yaml" | "properties" | "ini" | "conf")
        || (ext == "toml" && lower != "cargo.toml" && lower != "pyproject.toml")
}

fn is_dependency_manifest(name: &str, ext: &str) -> bool {
    matches!(name, "package.json" | "Cargo.toml" | "requirements.txt") || ext == "csproj"
}

fn is_example_env(name: &str) -> bool {
    [".example", ".sample", ".template", ".dist"]
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

fn is_sensitive_type(name: &str, ext: &str) -> bool {
    SENSITIVE_EXTENSIONS.contains(&ext)
        || name.starts_with("id_rsa")
        || name.starts_with("id_ed25519")
        || ((name == ".env" || name.starts_with(".env.")) && !is_example_env(name))
}

fn has_sensitive_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_lowercase();
    stem.split(['-', '_'])
        .any(|seg| {
            matches!(
                seg,
                "secret" | "secrets" | "password" | "passwords" | "token" | "tokens" | "credentials"
            )
        })
}

fn is_placeholder(value: &str) -> bool {
    let lower = value.to_lowercase();
    ["changeme", "example", "placeholder", "your", "xxx", "null", "none", "true", "false"]
        .iter()
        .any(|p| lower.starts_with(p))
}

#[async_trait]
impl Agent for SecurityAnalysisAgent {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Finds exposed secrets, risky dependencies, sensitive files and insecure code patterns"
    }

    fn priority(&self) -> u32 {
        2
    }

    fn estimate_execution_time(&self) -> Duration {
        Duration::from_secs(8 * 60)
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
        let scanner = FileScanner::new(repo_path, self.scan.clone());
        let files = scanner.scan_async().await?;
        info!("Scanning {} files for security issues", files.len());

        let mut output = AgentOutput::default();
        let mut findings = Vec::new();
        let mut env_finding: Option<usize> = None;

        for file in &files {
            check_cancelled(cancel)?;

            let name = file.file_name();
            let ext = file.extension.as_str();

            if is_sensitive_type(name, ext) {
                if name.starts_with(".env") && env_finding.is_none() {
                    env_finding = Some(findings.len());
                }
                findings.push(
                    AgentFinding::new(
                        "Sensitive File",
                        Severity::Critical,
                        "Sensitive file committed to the repository",
                        format!("{} may contain keys or secrets", file.path),
                    )
                    .in_file(&file.path)
                    .with_rule("SEC_SENSITIVE_001")
                    .with_suggested_fix("Remove the file from history and rotate any exposed secrets"),
                );
            } else if has_sensitive_name(name) {
                findings.push(
                    AgentFinding::new(
                        "Sensitive File",
                        Severity::High,
                        "File name suggests it stores secrets",
                        format!("{} should be reviewed for credentials", file.path),
                    )
                    .in_file(&file.path)
                    .with_rule("SEC_FILE_001"),
                );
            }

            let wants_content = is_config_file(name, ext)
                || is_dependency_manifest(name, ext)
                || SOURCE_EXTENSIONS.contains(&ext);
            if !wants_content || SENSITIVE_EXTENSIONS.contains(&ext) {
                continue;
            }

            let content = match scanner.read_async(file).await {
                Ok(c) => c,
                Err(e) => {
                    debug!("Skipping unreadable file {}: {}", file.path, e);
                    continue;
                }
            };

            if is_config_file(name, ext) {
                self.check_config_file(file, &content, &mut findings);
            }
            if is_dependency_manifest(name, ext) {
                self.check_dependencies(file, &content, &mut findings);
            }
            if SOURCE_EXTENSIONS.contains(&ext) {
                self.check_source(file, &content, &mut findings);
            }
        }

        if let (true, Some(idx)) = (ctx.include_auto_fix, env_finding) {
            if let Some(fix) = self.gitignore_fix(repo_path, &findings[idx]) {
                findings[idx].can_auto_fix = true;
                output.fixes.push(fix);
            }
        }

        let critical = findings
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .count();

        output.recommendations.push(
            AgentRecommendation::new(
                "Security",
                RecommendationPriority::High,
                "Integrate security scanning into CI",
                "Scan dependencies and source on every change so vulnerabilities are caught before release",
            )
            .with_action_items([
                "Enable dependency vulnerability alerts",
                "Add a secret scanner as a pre-commit hook",
                "Run static application security testing in CI",
            ])
            .with_resources(["https://owasp.org/www-project-top-ten/"])
            .with_effort("Medium"),
        );
        output.recommendations.push(
            AgentRecommendation::new(
                "Security",
                RecommendationPriority::Medium,
                "Manage secrets outside the repository",
                "Credentials belong in environment variables or a secret manager, never in version control",
            )
            .with_action_items([
                "Move secrets to a secret manager",
                "Rotate any credential that was ever committed",
            ])
            .with_effort("Medium"),
        );

        output.summary = format!(
            "Scanned {} files. Found {} security issues ({} critical).",
            files.len(),
            findings.len(),
            critical
        );
        output.record("files_scanned", files.len());
        output.findings = findings;
        Ok(output)
    }
}

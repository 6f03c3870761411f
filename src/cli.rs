//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Severity;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

/// agent-tasks - multi-agent repository analysis
///
/// Runs a set of analysis agents (code review, security, documentation)
/// against a repository, applies or previews their fixes, and writes a
/// consolidated Markdown/JSON report. Can also serve the same
/// orchestrator over HTTP.
///
/// Examples:
///   agent-tasks --repo https://github.com/owner/repo.git
///   agent-tasks --local ./my-project --exclude "Documentation Agent" --format json
///   agent-tasks --local ./my-project --auto-fix --dry-run
///   agent-tasks --local . --option "Code Review Agent.max_files=20"
///   agent-tasks --list-agents
///   agent-tasks --serve --bind 0.0.0.0:8080
///   agent-tasks --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Repository URL to analyze
    ///
    /// Supports https://, http://, git@ and file:// URLs.
    #[arg(
        short,
        long,
        value_name = "URL",
        required_unless_present_any = ["init_config", "list_agents", "serve", "local"]
    )]
    pub repo: Option<String>,

    /// Local directory to analyze in place instead of cloning
    #[arg(long, value_name = "DIR", conflicts_with = "repo")]
    pub local: Option<PathBuf>,

    /// Specific branch to analyze
    ///
    /// If not specified, uses the remote's default branch
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Only run these agents (comma-separated names)
    #[arg(long, value_name = "AGENTS", value_delimiter = ',')]
    pub include: Option<Vec<String>>,

    /// Never run these agents (comma-separated names); wins over --include
    #[arg(long, value_name = "AGENTS", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Let agents propose fixes and apply them to the working tree
    #[arg(long)]
    pub auto_fix: bool,

    /// Compute fixes but never write them
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum findings kept per agent
    #[arg(long, value_name = "COUNT")]
    pub max_findings: Option<usize>,

    /// Time budget for the whole execution, in minutes
    #[arg(long, value_name = "MINUTES")]
    pub max_minutes: Option<u64>,

    /// Agent-specific option, repeatable
    ///
    /// Format: AGENT.KEY=VALUE. VALUE is parsed as JSON when possible,
    /// otherwise taken as a string.
    /// Example: --option "Code Review Agent.max_files=20"
    #[arg(long = "option", value_name = "AGENT.KEY=VALUE")]
    pub options: Vec<String>,

    /// Print the registered agents and exit
    #[arg(long)]
    pub list_agents: bool,

    /// Serve the orchestrator over HTTP
    #[arg(long, conflicts_with_all = ["repo", "local", "list_agents"])]
    pub serve: bool,

    /// Address to bind with --serve
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Ollama model used for AI-assisted review
    ///
    /// Can also be set via AGENT_TASKS_MODEL env var or .agent-tasks.toml config.
    #[arg(short, long, env = "AGENT_TASKS_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Per-request timeout for the completion service, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum number of agents running at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Reword the executive summary with the completion service
    #[arg(long, conflicts_with = "no_ai")]
    pub ai_summary: bool,

    /// Disable the completion service; agents use rule-based checks only
    #[arg(long)]
    pub no_ai: bool,

    /// Fail if findings at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .agent-tasks.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Generate a default .agent-tasks.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Severity {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => Severity::Low,
            FailOnLevel::Medium => Severity::Medium,
            FailOnLevel::High => Severity::High,
            FailOnLevel::Critical => Severity::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config || self.list_agents {
            return Ok(());
        }

        if let Some(ref repo) = self.repo {
            let supported = ["https://", "http://", "git@", "file://"];
            if !supported.iter().any(|p| repo.starts_with(p)) {
                return Err(
                    "Repository URL must start with 'https://', 'http://', 'git@' or 'file://'"
                        .to_string(),
                );
            }
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }
        if self.max_findings == Some(0) {
            return Err("Max findings must be at least 1".to_string());
        }
        if self.max_minutes == Some(0) {
            return Err("Max minutes must be at least 1".to_string());
        }
        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref local_path) = self.local {
            if !local_path.exists() {
                return Err(format!(
                    "Local directory does not exist: {}",
                    local_path.display()
                ));
            }
            if !local_path.is_dir() {
                return Err(format!(
                    "Local path is not a directory: {}",
                    local_path.display()
                ));
            }
        }

        self.parsed_options().map(|_| ())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Parse every `--option AGENT.KEY=VALUE` into `(agent, key, value)`.
    ///
    /// The agent name may itself contain dots; the key is the part after
    /// the last dot before `=`.
    pub fn parsed_options(&self) -> Result<Vec<(String, String, Value)>, String> {
        self.options
            .iter()
            .map(|raw| {
                let (target, value) = raw
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid --option '{}': expected AGENT.KEY=VALUE", raw))?;
                let (agent, key) = target
                    .rsplit_once('.')
                    .filter(|(a, k)| !a.trim().is_empty() && !k.trim().is_empty())
                    .ok_or_else(|| format!("Invalid --option '{}': expected AGENT.KEY=VALUE", raw))?;
                let value = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                Ok((agent.trim().to_string(), key.trim().to_string(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            repo: Some("https://github.com/test/repo".to_string()),
            local: None,
            branch: None,
            include: None,
            exclude: None,
            auto_fix: false,
            dry_run: false,
            max_findings: None,
            max_minutes: None,
            options: Vec::new(),
            list_agents: false,
            serve: false,
            bind: None,
            format: OutputFormat::Markdown,
            output: None,
            model: None,
            ollama_url: None,
            timeout: None,
            concurrency: None,
            ai_summary: false,
            no_ai: false,
            fail_on: None,
            config: None,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.repo = Some("invalid-url".to_string());
        assert!(args.validate().is_err());

        args.repo = Some("file:///tmp/repo".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_limits() {
        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.max_minutes = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_parsed_options() {
        let mut args = make_args();
        args.options = vec![
            "Code Review Agent.max_files=20".to_string(),
            "Documentation Agent.ai=false".to_string(),
            "v1.2 Agent.label=hello".to_string(),
        ];

        let parsed = args.parsed_options().unwrap();
        assert_eq!(parsed[0], ("Code Review Agent".into(), "max_files".into(), Value::from(20)));
        assert_eq!(parsed[1].2, Value::Bool(false));
        assert_eq!(parsed[2].0, "v1.2 Agent");
        assert_eq!(parsed[2].2, Value::String("hello".into()));

        args.options = vec!["no-equals".to_string()];
        assert!(args.parsed_options().is_err());
        assert!(args.validate().is_err());

        args.options = vec!["nodot=1".to_string()];
        assert!(args.parsed_options().is_err());
    }

    #[test]
    fn test_fail_on_maps_to_severity() {
        assert_eq!(Severity::from(FailOnLevel::High), Severity::High);
        assert_eq!(Severity::from(FailOnLevel::Critical), Severity::Critical);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "agent-tasks",
            "--local",
            ".",
            "--exclude",
            "Documentation Agent,Security Analysis Agent",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(
            args.exclude.unwrap(),
            vec!["Documentation Agent", "Security Analysis Agent"]
        );
        assert!(args.dry_run);

        assert!(Args::try_parse_from(["agent-tasks"]).is_err());
        assert!(Args::try_parse_from(["agent-tasks", "--list-agents"]).is_ok());
    }
}

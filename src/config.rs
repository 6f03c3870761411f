//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.agent-tasks.toml` files. Command-line flags are merged on top.

use crate::cli::Args;
use crate::llm::OllamaConfig;
use crate::orchestrator::{default_concurrency, OrchestratorSettings};
use crate::scanner::{self, ScanConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory
/// and in the analyzed repository.
pub const CONFIG_FILE_NAME: &str = ".agent-tasks.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Completion service settings.
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Per-agent option tables, keyed by agent name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agents: BTreeMap<String, Value>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "agent_tasks_report.md".to_string()
}

/// Completion service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Use the completion service at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds, independent of the execution budget.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts for transient failures.
    #[serde(default = "default_retries")]
    pub retries: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> usize {
    2
}

/// Defaults for execution requests and the agent pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_findings")]
    pub max_findings_per_agent: usize,

    #[serde(default = "default_max_minutes")]
    pub max_execution_time_minutes: u64,

    #[serde(default = "default_concurrency")]
    pub max_concurrent_agents: usize,

    /// Reword the executive summary with the completion service.
    #[serde(default)]
    pub ai_summary: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_findings_per_agent: default_max_findings(),
            max_execution_time_minutes: default_max_minutes(),
            max_concurrent_agents: default_concurrency(),
            ai_summary: false,
        }
    }
}

fn default_max_findings() -> usize {
    100
}

fn default_max_minutes() -> u64 {
    30
}

/// File scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Maximum files a single agent scans.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Names to exclude.
    #[serde(default = "scanner::default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            excludes: scanner::default_excludes(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_files() -> usize {
    2000
}

fn default_max_file_size() -> u64 {
    1024 * 1024 // 1MB
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory under which `file://` repositories may be analyzed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            local_root: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Try to load configuration from a repo directory.
    pub fn load_from_repo(repo_path: &Path) -> Result<Option<Self>> {
        let config_path = repo_path.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line override the file.
    pub fn merge_with_args(&mut self, args: &Args) -> Result<()> {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if args.no_ai {
            self.model.enabled = false;
        }

        if let Some(max) = args.max_findings {
            self.orchestrator.max_findings_per_agent = max;
        }
        if let Some(minutes) = args.max_minutes {
            self.orchestrator.max_execution_time_minutes = minutes;
        }
        if let Some(concurrency) = args.concurrency {
            self.orchestrator.max_concurrent_agents = concurrency;
        }
        if args.ai_summary {
            self.orchestrator.ai_summary = true;
        }

        if let Some(ref bind) = args.bind {
            self.server.bind = bind.clone();
        }

        for (agent, key, value) in args.parsed_options().map_err(anyhow::Error::msg)? {
            set_agent_option(&mut self.agents, &agent, &key, value);
        }

        Ok(())
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig::from(&self.scanner)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_concurrent_agents: self.orchestrator.max_concurrent_agents.max(1),
            ai_summary: self.orchestrator.ai_summary,
            scan: self.scan_config(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Set `key` in the option table of `agent`, creating the table if needed.
pub fn set_agent_option(options: &mut BTreeMap<String, Value>, agent: &str, key: &str, value: Value) {
    let table = options
        .entry(agent.to_string())
        .or_insert_with(|| Value::Object(Default::default()));
    if !table.is_object() {
        *table = Value::Object(Default::default());
    }
    if let Value::Object(map) = table {
        map.insert(key.to_string(), value);
    }
}

//! agent-tasks - multi-agent repository analysis orchestrator
//!
//! Runs code review, security and documentation agents against a
//! repository, either once from the command line or behind an HTTP API,
//! and produces a consolidated report.
//!
//! Exit codes:
//!   0 - Success (no findings above threshold, or no --fail-on set)
//!   1 - Runtime error (invalid request, config, clone failure, etc.)
//!   2 - Findings found at or above --fail-on threshold

mod agent;
mod analysis;
mod api;
mod cli;
mod config;
mod error;
mod fixes;
mod llm;
mod models;
mod orchestrator;
mod repo;
mod report;
mod scanner;

use agent::AgentRegistry;
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use llm::{AiGateway, OllamaClient};
use models::{AgentStatus, AgentTaskExecutionRequest, Severity};
use orchestrator::AgentTaskOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("agent-tasks v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Execution failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .agent-tasks.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, budgets, scanner excludes and agent options.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Dispatch to the requested mode. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args)?;

    if args.list_agents {
        let registry = AgentRegistry::with_default_agents(None, config.scan_config());
        let orchestrator = AgentTaskOrchestrator::new(registry, config.orchestrator_settings());
        print_agents(&orchestrator);
        return Ok(0);
    }

    if args.serve {
        let orchestrator = build_orchestrator(&config).await;
        println!("🌐 Serving on http://{}", config.server.bind);
        let state = api::AppState::new(orchestrator).with_local_root(config.server.local_root.clone());
        api::run_server(state, &config.server.bind).await?;
        return Ok(0);
    }

    run_analysis(args, config).await
}

/// Probe the completion service and build the agent pool.
async fn build_orchestrator(config: &Config) -> AgentTaskOrchestrator {
    let ai = connect_ai(config).await;
    let registry = AgentRegistry::with_default_agents(ai.clone(), config.scan_config());
    AgentTaskOrchestrator::new(registry, config.orchestrator_settings()).with_ai(ai)
}

/// The completion gateway, or `None` when disabled or unreachable.
async fn connect_ai(config: &Config) -> Option<AiGateway> {
    if !config.model.enabled {
        info!("Completion service disabled; using rule-based analysis only");
        return None;
    }

    let client = match OllamaClient::new(config.ollama_config()) {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to create completion client: {}", e);
            return None;
        }
    };

    let gateway = AiGateway::new(
        Arc::new(client),
        Duration::from_secs(config.model.timeout_seconds),
    )
    .with_retries(config.model.retries);

    if gateway.is_available().await {
        info!(
            "Using {} model {} at {}",
            gateway.backend_name(),
            config.model.name,
            config.model.ollama_url
        );
        Some(gateway)
    } else {
        warn!(
            "Completion service at {} is not reachable; continuing with rule-based analysis",
            config.model.ollama_url
        );
        None
    }
}

fn print_agents(orchestrator: &AgentTaskOrchestrator) {
    let response = orchestrator.available_agents_response();
    println!("🤖 Available agents ({}):\n", response.total_agents);
    for agent in &response.agents {
        println!(
            "   [{}] {} (~{} min)",
            agent.priority,
            agent.name,
            agent.estimated_execution_time_seconds / 60
        );
        println!("       {}", agent.description);
    }
    println!(
        "\n   Estimated total: {} min",
        response.estimated_total_time_seconds / 60
    );
}

/// Run one analysis from the command line. Returns exit code (0 or 2).
async fn run_analysis(args: Args, mut config: Config) -> Result<i32> {
    // Step 1: Get the repository
    let (repo_url, clone) = if let Some(ref local) = args.local {
        println!("📂 Using local directory: {}", local.display());
        let clone = repo::open_local_repository(local)?;
        (format!("file://{}", clone.path.display()), clone)
    } else {
        let url = args.repo.clone().unwrap_or_default();
        println!("📥 Cloning repository: {}", url);
        let clone = repo::prepare_repository(&url, args.branch.as_deref(), !args.quiet)?;
        (url, clone)
    };
    info!("Repository at: {}", clone.path.display());

    // Try to load config from repository
    match Config::load_from_repo(&clone.path) {
        Ok(Some(repo_config)) => {
            info!("Found {} in repository", CONFIG_FILE_NAME);
            config = repo_config;
            config.merge_with_args(&args)?;
        }
        Ok(None) => {}
        Err(e) => warn!("Ignoring repository config: {:#}", e),
    }

    if args.auto_fix && !args.dry_run && clone.is_temporary() {
        warn!("Fixes are applied to a temporary clone and discarded afterwards; use --local to keep them");
    }

    // Step 2: Build the orchestrator
    let orchestrator = build_orchestrator(&config).await;

    let request = AgentTaskExecutionRequest {
        repository_url: repo_url.clone(),
        branch: args
            .branch
            .clone()
            .or_else(|| clone.branch.clone())
            .unwrap_or_else(|| "main".to_string()),
        included_agents: args.include.clone().unwrap_or_default(),
        excluded_agents: args.exclude.clone().unwrap_or_default(),
        include_auto_fix: args.auto_fix,
        dry_run: args.dry_run,
        max_findings_per_agent: config.orchestrator.max_findings_per_agent,
        max_execution_time_minutes: config.orchestrator.max_execution_time_minutes,
        agent_specific_options: config.agents.clone(),
    };

    for names in [&request.included_agents, &request.excluded_agents] {
        if let Err(e) = orchestrator.check_known(names) {
            anyhow::bail!(
                "{} (available: {})",
                e,
                orchestrator.registry().names().join(", ")
            );
        }
    }

    let estimate = orchestrator.estimate_total_execution_time(&request.included_agents);
    println!("\n🔬 Running agents...");
    println!(
        "   Budget: {} min | Concurrency: {} | Estimated: {} min",
        request.max_execution_time_minutes,
        config.orchestrator.max_concurrent_agents,
        estimate.as_secs() / 60
    );
    if let Some(ref commit) = clone.commit {
        println!("   Commit: {}", commit);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running agents");
            ctrl_c.cancel();
        }
    });

    // Step 3: Run
    let response = orchestrator
        .execute(&request, &clone.path, &cancel)
        .await?;

    // Step 4: Generate and save the report
    println!("\n📝 Generating report...");
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&response)?,
        OutputFormat::Markdown => report::generate_markdown_report(&response),
    };

    let output_path = PathBuf::from(&config.general.output);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Print summary
    println!("\n📊 Analysis Summary ({}):", response.status);
    for result in &response.agent_results {
        let icon = match result.status {
            AgentStatus::Success => "✅",
            AgentStatus::Failed => "❌",
            AgentStatus::Skipped => "⏭️",
        };
        println!(
            "   {} {}: {} findings ({:.1}s)",
            icon,
            result.agent_name,
            result.findings.len(),
            result.execution_time_ms as f64 / 1000.0
        );
    }
    if let Some(ref report) = response.consolidated_report {
        println!("   Total findings: {}", report.total_findings);
        println!(
            "   - 🔴 Critical: {} | 🟠 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
            report.critical_findings, report.high_findings, report.medium_findings, report.low_findings
        );
        if report.total_fixes > 0 {
            println!(
                "   Fixes: {} proposed, {} applied",
                report.total_fixes, report.applied_fixes
            );
        }
    }
    println!(
        "   Duration: {:.1}s",
        response.total_execution_time_ms as f64 / 1000.0
    );
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        let threshold = Severity::from(fail_level);
        if response.max_severity().is_some_and(|max| max >= threshold) {
            eprintln!(
                "\n⛔ Findings at or above {:?} severity. Failing (exit code 2).",
                fail_level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

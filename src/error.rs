//! Error types for each layer.
//!
//! Library code returns these typed errors; `main` and repository
//! preparation use `anyhow` with context on top.

use thiserror::Error;

/// A request rejected before any agent runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("repositoryUrl is required")]
    MissingRepositoryUrl,

    #[error("repositoryUrl must be at most {0} characters")]
    RepositoryUrlTooLong(usize),

    #[error("repositoryUrl must start with https://, http://, git@ or file:// (got '{0}')")]
    InvalidRepositoryUrl(String),

    #[error("branch must be at most {0} characters")]
    BranchTooLong(usize),

    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),

    #[error("maxExecutionTimeMinutes must be at most {0}")]
    BudgetTooLarge(u64),

    #[error("at least one agent name is required")]
    NoAgentsSpecified,
}

/// Failure talking to the text completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Completion request cancelled")]
    Cancelled,

    #[error("Cannot connect to completion service at {0}")]
    Connect(String),

    #[error("Completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to send completion request: {0}")]
    Request(String),

    #[error("Failed to decode completion response: {0}")]
    Decode(String),
}

/// Failure inside a single agent. Never escapes the agent boundary.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Analysis(String),
}

/// A proposed fix that could not be written.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("fix path '{0}' escapes the repository")]
    OutsideRepository(String),

    #[error("{0} changed since the fix was proposed")]
    Stale(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the orchestrator itself.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Unknown agent(s): {}", .0.join(", "))]
    UnknownAgents(Vec<String>),
}

//! Text completion service used by agents for AI-assisted review.
//!
//! Agents never talk to a vendor API directly. They go through an
//! [`AiGateway`], which bounds every call with a timeout, retries
//! transient failures and stops as soon as the run is cancelled.

mod ollama;

pub use ollama::{OllamaClient, OllamaConfig};

use crate::error::CompletionError;
use crate::models::{AgentFinding, Severity};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A backend that turns a prompt into text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Shared handle agents use to reach the completion service.
#[derive(Clone)]
pub struct AiGateway {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
    retries: usize,
}

impl AiGateway {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            retries: 0,
        }
    }

    /// Retry transient failures up to `retries` extra times.
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.client.name()
    }

    pub async fn is_available(&self) -> bool {
        self.client.is_available().await
    }

    /// Complete `prompt`, giving up on timeout or cancellation.
    ///
    /// The timeout covers all attempts together.
    pub async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        let attempts = async {
            let mut attempt = 0;
            loop {
                match self.client.complete(prompt).await {
                    Ok(text) => return Ok(text),
                    Err(e) if attempt < self.retries && is_transient(&e) => {
                        attempt += 1;
                        warn!(
                            "Completion attempt {} via {} failed: {}",
                            attempt,
                            self.client.name(),
                            e
                        );
                        tokio::time::sleep(Duration::from_millis(250 * attempt as u64)).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            res = tokio::time::timeout(self.timeout, attempts) => match res {
                Ok(inner) => inner,
                Err(_) => Err(CompletionError::Timeout(self.timeout.as_secs())),
            },
        }
    }
}

fn is_transient(err: &CompletionError) -> bool {
    match err {
        CompletionError::Connect(_) | CompletionError::Request(_) => true,
        CompletionError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Parse findings from a JSON-lines completion response.
///
/// Lines that are not JSON objects are ignored, so chatty models still
/// yield whatever structured output they produced. `default_file` fills
/// in the path when the model omits it.
pub fn parse_findings(response: &str, default_file: Option<&str>, rule: &str) -> Vec<AgentFinding> {
    let mut findings = Vec::new();

    for line in response.lines() {
        let line = line.trim().trim_end_matches(',');
        if line.is_empty() || !line.starts_with('{') {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(json) => {
                if let Some(finding) = json_to_finding(&json, default_file, rule) {
                    findings.push(finding);
                }
            }
            Err(e) => debug!("Skipping malformed completion line: {}", e),
        }
    }

    findings
}

fn json_to_finding(json: &Value, default_file: Option<&str>, rule: &str) -> Option<AgentFinding> {
    let title = json["title"].as_str()?;
    let severity = Severity::from_label(json["severity"].as_str().unwrap_or("medium"));
    let category = json["category"].as_str().unwrap_or("AI Review");
    let description = json["description"].as_str().unwrap_or("");

    let mut finding = AgentFinding::new(category, severity, title, description).with_rule(rule);

    if let Some(path) = json["file_path"].as_str().or(default_file) {
        finding = finding.in_file(path);
    }
    if let Some(line) = json["line_number"].as_u64().filter(|l| *l > 0) {
        finding = finding.at_line(line as usize);
    }
    if let Some(suggestion) = json["suggestion"].as_str().filter(|s| !s.is_empty()) {
        finding = finding.with_suggested_fix(suggestion);
    }

    Some(finding)
}


#[cfg(test)]
mod tests {
    use super::testing::StubClient;
    use super::*;

    #[tokio::test]
    async fn test_gateway_returns_completion() {
        let gateway = StubClient::replying("hello").gateway();
        let text = gateway
            .complete("prompt", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_gateway_times_out() {
        let stub = StubClient {
            delay: Duration::from_secs(10),
            ..StubClient::replying("late")
        };
        let gateway = AiGateway::new(Arc::new(stub), Duration::from_millis(50));
        let err = gateway
            .complete("prompt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_gateway_stops_on_cancel() {
        let stub = StubClient {
            delay: Duration::from_secs(10),
            ..StubClient::replying("late")
        };
        let gateway = AiGateway::new(Arc::new(stub), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gateway.complete("prompt", &cancel).await.unwrap_err();
        assert!(matches!(err, CompletionError::Cancelled));
    }

    #[tokio::test]
    async fn test_gateway_retries_transient_errors() {
        let stub = Arc::new(StubClient {
            failures_before_success: 2,
            ..StubClient::replying("ok")
        });
        let gateway = AiGateway::new(stub.clone(), Duration::from_secs(5)).with_retries(2);
        let text = gateway
            .complete("prompt", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "ok");
        assert_eq!(stub.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gateway_does_not_retry_client_errors() {
        let stub = Arc::new(StubClient::failing("bad request"));
        let gateway = AiGateway::new(stub.clone(), Duration::from_secs(5)).with_retries(3);
        let err = gateway
            .complete("prompt", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 400, .. }));
        assert_eq!(stub.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_findings_json_lines() {
        let response = r#"Here is what I found:
{"file_path": "src/db.rs", "line_number": 42, "severity": "high", "category": "Security", "title": "SQL built by concatenation", "description": "User input reaches the query", "suggestion": "Use bound parameters"}
not json
{"severity": "low", "title": "Naming", "line_number": 0}
{"description": "missing title"}
"#;
        let findings = parse_findings(response, Some("src/lib.rs"), "AI_001");
        assert_eq!(findings.len(), 2);

        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].finding_type, "Security");
        assert_eq!(findings[0].file_path.as_deref(), Some("src/db.rs"));
        assert_eq!(findings[0].line_number, Some(42));
        assert_eq!(findings[0].rule.as_deref(), Some("AI_001"));
        assert!(findings[0].suggested_fix.is_some());

        assert_eq!(findings[1].file_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(findings[1].line_number, None);
        assert_eq!(findings[1].finding_type, "AI Review");
    }
}

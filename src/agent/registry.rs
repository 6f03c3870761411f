//! Name-indexed collection of agents, iterated in priority order.

use super::{Agent, CodeReviewAgent, DocumentationAgent, SecurityAnalysisAgent};
use crate::llm::AiGateway;
use crate::scanner::ScanConfig;
use std::sync::Arc;
use tracing::warn;

#[derive(Default, Clone)]
pub struct AgentRegistry {
    // Kept sorted by priority; ties keep registration order.
    agents: Vec<Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in code review, security and documentation agents.
    pub fn with_default_agents(ai: Option<AiGateway>, scan: ScanConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CodeReviewAgent::new(ai.clone(), scan.clone())));
        registry.register(Arc::new(SecurityAnalysisAgent::new(scan.clone())));
        registry.register(Arc::new(DocumentationAgent::new(ai, scan)));
        registry
    }

    /// Add an agent. A later agent with the same name replaces the earlier one.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        if let Some(pos) = self.agents.iter().position(|a| a.name() == agent.name()) {
            warn!("Replacing already registered agent '{}'", agent.name());
            self.agents.remove(pos);
        }
        self.agents.push(agent);
        self.agents.sort_by_key(|a| a.priority());
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Agent>> {
        self.agents.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

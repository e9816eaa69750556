//! Agent registry
//!
//! Maps an agent's logical name to its invocation handler plus a
//! descriptive card, so the coordinator can call agents without static
//! coupling. Acts as the service-discovery layer for the pipeline.

use crate::models::AgentCard;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// An agent invocation handler: accepts the agent's declared input
/// fields as a JSON object and returns its raw textual output.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    async fn invoke(&self, input: Value) -> crate::Result<String>;
}

/// Central registry of agents and their cards. No removal operation;
/// registry lifetime equals pipeline lifetime.
pub struct AgentRegistry {
    handlers: HashMap<String, Arc<dyn AgentHandler>>,
    cards: HashMap<String, AgentCard>,
    order: Vec<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            cards: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register an agent with its card. Last write wins; re-registering
    /// a name keeps its original position in the listing order.
    pub fn register(&mut self, card: AgentCard, handler: Arc<dyn AgentHandler>) {
        let name = card.name.clone();

        info!(
            "[Registry] Registered agent: {} ({})",
            card.display_name, name
        );
        debug!(role = %card.role, capabilities = ?card.capabilities);

        if !self.cards.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.cards.insert(name.clone(), card);
        self.handlers.insert(name, handler);
    }

    pub fn get_handler(&self, name: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn get_card(&self, name: &str) -> Option<&AgentCard> {
        self.cards.get(name)
    }

    /// All registered cards, in registration order.
    pub fn list_agents(&self) -> Vec<AgentCard> {
        self.order
            .iter()
            .filter_map(|name| self.cards.get(name).cloned())
            .collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Multi-Agent Sales Assistant Orchestrator
//!
//! A customer-service pipeline backed by LLM agents:
//! - Analyzes the customer query and classifies intent
//! - Conditionally checks inventory and places orders via remote tools
//! - Synthesizes a natural-language reply in Vietnamese
//! - Recovers locally from malformed model output at every stage
//!
//! PIPELINE:
//! Analysis → Inventory(optional) → Order(optional) → Consultant

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use pipeline::Coordinator;

//! Error types for the sales agent orchestrator

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent invocation error: {0}")]
    AgentError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Invalid agent input: {0}")]
    InvalidInput(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable name used for per-error-type metrics tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::AgentNotFound(_) => "AgentNotFound",
            PipelineError::AgentError(_) => "AgentError",
            PipelineError::ToolError(_) => "ToolError",
            PipelineError::InvalidInput(_) => "InvalidInput",
            PipelineError::ExtractionError(_) => "ExtractionError",
            PipelineError::LlmError(_) => "LlmError",
            PipelineError::SessionError(_) => "SessionError",
            PipelineError::ConfigError(_) => "ConfigError",
            PipelineError::Unknown(_) => "Unknown",
            PipelineError::SerializationError(_) => "SerializationError",
            PipelineError::HttpError(_) => "HttpError",
            PipelineError::IoError(_) => "IoError",
        }
    }
}

//! Environment-driven configuration
//!
//! Binaries call `dotenv::dotenv().ok()` before building these.

use std::env;
use std::time::Duration;

const DEFAULT_MODEL: &str = "Qwen/Qwen3-8B";
const DEFAULT_TOOL_SERVICE_URL: &str = "http://localhost:8000";

/// Settings for the OpenAI-compatible completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8001/v1".to_string()),
            api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }
}

/// Settings for the remote tool-execution service.
#[derive(Debug, Clone)]
pub struct ToolServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ToolServiceConfig {
    pub fn from_env() -> Self {
        let timeout_secs = env::var("TOOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(15);

        let max_retries = env::var("TOOL_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3);

        Self {
            base_url: env::var("TOOL_SERVICE_URL")
                .unwrap_or_else(|_| DEFAULT_TOOL_SERVICE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
        }
    }
}

impl Default for ToolServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TOOL_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(15),
            max_retries: 3,
        }
    }
}

/// API server port, `PORT` then `API_PORT`, defaulting to 2206.
pub fn server_port() -> u16 {
    env::var("PORT")
        .or_else(|_| env::var("API_PORT"))
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(2206)
}

//! Remote tool clients (inventory lookup, order creation)
//!
//! One network round-trip per attempt to the external tool-execution
//! service. Transient failures are masked from callers: every operation
//! returns text, with an error payload only after the retry budget is
//! exhausted.

use crate::config::ToolServiceConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Tool names on the remote service side.
const REMOTE_GET_PRODUCT_INFO: &str = "get_product_info";
const REMOTE_CREATE_ORDER: &str = "create_order";

/// One attempt against the tool-execution service.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Invoke a named tool with a JSON arguments object and return the
    /// first text payload of the response.
    async fn call_tool(&self, name: &str, arguments: &Value) -> crate::Result<String>;
}

/// HTTP transport against the fixed local tool-service endpoint.
pub struct HttpToolTransport {
    client: Client,
    base_url: String,
}

impl HttpToolTransport {
    pub fn new(config: &ToolServiceConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(PipelineError::HttpError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ToolTransport for HttpToolTransport {
    async fn call_tool(&self, name: &str, arguments: &Value) -> crate::Result<String> {
        let url = format!("{}/tools/call", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "name": name,
                "arguments": arguments,
            }))
            .send()
            .await
            .map_err(|e| {
                PipelineError::ToolError(format!("Tool service request failed for {}: {}", name, e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            PipelineError::ToolError(format!("Failed to read tool response: {}", e))
        })?;

        if !status.is_success() {
            return Err(PipelineError::ToolError(format!(
                "Tool service returned {} for {}: {}",
                status, name, body
            )));
        }

        Ok(first_text_payload(&body))
    }
}

/// The service responds with MCP-style content parts. Take the first
/// text part; anything else is passed through as the raw body.
fn first_text_payload(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(parts) = value.get("content").and_then(Value::as_array) {
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    return text.to_string();
                }
            }
        }
    }

    body.to_string()
}

/// Loose success heuristic over tool result text: the backend's phrasing
/// varies, so a case-insensitive "success" substring is the contract.
pub fn result_indicates_success(text: &str) -> bool {
    text.to_lowercase().contains("success")
}

/// Retry wrapper over a transport, exposing the two pipeline tools.
pub struct ToolService {
    transport: Arc<dyn ToolTransport>,
    timeout: Duration,
    max_retries: u32,
}

impl ToolService {
    pub fn new(transport: Arc<dyn ToolTransport>, config: &ToolServiceConfig) -> Self {
        Self {
            transport,
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    pub fn from_env() -> crate::Result<Self> {
        let config = ToolServiceConfig::from_env();
        let transport = Arc::new(HttpToolTransport::new(&config)?);
        Ok(Self::new(transport, &config))
    }

    /// Up to `max_retries` attempts, each with a fresh round-trip and a
    /// bounded timeout. Exponential backoff (1s, 2s, ...) runs only
    /// between attempts, never after the last one. Timeouts, connection
    /// failures and other errors are handled uniformly: log and retry.
    async fn call_with_retry(&self, name: &str, arguments: Value) -> Result<String, String> {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            debug!(
                tool = name,
                attempt = attempt + 1,
                max = self.max_retries,
                "Calling remote tool"
            );

            match timeout(self.timeout, self.transport.call_tool(name, &arguments)).await {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    info!(
                        tool = name,
                        attempt = attempt + 1,
                        "Remote tool call succeeded"
                    );
                    return Ok(text);
                }
                Ok(Ok(_)) => {
                    last_error = "Empty response from server".to_string();
                    warn!(
                        tool = name,
                        attempt = attempt + 1,
                        "Empty response from tool service"
                    );
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(
                        tool = name,
                        attempt = attempt + 1,
                        error = %last_error,
                        "Remote tool call failed"
                    );
                }
                Err(_) => {
                    last_error = format!("Timeout after {}s", self.timeout.as_secs());
                    warn!(
                        tool = name,
                        attempt = attempt + 1,
                        "Remote tool call timed out"
                    );
                }
            }

            if attempt + 1 < self.max_retries {
                let wait = Duration::from_secs(1u64 << attempt);
                debug!(tool = name, "Waiting {:?} before retry", wait);
                sleep(wait).await;
            }
        }

        Err(last_error)
    }

    /// Check product inventory and pricing details.
    ///
    /// Empty storage/color are omitted from the remote call. Exhaustion
    /// returns a JSON error payload rather than an error.
    pub async fn check_inventory_detail(
        &self,
        product: &str,
        storage: &str,
        color: &str,
    ) -> String {
        let mut arguments = json!({ "product": product });
        if !storage.trim().is_empty() {
            arguments["storage"] = json!(storage);
        }
        if !color.trim().is_empty() {
            arguments["color"] = json!(color);
        }

        match self.call_with_retry(REMOTE_GET_PRODUCT_INFO, arguments).await {
            Ok(text) => text,
            Err(last_error) => {
                let message = format!(
                    "Failed to get product info after {} attempts. Last error: {}",
                    self.max_retries, last_error
                );
                error!("{}", message);
                json!({ "status": "error", "message": message }).to_string()
            }
        }
    }

    /// Create a customer order.
    ///
    /// Exhaustion returns an `Error: ...` string; callers treat that
    /// marker as the failure signal rather than relying on an Err.
    pub async fn create_customer_order(&self, order_details: &Value) -> String {
        let arguments = json!({ "order_details": order_details });

        match self.call_with_retry(REMOTE_CREATE_ORDER, arguments).await {
            Ok(text) => {
                if result_indicates_success(&text) {
                    info!("Order creation reported success");
                } else if text.to_lowercase().contains("error") {
                    error!("Order creation returned error: {}", text);
                }
                text
            }
            Err(last_error) => {
                let message = format!(
                    "Error: Failed to create order after {} attempts. Last error: {}",
                    self.max_retries, last_error
                );
                error!("{}", message);
                message
            }
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedResponse, ScriptedTransport};
    use super::*;
    use tokio::time::Instant;

    fn service(script: Vec<ScriptedResponse>) -> (ToolService, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let config = ToolServiceConfig::default();
        (ToolService::new(transport.clone(), &config), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_two_timeouts() {
        let (service, transport) = service(vec![
            ScriptedResponse::Hang,
            ScriptedResponse::Hang,
            ScriptedResponse::Ok(r#"{"status": "success", "products": []}"#.to_string()),
        ]);

        let started = Instant::now();
        let result = service.check_inventory_detail("iPhone 15 Pro Max", "", "").await;
        let elapsed = started.elapsed();

        assert!(result.contains("success"));
        assert_eq!(transport.call_count(), 3);
        // Two 15s timeouts plus backoff of 1s + 2s between attempts.
        assert_eq!(elapsed.as_secs(), 15 + 1 + 15 + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_error_text_not_err() {
        let (service, transport) = service(vec![
            ScriptedResponse::Fail("connection refused".to_string()),
            ScriptedResponse::Fail("connection refused".to_string()),
            ScriptedResponse::Fail("connection reset by peer".to_string()),
        ]);

        let started = Instant::now();
        let result = service
            .create_customer_order(&json!({ "product": "iPhone 15" }))
            .await;
        let elapsed = started.elapsed();

        assert!(result.starts_with("Error:"));
        assert!(result.contains("connection reset by peer"));
        assert_eq!(transport.call_count(), 3);
        // Backoff between attempts only, none after the final one.
        assert_eq!(elapsed.as_secs(), 1 + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inventory_exhaustion_returns_json_error_payload() {
        let (service, _) = service(vec![
            ScriptedResponse::Fail("dns failure".to_string()),
            ScriptedResponse::Fail("dns failure".to_string()),
            ScriptedResponse::Fail("dns failure".to_string()),
        ]);

        let result = service.check_inventory_detail("iPad", "64GB", "Xám").await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["status"], "error");
        assert!(parsed["message"].as_str().unwrap().contains("dns failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_is_retried() {
        let (service, transport) = service(vec![
            ScriptedResponse::Ok("   ".to_string()),
            ScriptedResponse::Ok(r#"{"status": "success"}"#.to_string()),
        ]);

        let result = service.check_inventory_detail("iPhone 15", "", "").await;
        assert!(result.contains("success"));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_variant_fields_are_omitted() {
        let (service, transport) = service(vec![ScriptedResponse::Ok(
            r#"{"status": "success"}"#.to_string(),
        )]);

        service.check_inventory_detail("iPhone 15", "  ", "").await;

        let (name, arguments) = transport.calls().remove(0);
        assert_eq!(name, "get_product_info");
        assert!(arguments.get("storage").is_none());
        assert!(arguments.get("color").is_none());
    }

    #[test]
    fn test_first_text_payload_unwraps_content_parts() {
        let body = r#"{"content": [{"type": "text", "text": "Order saved successfully"}]}"#;
        assert_eq!(first_text_payload(body), "Order saved successfully");

        assert_eq!(first_text_payload("plain text"), "plain text");
    }

    #[test]
    fn test_success_heuristic_is_case_insensitive() {
        assert!(result_indicates_success("Order data Successfully saved"));
        assert!(!result_indicates_success("Error: out of stock"));
    }
}

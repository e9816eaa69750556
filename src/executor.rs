//! Tool executor for the ReAct pattern
//!
//! Agents in ReAct mode declare tool invocations in a fixed textual
//! protocol instead of native function calling:
//!
//! ```text
//! TOOL_CALL: tool_name
//! ARGS: {"arg1": "value1"}
//! ```
//!
//! The executor detects the protocol in raw agent output, validates the
//! call against the closed set of pipeline tools, executes it, and
//! converts every failure into a structured `{"error": ...}` string
//! rather than propagating.

use crate::extract;
use crate::tools::ToolService;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

lazy_static! {
    static ref TOOL_CALL_RE: Regex = Regex::new(r"(?i)TOOL_CALL:\s*(\w+)").unwrap();
    static ref ARGS_RE: Regex = Regex::new(r"(?is)ARGS:\s*(\{.*)").unwrap();
}

/// The closed set of operations agents may invoke by name.
#[derive(Debug, Clone)]
pub enum ToolCall {
    CheckInventoryDetail {
        product: String,
        storage: String,
        color: String,
    },
    CreateCustomerOrder {
        order_details: Value,
    },
}

pub const AVAILABLE_TOOLS: [&str; 2] = ["check_inventory_detail", "create_customer_order"];

/// Why a parsed (name, args) pair was rejected.
enum ToolCallRejection {
    UnknownTool(String),
    ArgumentError(String),
}

impl ToolCall {
    /// Validate a tool name and argument object against the closed set.
    fn from_parts(name: &str, args: &Map<String, Value>) -> Result<Self, ToolCallRejection> {
        match name {
            "check_inventory_detail" => {
                for key in args.keys() {
                    if !matches!(key.as_str(), "product" | "storage" | "color") {
                        return Err(ToolCallRejection::ArgumentError(format!(
                            "unexpected argument '{}'",
                            key
                        )));
                    }
                }

                let product = match args.get("product") {
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => {
                        return Err(ToolCallRejection::ArgumentError(
                            "'product' must be a string".to_string(),
                        ))
                    }
                    None => {
                        return Err(ToolCallRejection::ArgumentError(
                            "missing required argument 'product'".to_string(),
                        ))
                    }
                };

                Ok(ToolCall::CheckInventoryDetail {
                    product,
                    storage: string_arg(args, "storage"),
                    color: string_arg(args, "color"),
                })
            }
            "create_customer_order" => {
                for key in args.keys() {
                    if key != "order_details" {
                        return Err(ToolCallRejection::ArgumentError(format!(
                            "unexpected argument '{}'",
                            key
                        )));
                    }
                }

                let order_details = args.get("order_details").cloned().ok_or_else(|| {
                    ToolCallRejection::ArgumentError(
                        "missing required argument 'order_details'".to_string(),
                    )
                })?;

                Ok(ToolCall::CreateCustomerOrder { order_details })
            }
            other => Err(ToolCallRejection::UnknownTool(other.to_string())),
        }
    }
}

fn string_arg(args: &Map<String, Value>, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A detected tool invocation, before validation.
#[derive(Debug, Clone)]
pub struct ParsedToolCall {
    pub tool_name: String,
    pub args: Map<String, Value>,
}

/// Result record for one pass over agent output. `tool_called=false`
/// means no protocol marker was detected; a failed execution still has
/// `tool_called=true` with the error text in `tool_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub tool_called: bool,
    pub tool_name: Option<String>,
    pub tool_result: Option<String>,
    pub original_output: String,
}

/// Parses agent output and executes declared tool calls.
pub struct ToolExecutor {
    service: Arc<ToolService>,
}

impl ToolExecutor {
    pub fn new(service: Arc<ToolService>) -> Self {
        Self { service }
    }

    /// Detect the `TOOL_CALL:`/`ARGS:` protocol in agent output.
    ///
    /// The argument boundary uses the balanced-brace scan from the
    /// extractor, not a greedy regex: argument values may themselves
    /// contain braces.
    pub fn parse_tool_call(&self, agent_output: &str) -> Option<ParsedToolCall> {
        let tool_name = match TOOL_CALL_RE.captures(agent_output) {
            Some(captures) => captures[1].trim().to_string(),
            None => {
                debug!("No TOOL_CALL found in agent output");
                return None;
            }
        };

        let args_section = match ARGS_RE.captures(agent_output) {
            Some(captures) => captures[1].to_string(),
            None => {
                error!("Found TOOL_CALL but no ARGS for {}", tool_name);
                return None;
            }
        };

        match extract::extract_json_object(&args_section) {
            Some(args) => {
                info!(
                    tool = %tool_name,
                    arg_keys = ?args.keys().collect::<Vec<_>>(),
                    "Parsed tool call"
                );
                Some(ParsedToolCall { tool_name, args })
            }
            None => {
                error!("Could not extract valid JSON from ARGS section");
                None
            }
        }
    }

    /// Execute a parsed tool call, converting unknown tools and argument
    /// mismatches into structured error strings.
    pub async fn execute_tool(&self, call: &ParsedToolCall) -> String {
        let validated = match ToolCall::from_parts(&call.tool_name, &call.args) {
            Ok(validated) => validated,
            Err(ToolCallRejection::UnknownTool(name)) => {
                let message = format!(
                    "Tool '{}' not found. Available tools: {:?}",
                    name, AVAILABLE_TOOLS
                );
                error!("{}", message);
                return json!({ "error": message }).to_string();
            }
            Err(ToolCallRejection::ArgumentError(detail)) => {
                let message = format!("Tool '{}' argument error: {}", call.tool_name, detail);
                error!("{}", message);
                return json!({ "error": message }).to_string();
            }
        };

        info!(tool = %call.tool_name, "Executing tool");

        match validated {
            ToolCall::CheckInventoryDetail {
                product,
                storage,
                color,
            } => {
                self.service
                    .check_inventory_detail(&product, &storage, &color)
                    .await
            }
            ToolCall::CreateCustomerOrder { order_details } => {
                self.service.create_customer_order(&order_details).await
            }
        }
    }

    /// Process agent output: detect a tool call, execute it if found,
    /// and report both in one record so the caller can distinguish
    /// "no tool call" from "tool call failed".
    pub async fn process_agent_output(&self, agent_output: &str) -> ToolCallOutcome {
        let mut outcome = ToolCallOutcome {
            tool_called: false,
            tool_name: None,
            tool_result: None,
            original_output: agent_output.to_string(),
        };

        if let Some(call) = self.parse_tool_call(agent_output) {
            outcome.tool_called = true;
            outcome.tool_name = Some(call.tool_name.clone());
            outcome.tool_result = Some(self.execute_tool(&call).await);
        }

        outcome
    }
}

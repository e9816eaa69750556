//! Pipeline coordinator
//!
//! The orchestration state machine:
//!
//! Start → Analyzing → (InventoryCheck) → (OrderPlacement) → Consulting → Done
//!
//! Stages run strictly in this order, never reordered or parallelized:
//! each later stage's prompt embeds the textual output of every earlier
//! stage it depends on. InventoryCheck and OrderPlacement are skipped
//! when the analysis says they are not required. Malformed agent output
//! is recovered per stage; a stage invocation that returns an error is
//! terminal (`Failed`) and short-circuits the remaining stages.

use crate::agents::{ANALYSIS_AGENT, CONSULTANT_AGENT, INVENTORY_AGENT, ORDER_AGENT};
use crate::extract;
use crate::metrics::record_request_metric;
use crate::models::{
    AgentOutput, AnalysisResult, CustomerIntent, PipelineResult, PipelineStatus, QueryContext,
};
use crate::registry::AgentRegistry;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const FALLBACK_RESPONSE: &str = "Xin lỗi, tôi không thể xử lý yêu cầu của bạn lúc này.";
const INVENTORY_NOT_CHECKED: &str = "Không kiểm tra";
const ORDER_NOT_CREATED: &str = "Chưa tạo đơn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Start,
    Analyzing,
    InventoryCheck,
    OrderPlacement,
    Consulting,
    Done,
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!(from = ?state, to = ?next, "Pipeline state");
    *state = next;
}

/// Sequences the agents and assembles the final result envelope.
pub struct Coordinator {
    registry: AgentRegistry,
}

impl Coordinator {
    pub fn new(registry: AgentRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Run the four-stage pipeline for one customer query.
    ///
    /// Never returns an error: a failure inside any stage produces a
    /// `status=error` result with the Vietnamese apology text and the
    /// error description for operators.
    pub async fn run(
        &self,
        query: &str,
        initial_context_data: Option<Value>,
        user_id: Option<String>,
        session_id: Option<String>,
    ) -> PipelineResult {
        let started = Instant::now();
        let context = QueryContext::new(
            query.to_string(),
            initial_context_data,
            user_id,
            session_id,
        );

        info!(
            session_id = %context.session_id,
            query = %truncate(&context.query, 100),
            "Starting pipeline run"
        );

        match self.run_stages(&context).await {
            Ok((result, intent)) => {
                record_request_metric(true, started.elapsed(), Some(intent.as_str()), None);
                info!(session_id = %context.session_id, "Pipeline completed successfully");
                result
            }
            Err(e) => {
                error!(session_id = %context.session_id, error = %e, "Pipeline run failed");
                record_request_metric(false, started.elapsed(), None, Some(e.kind()));
                PipelineResult {
                    customer_response: format!(
                        "Xin lỗi, đã xảy ra lỗi khi xử lý yêu cầu của bạn: {}",
                        e
                    ),
                    agent_outputs: Vec::new(),
                    session_id: context.session_id.clone(),
                    status: PipelineStatus::Error,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run_stages(
        &self,
        context: &QueryContext,
    ) -> crate::Result<(PipelineResult, CustomerIntent)> {
        let mut state = PipelineState::Start;
        let mut agent_outputs: Vec<AgentOutput> = Vec::new();

        // === Analyzing ===
        transition(&mut state, PipelineState::Analyzing);

        let analysis_prompt = match &context.customer {
            Some(customer) => format!(
                "Context: {}\nCâu hỏi khách hàng: {}",
                serde_json::to_string(customer)?,
                context.query
            ),
            None => context.query.clone(),
        };

        let analysis_raw = self
            .invoke_agent(ANALYSIS_AGENT, json!({ "query": analysis_prompt }))
            .await?;
        agent_outputs.push(AgentOutput {
            agent: ANALYSIS_AGENT.to_string(),
            output: analysis_raw.clone(),
        });
        debug!("Analysis output: {}", analysis_raw);

        let (analysis, analysis_fallback) = extract::parse_or_default::<AnalysisResult, _>(
            &analysis_raw,
            || AnalysisResult::fallback_for(&context.query),
        );
        if analysis_fallback {
            warn!("Analysis output could not be parsed, degrading to general-query path");
        }
        let analysis_json = serde_json::to_string(&analysis)?;

        let product_query = if analysis.product_details.trim().is_empty() {
            context.query.clone()
        } else {
            analysis.product_details.clone()
        };

        // === InventoryCheck (optional) ===
        let mut inventory_raw = String::new();
        if analysis.requires_inventory_check {
            transition(&mut state, PipelineState::InventoryCheck);

            inventory_raw = self
                .invoke_agent(
                    INVENTORY_AGENT,
                    json!({ "query": product_query, "context": analysis_json }),
                )
                .await?;
            agent_outputs.push(AgentOutput {
                agent: INVENTORY_AGENT.to_string(),
                output: inventory_raw.clone(),
            });
            debug!("Inventory output: {}", inventory_raw);
        }

        // === OrderPlacement (optional) ===
        let mut order_raw = String::new();
        if analysis.requires_order_placement {
            transition(&mut state, PipelineState::OrderPlacement);

            let customer_info = match &context.customer {
                Some(customer) => serde_json::to_string(customer)?,
                None => serde_json::to_string(&json!({
                    "customer_name": "Khách hàng",
                    "conversation_id": context.session_id,
                }))?,
            };
            let inventory_info = if inventory_raw.is_empty() {
                "{}".to_string()
            } else {
                inventory_raw.clone()
            };

            order_raw = self
                .invoke_agent(
                    ORDER_AGENT,
                    json!({
                        "query": product_query,
                        "inventory_info": inventory_info,
                        "customer_info": customer_info,
                    }),
                )
                .await?;
            agent_outputs.push(AgentOutput {
                agent: ORDER_AGENT.to_string(),
                output: order_raw.clone(),
            });
            debug!("Order output: {}", order_raw);
        }

        // === Consulting ===
        transition(&mut state, PipelineState::Consulting);

        let customer_info_text = match &context.customer {
            Some(customer) => serde_json::to_string(customer)?,
            None => String::new(),
        };

        let consultant_raw = self
            .invoke_agent(
                CONSULTANT_AGENT,
                json!({
                    "query": context.query,
                    "analysis": analysis_raw,
                    "inventory": if inventory_raw.is_empty() {
                        INVENTORY_NOT_CHECKED.to_string()
                    } else {
                        inventory_raw.clone()
                    },
                    "order": if order_raw.is_empty() {
                        ORDER_NOT_CREATED.to_string()
                    } else {
                        order_raw.clone()
                    },
                    "customer_info": customer_info_text,
                }),
            )
            .await?;
        agent_outputs.push(AgentOutput {
            agent: CONSULTANT_AGENT.to_string(),
            output: consultant_raw.clone(),
        });

        let mut customer_response = unwrap_consultant_response(&consultant_raw);
        if customer_response.is_empty() {
            customer_response = FALLBACK_RESPONSE.to_string();
        }

        transition(&mut state, PipelineState::Done);

        Ok((
            PipelineResult {
                customer_response,
                agent_outputs,
                session_id: context.session_id.clone(),
                status: PipelineStatus::Success,
                error: None,
            },
            analysis.customer_intent,
        ))
    }

    async fn invoke_agent(&self, name: &str, input: Value) -> crate::Result<String> {
        let handler = self
            .registry
            .get_handler(name)
            .ok_or_else(|| crate::error::PipelineError::AgentNotFound(name.to_string()))?;
        handler.invoke(input).await
    }
}

/// The consultant is asked for plain text, but some models wrap it as
/// `{"response": "..."}`. Unwrap that shape; keep anything else as-is.
fn unwrap_consultant_response(raw: &str) -> String {
    if let Some(map) = extract::extract_json_object(raw) {
        if let Some(Value::String(response)) = map.get("response") {
            return response.trim().to_string();
        }
    }
    raw.trim().to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{build_registry, PipelineMode};
    use crate::config::ToolServiceConfig;
    use crate::llm::MockCompletionClient;
    use crate::registry::AgentHandler;
    use crate::tools::testing::{ScriptedResponse, ScriptedTransport};
    use crate::tools::ToolService;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn coordinator(
        llm_responses: Vec<&str>,
        tool_script: Vec<ScriptedResponse>,
    ) -> (Coordinator, Arc<ScriptedTransport>) {
        let client = Arc::new(MockCompletionClient::new(
            llm_responses.into_iter().map(String::from).collect(),
        ));
        let transport = Arc::new(ScriptedTransport::new(tool_script));
        let tools = Arc::new(ToolService::new(
            transport.clone(),
            &ToolServiceConfig::default(),
        ));
        (
            Coordinator::new(build_registry(PipelineMode::Handler, client, tools)),
            transport,
        )
    }

    const ANALYSIS_FULL: &str = r#"{"product_details": "iPhone 15 Pro Max 256GB Titan tự nhiên", "customer_intent": "place_order", "original_query": "iPhone 15 Pro Max 256GB Titan tự nhiên, còn hàng không, giá bao nhiêu, muốn mua ngay", "requires_inventory_check": true, "requires_order_placement": true}"#;
    const ANALYSIS_NONE: &str = r#"{"product_details": "", "customer_intent": "general_query", "original_query": "shop mở cửa mấy giờ?", "requires_inventory_check": false, "requires_order_placement": false}"#;

    #[tokio::test]
    async fn test_full_pipeline_end_to_end() {
        let (coordinator, transport) = coordinator(
            vec![
                ANALYSIS_FULL,
                r#"{"product_name": "iPhone 15 Pro Max", "storage": "256GB", "color": "Titan tự nhiên"}"#,
                r#"{"quantity": 1}"#,
                r#"{"response": "Chào bạn! iPhone 15 Pro Max 256GB Titan tự nhiên còn hàng, giá 27.990.000 VNĐ. Đơn hàng order_9f8e7d6c5b4a3210 đã được tạo thành công. Cảm ơn bạn!"}"#,
            ],
            vec![
                ScriptedResponse::Ok(
                    r#"{"status": "success", "products": [{"product": "iPhone 15 Pro Max", "storage": "256GB", "color": "Titan tự nhiên", "price": 27990000, "quantity": 3}]}"#
                        .to_string(),
                ),
                ScriptedResponse::Ok(
                    "Order data successfully saved to file: orders/order_9f8e7d6c5b4a3210_conv.json"
                        .to_string(),
                ),
            ],
        );

        let result = coordinator
            .run(
                "iPhone 15 Pro Max 256GB Titan tự nhiên, còn hàng không, giá bao nhiêu, muốn mua ngay",
                None,
                None,
                None,
            )
            .await;

        assert_eq!(result.status, PipelineStatus::Success);
        assert!(result.customer_response.contains("iPhone 15 Pro Max"));
        assert!(result.customer_response.contains("order_"));
        assert!(!result.session_id.is_empty());

        let agents: Vec<&str> = result
            .agent_outputs
            .iter()
            .map(|o| o.agent.as_str())
            .collect();
        assert_eq!(
            agents,
            vec![
                "analysis_agent",
                "inventory_agent",
                "order_agent",
                "consultant_agent"
            ]
        );

        // Both remote tools were exercised, in order.
        let calls = transport.calls();
        assert_eq!(calls[0].0, "get_product_info");
        assert_eq!(calls[1].0, "create_order");
    }

    #[tokio::test]
    async fn test_skip_logic_runs_only_analysis_and_consultant() {
        let (coordinator, transport) = coordinator(
            vec![
                ANALYSIS_NONE,
                "Dạ shop mở cửa từ 8h sáng đến 9h tối mỗi ngày ạ!",
            ],
            vec![],
        );

        let result = coordinator.run("shop mở cửa mấy giờ?", None, None, None).await;

        assert_eq!(result.status, PipelineStatus::Success);
        let agents: Vec<&str> = result
            .agent_outputs
            .iter()
            .map(|o| o.agent.as_str())
            .collect();
        assert_eq!(agents, vec!["analysis_agent", "consultant_agent"]);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_analysis_degrades_to_general_query() {
        let (coordinator, transport) = coordinator(
            vec![
                "Tôi nghĩ khách hàng muốn hỏi về iPhone nhưng tôi không chắc lắm.",
                "Dạ anh/chị cần em tư vấn thêm thông tin gì ạ?",
            ],
            vec![],
        );

        let result = coordinator.run("ủa alo", None, None, None).await;

        assert_eq!(result.status, PipelineStatus::Success);
        assert_eq!(result.agent_outputs.len(), 2);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provided_session_id_is_threaded_through() {
        let (coordinator, _) = coordinator(
            vec![ANALYSIS_NONE, "Dạ vâng ạ!"],
            vec![],
        );

        let result = coordinator
            .run(
                "xin chào",
                None,
                Some("user_42".to_string()),
                Some("session-abc".to_string()),
            )
            .await;

        assert_eq!(result.session_id, "session-abc");
    }

    #[tokio::test]
    async fn test_empty_consultant_output_gets_apology() {
        let (coordinator, _) = coordinator(vec![ANALYSIS_NONE, ""], vec![]);

        let result = coordinator.run("xin chào", None, None, None).await;

        assert_eq!(result.status, PipelineStatus::Success);
        assert_eq!(result.customer_response, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_missing_agent_fails_the_run() {
        // Registry with only the analysis agent: the consulting stage
        // cannot resolve its handler and the run goes terminal.
        struct Canned(&'static str);

        #[async_trait]
        impl AgentHandler for Canned {
            async fn invoke(&self, _input: Value) -> crate::Result<String> {
                Ok(self.0.to_string())
            }
        }

        let mut registry = crate::registry::AgentRegistry::new();
        registry.register(crate::agents::analysis_card(), Arc::new(Canned(ANALYSIS_NONE)));
        let coordinator = Coordinator::new(registry);

        let result = coordinator.run("xin chào", None, None, None).await;

        assert_eq!(result.status, PipelineStatus::Error);
        assert!(result.error.unwrap().contains("consultant_agent"));
        assert!(result.customer_response.contains("Xin lỗi"));
        assert!(result.agent_outputs.is_empty());
    }

    #[test]
    fn test_unwrap_consultant_response() {
        assert_eq!(
            unwrap_consultant_response(r#"{"response": "Chào bạn!"}"#),
            "Chào bạn!"
        );
        assert_eq!(
            unwrap_consultant_response("Cảm ơn anh đã tin tưởng."),
            "Cảm ơn anh đã tin tưởng."
        );
        // Objects without a "response" field stay as raw text.
        assert_eq!(
            unwrap_consultant_response(r#"{"answer": "x"}"#),
            r#"{"answer": "x"}"#
        );
    }
}

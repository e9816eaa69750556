//! Agent definitions and invocation handlers
//!
//! Each agent is an instruction + a shared completion client. Handlers
//! wrap an agent with the deterministic glue around it: building the
//! payload, parsing the model's JSON, calling the remote tools, and
//! normalizing the stage result.

pub mod react;

use crate::extract;
use crate::llm::CompletionClient;
use crate::models::{
    AgentCard, CustomerInfo, InventoryResult, OrderDetails, OrderResult, StockStatus,
};
use crate::registry::{AgentHandler, AgentRegistry};
use crate::tools::{result_indicates_success, ToolService};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const ANALYSIS_AGENT: &str = "analysis_agent";
pub const INVENTORY_AGENT: &str = "inventory_agent";
pub const ORDER_AGENT: &str = "order_agent";
pub const CONSULTANT_AGENT: &str = "consultant_agent";

lazy_static! {
    /// Order ids echoed back by the order service look like
    /// `order_<hex>_<conversation id>` inside the result text.
    static ref ORDER_ID_RE: Regex = Regex::new(r"order_([0-9a-f]+)_").unwrap();
}

/// Which flavor of inventory/order agent the registry is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// The handler parses the agent's JSON and calls the tool itself.
    Handler,
    /// The agent drives tool calls through the `TOOL_CALL:` protocol.
    React,
}

impl PipelineMode {
    pub fn from_env() -> Self {
        match std::env::var("PIPELINE_MODE").as_deref() {
            Ok("react") => PipelineMode::React,
            _ => PipelineMode::Handler,
        }
    }
}

/// One narrowly-scoped agent: a name, its instruction, and the shared
/// completion client.
pub struct LlmAgent {
    pub name: String,
    instruction: String,
    client: Arc<dyn CompletionClient>,
}

impl LlmAgent {
    pub fn new(name: &str, instruction: &str, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            name: name.to_string(),
            instruction: instruction.to_string(),
            client,
        }
    }

    pub async fn run(&self, prompt: &str) -> crate::Result<String> {
        debug!(agent = %self.name, "Invoking agent");
        let output = self.client.complete(&self.instruction, prompt).await?;
        debug!(agent = %self.name, output = %output, "Agent output");
        Ok(output)
    }
}

//
// ================= Instructions =================
//

const ANALYSIS_INSTRUCTION: &str = r#"Phân tích kỹ lưỡng yêu cầu của khách hàng:
1. Tên sản phẩm hoặc loại sản phẩm khách hàng quan tâm.
2. Ý định chính của khách hàng (hỏi thông tin, kiểm tra tồn kho, hỏi giá, muốn đặt hàng).
3. Chi tiết cụ thể khác nếu có (màu sắc, dung lượng, v.v.).

Trả về JSON với các trường:
- product_details: (string) mô tả sản phẩm khách quan tâm
- customer_intent: (string) một trong: 'check_inventory_price', 'place_order', 'general_query', 'product_info'
- original_query: (string) câu hỏi gốc
- requires_inventory_check: (boolean) có cần kiểm tra kho không
- requires_order_placement: (boolean) khách có ý định đặt hàng không

CHÚ Ý: Chỉ trả về đối tượng JSON thuần túy, KHÔNG dùng markdown như ```json,
không thêm văn bản trước hoặc sau JSON.

Ví dụ output:
{"product_details": "iPhone 15 Pro Max 256GB màu Titan tự nhiên", "customer_intent": "place_order", "original_query": "Tôi muốn mua iPhone 15 Pro Max", "requires_inventory_check": true, "requires_order_placement": true}"#;

const INVENTORY_INSTRUCTION: &str = r#"Bạn là Inventory Agent - chuyên kiểm tra tồn kho.

NHIỆM VỤ:
1. Phân tích input để lấy: product, storage, color
2. Trả về JSON với format:
{"product_name": "...", "storage": "...", "color": "..."}

Lưu ý: Bạn KHÔNG gọi tool trực tiếp. Handler sẽ gọi tool dựa trên output của bạn.
Chỉ trả JSON thuần, không dùng markdown."#;

const ORDER_INSTRUCTION: &str = r#"Bạn là Order Agent - chuyên tạo đơn hàng.

NHIỆM VỤ:
1. Nhận thông tin từ inventory và customer
2. Xác định số lượng và thông tin cần tạo đơn hàng
3. Trả về JSON với format:
{"product": "...", "color": "...", "storage": "...", "quantity": 1}

Lưu ý: Bạn KHÔNG gọi tool trực tiếp. Handler sẽ gọi tool dựa trên output của bạn.
QUAN TRỌNG: Giữ ĐẦY ĐỦ color, storage trong output.
Chỉ trả JSON thuần theo đúng format, không thêm mô tả, không dùng markdown."#;

const CONSULTANT_INSTRUCTION: &str = r#"Bạn là nhân viên tư vấn bán hàng thân thiện. Nhiệm vụ: tạo câu trả lời TỰ NHIÊN cho khách hàng.

Dựa trên thông tin từ các bước trước:
- analysis: ý định khách hàng, sản phẩm quan tâm
- inventory: tồn kho, giá
- order: trạng thái đơn hàng

1. Nếu đơn hàng được tạo thành công (order_created là true):
   thông báo đặt hàng thành công, kèm thông tin sản phẩm, giá, số lượng và order_id để khách theo dõi.
2. Nếu không đặt được đơn hàng: giải thích lý do (hết hàng, thiếu thông tin) và gợi ý bước tiếp theo.
3. Nếu khách chỉ hỏi thông tin hoặc giá: cung cấp giá cả, tình trạng kho và tư vấn thêm.

CHÚ Ý:
- Trả về văn bản hoàn chỉnh bằng tiếng Việt, KHÔNG phải JSON
- Thân thiện, chuyên nghiệp, đầy đủ thông tin"#;

//
// ================= Agent Cards =================
//

pub fn analysis_card() -> AgentCard {
    AgentCard {
        name: ANALYSIS_AGENT.to_string(),
        display_name: "Analysis Agent".to_string(),
        role: "Phân tích yêu cầu khách hàng và xác định workflow cần thiết".to_string(),
        capabilities: vec![
            "Phân tích ý định khách hàng".to_string(),
            "Trích xuất thông tin sản phẩm".to_string(),
            "Xác định workflow (check inventory, place order, ...)".to_string(),
        ],
        input_schema: json!({
            "query": {"type": "string", "description": "Câu hỏi/yêu cầu của khách hàng"}
        }),
        output_schema: json!({
            "product_details": {"type": "string"},
            "customer_intent": {"type": "string"},
            "requires_inventory_check": {"type": "boolean"},
            "requires_order_placement": {"type": "boolean"}
        }),
        version: "1.0.0".to_string(),
        endpoint: None,
    }
}

pub fn inventory_card() -> AgentCard {
    AgentCard {
        name: INVENTORY_AGENT.to_string(),
        display_name: "Inventory Agent".to_string(),
        role: "Kiểm tra tồn kho và giá sản phẩm từ database".to_string(),
        capabilities: vec![
            "Truy vấn tồn kho sản phẩm".to_string(),
            "Lấy thông tin giá".to_string(),
            "Kiểm tra số lượng còn hàng".to_string(),
        ],
        input_schema: json!({
            "query": {"type": "string", "description": "Thông tin sản phẩm cần check"},
            "context": {"type": "string", "description": "Context từ analysis agent (JSON string)"}
        }),
        output_schema: json!({
            "product_name": {"type": "string"},
            "storage": {"type": "string"},
            "color": {"type": "string"},
            "stock_status": {"type": "string"},
            "price": {"type": "number"},
            "quantity": {"type": "integer"}
        }),
        version: "1.0.0".to_string(),
        endpoint: None,
    }
}

pub fn order_card() -> AgentCard {
    AgentCard {
        name: ORDER_AGENT.to_string(),
        display_name: "Order Agent".to_string(),
        role: "Tạo và quản lý đơn hàng cho khách".to_string(),
        capabilities: vec![
            "Tạo đơn hàng mới".to_string(),
            "Lưu thông tin đơn hàng".to_string(),
            "Generate order ID".to_string(),
        ],
        input_schema: json!({
            "query": {"type": "string", "description": "Yêu cầu tạo đơn hàng"},
            "inventory_info": {"type": "string", "description": "Thông tin tồn kho (JSON)"},
            "customer_info": {"type": "string", "description": "Thông tin khách hàng (JSON)"}
        }),
        output_schema: json!({
            "order_created": {"type": "boolean"},
            "order_details": {"type": "object"},
            "customer_info": {"type": "object"},
            "message": {"type": "string"}
        }),
        version: "1.0.0".to_string(),
        endpoint: None,
    }
}

pub fn consultant_card() -> AgentCard {
    AgentCard {
        name: CONSULTANT_AGENT.to_string(),
        display_name: "Consultant Agent".to_string(),
        role: "Tạo câu trả lời tự nhiên cho khách hàng".to_string(),
        capabilities: vec![
            "Tổng hợp thông tin từ các agents".to_string(),
            "Generate natural language response".to_string(),
            "Định dạng thông tin thân thiện".to_string(),
        ],
        input_schema: json!({
            "query": {"type": "string"},
            "analysis": {"type": "string"},
            "inventory": {"type": "string"},
            "order": {"type": "string"},
            "customer_info": {"type": "string"}
        }),
        output_schema: json!({
            "response": {"type": "string"}
        }),
        version: "1.0.0".to_string(),
        endpoint: None,
    }
}

//
// ================= Input helpers =================
//

fn string_field(input: &Value, key: &str) -> String {
    input
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn require_field(input: &Value, key: &str) -> crate::Result<String> {
    let value = string_field(input, key);
    if value.is_empty() {
        return Err(crate::error::PipelineError::InvalidInput(format!(
            "missing input field '{}'",
            key
        )));
    }
    Ok(value)
}

fn non_empty(primary: String, fallback: &str) -> String {
    if primary.trim().is_empty() {
        fallback.to_string()
    } else {
        primary
    }
}

fn map_str(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

//
// ================= Analysis =================
//

pub struct AnalysisHandler {
    agent: LlmAgent,
}

impl AnalysisHandler {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            agent: LlmAgent::new(ANALYSIS_AGENT, ANALYSIS_INSTRUCTION, client),
        }
    }
}

#[async_trait]
impl AgentHandler for AnalysisHandler {
    async fn invoke(&self, input: Value) -> crate::Result<String> {
        let prompt = require_field(&input, "query")?;
        self.agent.run(&prompt).await
    }
}

//
// ================= Inventory (handler mode) =================
//

/// 1. Ask the agent to extract product parameters from the analysis
/// 2. Fall back to the analysis context / raw query when it cannot
/// 3. Call the remote inventory tool
/// 4. Normalize the tool payload into an `InventoryResult` JSON string
pub struct InventoryHandler {
    agent: LlmAgent,
    tools: Arc<ToolService>,
}

impl InventoryHandler {
    pub fn new(client: Arc<dyn CompletionClient>, tools: Arc<ToolService>) -> Self {
        Self {
            agent: LlmAgent::new(INVENTORY_AGENT, INVENTORY_INSTRUCTION, client),
            tools,
        }
    }
}

#[async_trait]
impl AgentHandler for InventoryHandler {
    async fn invoke(&self, input: Value) -> crate::Result<String> {
        let query = require_field(&input, "query")?;
        let context = string_field(&input, "context");
        let context_data = extract::json_or_raw(&context);

        let payload = json!({
            "query": query,
            "analysis_context": context_data,
        })
        .to_string();

        let agent_response = self.agent.run(&payload).await?;
        debug!("Inventory agent response: {}", agent_response);

        let response_data = extract::json_or_raw(&agent_response);

        let mut product = map_str(&response_data, "product_name");
        if product.is_empty() {
            product = map_str(&response_data, "product");
        }
        if product.is_empty() {
            warn!("Inventory agent returned no product, falling back to analysis context");
            product = non_empty(map_str(&context_data, "product_details"), &query);
        }
        let storage = map_str(&response_data, "storage");
        let color = map_str(&response_data, "color");

        let tool_text = self
            .tools
            .check_inventory_detail(&product, &storage, &color)
            .await;
        debug!("Inventory tool result: {}", tool_text);

        let result = normalize_inventory(&tool_text, &product, &storage, &color);

        Ok(serde_json::to_string(&result)?)
    }
}

fn normalize_inventory(
    tool_text: &str,
    product: &str,
    storage: &str,
    color: &str,
) -> InventoryResult {
    let tool_data = match extract::extract_json_object(tool_text) {
        Some(map) => map,
        None => {
            return InventoryResult {
                product_name: product.to_string(),
                storage: storage.to_string(),
                color: color.to_string(),
                stock_status: StockStatus::Error,
                fallback_used: true,
                error: Some("Invalid tool response".to_string()),
                ..InventoryResult::default()
            }
        }
    };

    if tool_data.get("status").and_then(Value::as_str) == Some("error") {
        let message = map_str(&tool_data, "message");
        return InventoryResult {
            product_name: product.to_string(),
            storage: storage.to_string(),
            color: color.to_string(),
            stock_status: StockStatus::Error,
            fallback_used: true,
            error: Some(non_empty(message, "Inventory lookup failed")),
            ..InventoryResult::default()
        };
    }

    let products = tool_data
        .get("products")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    match products.first() {
        Some(info) => {
            let quantity = info.get("quantity").and_then(Value::as_u64).unwrap_or(0) as u32;
            InventoryResult {
                product_name: non_empty(
                    info.get("product")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    product,
                ),
                storage: non_empty(
                    info.get("storage")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    storage,
                ),
                color: non_empty(
                    info.get("color")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    color,
                ),
                stock_status: if quantity > 0 {
                    StockStatus::InStock
                } else {
                    StockStatus::OutOfStock
                },
                price: info.get("price").and_then(Value::as_f64).unwrap_or(0.0),
                quantity,
                fallback_used: false,
                error: None,
                message: None,
            }
        }
        None => InventoryResult {
            product_name: product.to_string(),
            storage: storage.to_string(),
            color: color.to_string(),
            stock_status: StockStatus::Unknown,
            fallback_used: true,
            error: Some("Product not found".to_string()),
            ..InventoryResult::default()
        },
    }
}

//
// ================= Order (handler mode) =================
//

/// 1. Ask the agent to prepare order parameters
/// 2. Build the order payload from inventory + customer info, quantity
///    defaulting to 1 when absent or unparseable
/// 3. Soft-fail without calling the tool when the product is empty or
///    the computed total price is zero
/// 4. Call the remote order tool and report its outcome
pub struct OrderHandler {
    agent: LlmAgent,
    tools: Arc<ToolService>,
}

impl OrderHandler {
    pub fn new(client: Arc<dyn CompletionClient>, tools: Arc<ToolService>) -> Self {
        Self {
            agent: LlmAgent::new(ORDER_AGENT, ORDER_INSTRUCTION, client),
            tools,
        }
    }
}

#[async_trait]
impl AgentHandler for OrderHandler {
    async fn invoke(&self, input: Value) -> crate::Result<String> {
        let query = require_field(&input, "query")?;
        let inventory_info = string_field(&input, "inventory_info");
        let customer_info = string_field(&input, "customer_info");

        let (inventory, _) =
            extract::parse_or_default::<InventoryResult, _>(&inventory_info, InventoryResult::default);
        let (customer, _) =
            extract::parse_or_default::<CustomerInfo, _>(&customer_info, CustomerInfo::default);

        let payload = json!({
            "customer_query": query,
            "inventory_result": inventory,
            "customer_info": customer,
        })
        .to_string();

        let agent_response = self.agent.run(&payload).await?;
        debug!("Order agent response: {}", agent_response);

        let response_data = extract::json_or_raw(&agent_response);

        let quantity = response_data
            .get("quantity")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .max(1) as u32;

        let product = non_empty(
            inventory.product_name.clone(),
            &map_str(&response_data, "product"),
        );
        let color = non_empty(inventory.color.clone(), &map_str(&response_data, "color"));
        let storage = non_empty(
            inventory.storage.clone(),
            &map_str(&response_data, "storage"),
        );
        let total_price = inventory.price * quantity as f64;

        // The two load-bearing validity checks: no product, or a total
        // that computes to zero, means there is nothing to persist.
        if product.trim().is_empty() || total_price == 0.0 {
            let result = OrderResult {
                order_created: false,
                message: "Không thể tạo đơn hàng do thiếu thông tin sản phẩm hoặc giá"
                    .to_string(),
                fallback_used: true,
                error: Some("Missing product or price information".to_string()),
                ..OrderResult::default()
            };
            return Ok(serde_json::to_string(&result)?);
        }

        let mut details = OrderDetails {
            order_id: OrderDetails::generate_order_id(),
            product,
            color,
            storage,
            quantity,
            total_price,
        };

        let mut order_payload = serde_json::to_value(&details)?;
        order_payload["customer_info"] = serde_json::to_value(&customer)?;

        let tool_text = self.tools.create_customer_order(&order_payload).await;
        debug!("Order tool result: {}", tool_text);

        // Prefer the id the service echoed back, if any.
        if let Some(captures) = ORDER_ID_RE.captures(&tool_text) {
            details.order_id = format!("order_{}", &captures[1]);
        }

        let order_created = result_indicates_success(&tool_text);
        if !order_created {
            error!("Order creation failed: {}", tool_text);
        }

        let result = OrderResult {
            order_created,
            order_details: Some(details),
            customer_info: Some(customer),
            message: tool_text,
            fallback_used: false,
            error: None,
        };

        Ok(serde_json::to_string(&result)?)
    }
}

//
// ================= Consultant =================
//

pub struct ConsultantHandler {
    agent: LlmAgent,
}

impl ConsultantHandler {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            agent: LlmAgent::new(CONSULTANT_AGENT, CONSULTANT_INSTRUCTION, client),
        }
    }
}

#[async_trait]
impl AgentHandler for ConsultantHandler {
    async fn invoke(&self, input: Value) -> crate::Result<String> {
        let query = require_field(&input, "query")?;
        let analysis = string_field(&input, "analysis");
        let inventory = string_field(&input, "inventory");
        let order = string_field(&input, "order");
        let customer_info = string_field(&input, "customer_info");

        let mut prompt = format!(
            "Sinh câu trả lời cuối cùng cho khách hàng dựa trên thông tin:\n\
             Customer query: {}\n\
             Analysis: {}\n\
             Inventory: {}\n\
             Order: {}\n",
            query, analysis, inventory, order
        );
        if !customer_info.is_empty() {
            prompt.push_str(&format!("Customer context: {}\n", customer_info));
        }
        prompt.push_str("Trả lời thân thiện bằng tiếng Việt.");

        self.agent.run(&prompt).await
    }
}

//
// ================= Registry wiring =================
//

/// Build the default registry for the chosen mode, sharing one
/// completion client and one tool service across all agents.
pub fn build_registry(
    mode: PipelineMode,
    client: Arc<dyn CompletionClient>,
    tools: Arc<ToolService>,
) -> AgentRegistry {
    let mut registry = AgentRegistry::new();

    registry.register(analysis_card(), Arc::new(AnalysisHandler::new(client.clone())));

    match mode {
        PipelineMode::Handler => {
            registry.register(
                inventory_card(),
                Arc::new(InventoryHandler::new(client.clone(), tools.clone())),
            );
            registry.register(
                order_card(),
                Arc::new(OrderHandler::new(client.clone(), tools)),
            );
        }
        PipelineMode::React => {
            registry.register(
                inventory_card(),
                Arc::new(react::ReactInventoryHandler::new(
                    client.clone(),
                    tools.clone(),
                )),
            );
            registry.register(
                order_card(),
                Arc::new(react::ReactOrderHandler::new(client.clone(), tools)),
            );
        }
    }

    registry.register(consultant_card(), Arc::new(ConsultantHandler::new(client)));

    info!(?mode, "Agent registry initialized");
    registry
}

//! Core data models for the sales agent pipeline

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIntent {
    CheckInventoryPrice,
    PlaceOrder,
    #[default]
    GeneralQuery,
    ProductInfo,
}

impl CustomerIntent {
    /// Lenient parse for model-produced intent strings.
    /// Anything unrecognized degrades to the general-query path.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "check_inventory_price" => CustomerIntent::CheckInventoryPrice,
            "place_order" => CustomerIntent::PlaceOrder,
            "product_info" => CustomerIntent::ProductInfo,
            _ => CustomerIntent::GeneralQuery,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerIntent::CheckInventoryPrice => "check_inventory_price",
            CustomerIntent::PlaceOrder => "place_order",
            CustomerIntent::GeneralQuery => "general_query",
            CustomerIntent::ProductInfo => "product_info",
        }
    }
}

impl fmt::Display for CustomerIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    LowStock,
    Unknown,
    Error,
    #[default]
    NotChecked,
}

impl StockStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "in_stock" => StockStatus::InStock,
            "out_of_stock" => StockStatus::OutOfStock,
            "low_stock" => StockStatus::LowStock,
            "not_checked" => StockStatus::NotChecked,
            "error" => StockStatus::Error,
            _ => StockStatus::Unknown,
        }
    }
}

fn de_intent<'de, D>(deserializer: D) -> Result<CustomerIntent, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(CustomerIntent::parse).unwrap_or_default())
}

fn de_stock_status<'de, D>(deserializer: D) -> Result<StockStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(StockStatus::parse).unwrap_or_default())
}

//
// ================= Query Context =================
//

/// Immutable per-run context: created once at pipeline start,
/// read by every stage, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    pub query: String,
    pub customer: Option<Value>,
    pub user_id: String,
    pub session_id: String,
}

impl QueryContext {
    pub fn new(
        query: String,
        customer: Option<Value>,
        user_id: Option<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            query,
            customer,
            user_id: user_id.unwrap_or_else(|| "default_user".to_string()),
            session_id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }
}

//
// ================= Analysis =================
//

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisResult {
    #[serde(default)]
    pub product_details: String,
    #[serde(default, deserialize_with = "de_intent")]
    pub customer_intent: CustomerIntent,
    #[serde(default)]
    pub original_query: String,
    #[serde(default)]
    pub requires_inventory_check: bool,
    #[serde(default)]
    pub requires_order_placement: bool,
}

impl AnalysisResult {
    /// Degraded default used when the analysis output cannot be parsed:
    /// both booleans false, so the run follows the general-query path.
    pub fn fallback_for(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            ..Self::default()
        }
    }
}

//
// ================= Inventory =================
//

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InventoryResult {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub storage: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, deserialize_with = "de_stock_status")]
    pub stock_status: StockStatus,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

//
// ================= Order =================
//

fn default_customer_name() -> String {
    "Khách hàng".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default = "default_customer_name")]
    pub customer_name: String,
    #[serde(default = "CustomerInfo::generate_conversation_id")]
    pub conversation_id: String,
}

impl CustomerInfo {
    pub fn generate_conversation_id() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("conv_{}", &hex[..6])
    }
}

impl Default for CustomerInfo {
    fn default() -> Self {
        Self {
            customer_name: default_customer_name(),
            conversation_id: Self::generate_conversation_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderDetails {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub storage: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub total_price: f64,
}

fn default_quantity() -> u32 {
    1
}

impl OrderDetails {
    /// Order ids use a fixed prefix plus a random hex suffix so no
    /// central coordination is needed for uniqueness.
    pub fn generate_order_id() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("order_{}", &hex[..16])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderResult {
    #[serde(default)]
    pub order_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_details: Option<OrderDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<CustomerInfo>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//
// ================= Pipeline Result =================
//

/// One audit record per executed stage, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: String,
    pub output: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Success,
    Error,
}

/// The sole contract returned to external callers (API, UI, CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub customer_response: String,
    pub agent_outputs: Vec<AgentOutput>,
    pub session_id: String,
    pub status: PipelineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//
// ================= Agent Card =================
//

fn default_card_version() -> String {
    "1.0.0".to_string()
}

/// Introspection metadata for a registered agent.
/// Used for service discovery and listing, not for control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub display_name: String,
    pub role: String,
    pub capabilities: Vec<String>,
    pub input_schema: Value,
    pub output_schema: Value,
    #[serde(default = "default_card_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_result_parses_model_json() {
        let raw = r#"{
            "product_details": "iPhone 15 Pro Max 256GB màu Titan tự nhiên",
            "customer_intent": "place_order",
            "original_query": "Tôi muốn mua iPhone 15 Pro Max",
            "requires_inventory_check": true,
            "requires_order_placement": true
        }"#;

        let analysis: AnalysisResult = serde_json::from_str(raw).unwrap();
        assert_eq!(analysis.customer_intent, CustomerIntent::PlaceOrder);
        assert!(analysis.requires_inventory_check);
        assert!(analysis.requires_order_placement);
    }

    #[test]
    fn test_unknown_intent_degrades_to_general_query() {
        let raw = r#"{"product_details": "x", "customer_intent": "buy_now_maybe"}"#;
        let analysis: AnalysisResult = serde_json::from_str(raw).unwrap();
        assert_eq!(analysis.customer_intent, CustomerIntent::GeneralQuery);
        assert!(!analysis.requires_inventory_check);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let inventory: InventoryResult = serde_json::from_str("{}").unwrap();
        assert_eq!(inventory.stock_status, StockStatus::NotChecked);
        assert_eq!(inventory.quantity, 0);
        assert!(!inventory.fallback_used);
    }

    #[test]
    fn test_order_id_format() {
        let order_id = OrderDetails::generate_order_id();
        assert!(order_id.starts_with("order_"));
        let suffix = &order_id["order_".len()..];
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_query_context_generates_session_id() {
        let ctx = QueryContext::new("giá iPhone 15?".to_string(), None, None, None);
        assert_eq!(ctx.user_id, "default_user");
        assert!(!ctx.session_id.is_empty());
    }
}

//! REST API server for the sales agent pipeline
//!
//! Exposes the coordinator via HTTP endpoints; the heavy lifting stays
//! in `pipeline`.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::metrics::get_metrics_collector;
use crate::models::{AgentCard, PipelineStatus};
use crate::pipeline::Coordinator;

const MAX_QUERY_CHARS: usize = 2000;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub query: String,
    pub initial_context_data: Option<Value>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub customer_response: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
}

/// =============================
/// Endpoints
/// =============================

async fn root() -> Json<Value> {
    Json(serde_json::json!({
        "name": "Multi-Agent Sales Assistant API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "chat": "/chat",
            "health": "/health",
            "metrics": "/metrics",
            "agents": "/agents"
        }
    }))
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "pipeline_initialized": true,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> Json<Value> {
    let snapshot = get_metrics_collector().snapshot();
    Json(serde_json::to_value(snapshot).unwrap_or_default())
}

async fn list_agents(State(state): State<ApiState>) -> Json<Vec<AgentCard>> {
    Json(state.coordinator.registry().list_agents())
}

async fn chat(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ChatResponse>) {
    let query_chars = req.query.chars().count();
    if query_chars == 0 || query_chars > MAX_QUERY_CHARS {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ChatResponse {
                customer_response: String::new(),
                status: "error".to_string(),
                session_id: None,
                error: Some(format!(
                    "query must be between 1 and {} characters",
                    MAX_QUERY_CHARS
                )),
            }),
        );
    }

    info!("Processing chat request: {}", truncate(&req.query, 100));

    let result = state
        .coordinator
        .run(
            &req.query,
            req.initial_context_data,
            req.user_id,
            req.session_id,
        )
        .await;

    let status_code = match result.status {
        PipelineStatus::Success => StatusCode::OK,
        PipelineStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let response = ChatResponse {
        customer_response: result.customer_response,
        status: match result.status {
            PipelineStatus::Success => "success".to_string(),
            PipelineStatus::Error => "error".to_string(),
        },
        session_id: Some(result.session_id),
        error: result.error,
    };

    (status_code, Json(response))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// =============================
/// Router
/// =============================

pub fn create_router(coordinator: Arc<Coordinator>) -> Router {
    let state = ApiState { coordinator };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/agents", get(list_agents))
        .route("/chat", post(chat))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    coordinator: Arc<Coordinator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(coordinator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{build_registry, PipelineMode};
    use crate::config::ToolServiceConfig;
    use crate::llm::MockCompletionClient;
    use crate::tools::testing::ScriptedTransport;
    use crate::tools::ToolService;

    fn state(llm_responses: Vec<&str>) -> ApiState {
        let client = Arc::new(MockCompletionClient::new(
            llm_responses.into_iter().map(String::from).collect(),
        ));
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let tools = Arc::new(ToolService::new(
            transport,
            &ToolServiceConfig::default(),
        ));
        ApiState {
            coordinator: Arc::new(Coordinator::new(build_registry(
                PipelineMode::Handler,
                client,
                tools,
            ))),
        }
    }

    #[tokio::test]
    async fn test_chat_rejects_out_of_range_query() {
        let api_state = state(vec![]);

        let (status, Json(response)) = chat(
            State(api_state.clone()),
            Json(ChatRequest {
                query: String::new(),
                initial_context_data: None,
                user_id: None,
                session_id: None,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.status, "error");

        let (status, _) = chat(
            State(api_state),
            Json(ChatRequest {
                query: "a".repeat(MAX_QUERY_CHARS + 1),
                initial_context_data: None,
                user_id: None,
                session_id: None,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_chat_returns_pipeline_result() {
        let api_state = state(vec![
            r#"{"product_details": "", "customer_intent": "general_query", "requires_inventory_check": false, "requires_order_placement": false}"#,
            "Dạ em chào anh/chị ạ!",
        ]);

        let (status, Json(response)) = chat(
            State(api_state),
            Json(ChatRequest {
                query: "xin chào".to_string(),
                initial_context_data: None,
                user_id: None,
                session_id: Some("session-1".to_string()),
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "success");
        assert_eq!(response.session_id.as_deref(), Some("session-1"));
        assert!(response.customer_response.contains("chào"));
    }
}

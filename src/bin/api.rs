use sales_agent_orchestrator::{
    agents::{build_registry, PipelineMode},
    api::start_server,
    config::{server_port, LlmConfig},
    llm::OpenAiCompatClient,
    pipeline::Coordinator,
    tools::ToolService,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let llm_config = LlmConfig::from_env();
    if llm_config.api_key.is_empty() {
        eprintln!("⚠️  LLM_API_KEY not set in .env");
        eprintln!("📌 See .env.example for setup instructions");
    }

    let mode = PipelineMode::from_env();
    let api_port = server_port();

    info!("🚀 Multi-Agent Sales Assistant - API Server");
    info!("📍 Port: {}", api_port);
    info!("🔧 Pipeline mode: {:?}", mode);

    // Create components
    let client = Arc::new(OpenAiCompatClient::new(llm_config)?);
    let tools = Arc::new(ToolService::from_env()?);
    let registry = build_registry(mode, client, tools);
    let coordinator = Arc::new(Coordinator::new(registry));

    info!("✅ Pipeline initialized");
    info!("📡 Starting API server...");

    start_server(coordinator, api_port).await?;

    Ok(())
}

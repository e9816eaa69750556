use sales_agent_orchestrator::{
    agents::{build_registry, PipelineMode},
    config::LlmConfig,
    llm::OpenAiCompatClient,
    metrics::get_metrics_collector,
    pipeline::Coordinator,
    tools::ToolService,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let client = Arc::new(OpenAiCompatClient::new(LlmConfig::from_env())?);
    let tools = Arc::new(ToolService::from_env()?);
    let registry = build_registry(PipelineMode::from_env(), client, tools);
    let coordinator = Coordinator::new(registry);

    info!("Starting interactive conversation mode");
    println!("Chào mừng! Nhập 'quit' để thoát.\n");

    let stdin = io::stdin();
    loop {
        print!("Bạn: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let user_input = line.trim();
        if user_input.is_empty() {
            continue;
        }
        if matches!(user_input.to_lowercase().as_str(), "quit" | "exit" | "thoát") {
            println!("Cảm ơn bạn đã sử dụng dịch vụ!");
            break;
        }

        let result = coordinator
            .run(user_input, None, Some("interactive_user".to_string()), None)
            .await;

        println!("\nAgent: {}\n", result.customer_response);
    }

    get_metrics_collector().log_metrics();

    Ok(())
}

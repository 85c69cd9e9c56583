use hisab_assistant::{
    api::start_server, build_store, AppConfig, Assistant, GeminiClient, SystemClock,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY not set; users must store their own key in settings");
    }

    info!("Hisab assistant - API Server");
    info!(port = config.port, model = %config.gemini_model, "Configuration loaded");

    let store = build_store(&config);
    let model = Arc::new(GeminiClient::new(&config)?);
    let clock = Arc::new(SystemClock);
    let port = config.port;

    let assistant = Arc::new(Assistant::new(store, model, clock, config));

    info!("Assistant initialized");
    info!("Starting API server...");

    start_server(assistant, port).await?;

    Ok(())
}

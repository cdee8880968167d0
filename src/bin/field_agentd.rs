//! Field service agent daemon: hosts the technician-facing specialist on
//! its own port (default 8001).

use fieldops::agent_server;
use fieldops::clients::gemini::GeminiClient;
use fieldops::config::AgentConfig;
use fieldops::prompts;
use fieldops::specialists::field_service;
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    fieldops::init_logger();

    let config = AgentConfig::from_env("FIELD_SERVICE_AGENT_PORT", 8001)?;
    let system_prompt = prompts::load(&config.prompt_dir, prompts::FIELD_SERVICE_PROMPT)?;
    let office_url = std::env::var("OFFICE_AGENT_URL")
        .unwrap_or_else(|_| "http://localhost:8002".to_string());

    let client = Arc::new(GeminiClient::new_with_model_string(
        &config.gemini_api_key,
        &config.model,
    ));

    let agent = field_service::build(client, system_prompt, &office_url).await?;
    let handle = agent_server::serve(config.port, Arc::new(agent)).await?;
    handle.wait().await
}

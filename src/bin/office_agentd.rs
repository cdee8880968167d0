//! Office agent daemon: hosts the billing/compliance specialist on its own
//! port (default 8002).

use fieldops::agent_server;
use fieldops::clients::gemini::GeminiClient;
use fieldops::config::{AgentConfig, WhatsAppConfig};
use fieldops::prompts;
use fieldops::specialists::office;
use fieldops::whatsapp::WhatsAppClient;
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    fieldops::init_logger();

    let config = AgentConfig::from_env("OFFICE_AGENT_PORT", 8002)?;
    let system_prompt = prompts::load(&config.prompt_dir, prompts::OFFICE_PROMPT)?;

    let client = Arc::new(GeminiClient::new_with_model_string(
        &config.gemini_api_key,
        &config.model,
    ));

    // Escalations go straight to office staff over WhatsApp when credentials
    // are available; otherwise they are only logged.
    let whatsapp = match WhatsAppConfig::from_env() {
        Ok(wa_config) => Some(Arc::new(WhatsAppClient::new(&wa_config))),
        Err(e) => {
            log::warn!("WhatsApp disabled for escalations ({})", e);
            None
        }
    };

    let agent = office::build(client, system_prompt, whatsapp).await?;
    let handle = agent_server::serve(config.port, Arc::new(agent)).await?;
    handle.wait().await
}

//! Orchestrator daemon: WhatsApp webhook plus CLI input loop.
//!
//! Requires `GEMINI_API_KEY`. With `WHATSAPP_ACCESS_TOKEN` and
//! `WHATSAPP_PHONE_NUMBER_ID` set, the webhook server is started in the
//! background and replies go out over the Cloud API; without them the
//! orchestrator runs CLI-only.

use fieldops::agent_proxy::AgentProxy;
use fieldops::clients::gemini::GeminiClient;
use fieldops::config::{OrchestratorConfig, WhatsAppConfig};
use fieldops::history::HistoryStore;
use fieldops::notify;
use fieldops::prompts;
use fieldops::router::Orchestrator;
use fieldops::tool_protocol::ToolRegistry;
use fieldops::tool_protocols::FunctionToolProtocol;
use fieldops::users;
use fieldops::webhook::{self, WebhookConfig};
use fieldops::whatsapp::WhatsAppClient;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    fieldops::init_logger();

    let config = OrchestratorConfig::from_env()?;
    let system_prompt = prompts::load(&config.prompt_dir, prompts::ORCHESTRATOR_PROMPT)?;

    let client = Arc::new(GeminiClient::new_with_model_string(
        &config.gemini_api_key,
        &config.model,
    ));

    let registry = Arc::new(RwLock::new(ToolRegistry::empty()));
    {
        let mut reg = registry.write().await;
        reg.add_protocol(Arc::new(AgentProxy::field_service(
            &config.field_service_url,
        )))
        .await?;
        reg.add_protocol(Arc::new(AgentProxy::office(&config.office_url)))
            .await?;
    }

    let store = HistoryStore::open(&config.history_dir)?;
    let orchestrator = Arc::new(Orchestrator::new(client, system_prompt, Arc::clone(&registry), store)?);

    // WhatsApp is optional; the demo runs CLI-only without credentials.
    let whatsapp = match WhatsAppConfig::from_env() {
        Ok(wa_config) => Some((Arc::new(WhatsAppClient::new(&wa_config)), wa_config)),
        Err(e) => {
            log::warn!("WhatsApp disabled ({}); running CLI-only", e);
            None
        }
    };

    // The human-notification tool shares the orchestrator's history map.
    {
        let functions = FunctionToolProtocol::new();
        notify::register_communicate_tool(
            &functions,
            whatsapp.as_ref().map(|(client, _)| Arc::clone(client)),
            orchestrator.histories(),
        )
        .await;
        registry.write().await.add_protocol(Arc::new(functions)).await?;
    }

    let _webhook_handle = match &whatsapp {
        Some((wa_client, wa_config)) => {
            let handler_orchestrator = Arc::clone(&orchestrator);
            let handler: webhook::InboundHandler = Arc::new(move |from, content| {
                let orchestrator = Arc::clone(&handler_orchestrator);
                Box::pin(async move { orchestrator.process_message(&from, &content).await })
            });
            let handle = webhook::serve(
                WebhookConfig {
                    port: config.webhook_port,
                    verify_token: wa_config.verify_token.clone(),
                    app_secret: wa_config.app_secret.clone(),
                },
                handler,
                Arc::clone(wa_client) as Arc<dyn fieldops::whatsapp::OutboundSender>,
            )
            .await?;
            Some(handle)
        }
        None => None,
    };

    run_cli(&orchestrator).await?;
    Ok(())
}

/// Interactive loop: pick a role, then type messages until `quit`.
async fn run_cli(orchestrator: &Orchestrator) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Who are you?");
    println!("  1. Technician");
    println!("  2. Office Staff");
    print!("Select (1 or 2): ");
    std::io::stdout().flush()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let choice = lines.next_line().await?.unwrap_or_default();
    let user_id = if choice.trim() == "2" { "office" } else { "technician" };
    let user_name = users::lookup(user_id).map(|u| u.name).unwrap_or(user_id);

    println!("\nYou are: {}", user_name);
    println!("Ready for messages (CLI + WhatsApp). Type 'quit' to exit.\n");

    loop {
        print!("[{}] Message: ", user_id.to_uppercase());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        let response = orchestrator.process_message(user_id, input).await;
        println!("\n{}\n{}\n{}\n", "-".repeat(60), response, "-".repeat(60));
    }

    Ok(())
}

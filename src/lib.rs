//! # fieldops
//!
//! fieldops is a multi-agent customer-service workflow demo: an orchestrator
//! routes messages from humans (over the CLI or WhatsApp) to two specialist
//! agents: a **field service agent** that collects job reports from
//! technicians, and an **office agent** that applies deterministic billing
//! rules, persisting every conversation per user.
//!
//! The crate is layered as:
//!
//! * **Client seam**: [`ClientWrapper`] abstracts the hosted model behind a
//!   send-messages-get-reply interface, implemented for Gemini through its
//!   OpenAI-compatible endpoint ([`clients::gemini`]).
//! * **Orchestrator**: [`Orchestrator`] stamps each inbound message with the
//!   sender's identity, runs the model with its tools, and keeps per-user
//!   histories consistent in memory and on disk ([`history::HistoryStore`]).
//! * **Tools**: [`tool_protocol::ToolRegistry`] dispatches the model's
//!   `{"tool_call": ...}` requests to local functions
//!   ([`tool_protocols::FunctionToolProtocol`]) or to remote specialist
//!   agents over HTTP ([`agent_proxy::AgentProxy`]).
//! * **Channels**: an axum webhook server for inbound WhatsApp deliveries
//!   ([`webhook`]) and a Graph API client for outbound messages
//!   ([`whatsapp::WhatsAppClient`]).
//! * **Specialists**: [`specialists::field_service`] and
//!   [`specialists::office`], each hosted by [`agent_server`] as its own
//!   process.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::RwLock;
//! use fieldops::clients::gemini::GeminiClient;
//! use fieldops::history::HistoryStore;
//! use fieldops::tool_protocol::ToolRegistry;
//! use fieldops::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     fieldops::init_logger();
//!
//!     let client = Arc::new(GeminiClient::new_with_model_string(
//!         &std::env::var("GEMINI_API_KEY")?,
//!         "gemini-2.5-flash",
//!     ));
//!     let registry = Arc::new(RwLock::new(ToolRegistry::empty()));
//!     let store = HistoryStore::open("chat_history")?;
//!
//!     let orchestrator = Orchestrator::new(client, "You are a router.", registry, store)?;
//!     let reply = orchestrator.process_message("technician", "boiler fixed, 2 hours").await;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```
//!
//! Continue exploring the modules re-exported from the crate root: the
//! binaries (`orchestratord`, `field_agentd`, `office_agentd`) show the full
//! wiring.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Lightweight on purpose: the daemons opt in to `RUST_LOG` driven
/// diagnostics without committing library users to a logging backend.
///
/// ```rust
/// fieldops::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `fieldops` module.
pub mod fieldops;

// Re-exporting key items for easier external access.
pub use crate::fieldops::agent_proxy;
pub use crate::fieldops::agent_server;
pub use crate::fieldops::client_wrapper;
pub use crate::fieldops::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use crate::fieldops::clients;
pub use crate::fieldops::config;
pub use crate::fieldops::history;
pub use crate::fieldops::notify;
pub use crate::fieldops::prompts;
pub use crate::fieldops::router;
pub use crate::fieldops::router::Orchestrator;
pub use crate::fieldops::specialists;
pub use crate::fieldops::tool_protocol;
pub use crate::fieldops::tool_protocols;
pub use crate::fieldops::users;
pub use crate::fieldops::webhook;
pub use crate::fieldops::whatsapp;

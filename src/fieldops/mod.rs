// src/fieldops/mod.rs

pub mod agent_proxy;
pub mod agent_server;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod history;
pub mod notify;
pub mod prompts;
pub mod router;
pub mod specialists;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod users;
pub mod webhook;
pub mod whatsapp;

// Explicitly export the orchestrator so callers reach it as
// fieldops::Orchestrator instead of fieldops::router::Orchestrator.
pub use router::Orchestrator;

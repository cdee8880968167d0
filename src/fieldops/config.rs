//! Configuration for the workflow processes.
//!
//! Everything comes from environment variables, the same set for all three
//! daemons; each config struct reads only the variables it needs and fails
//! with a named-variable error when a required one is missing.

use std::env;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// A required environment variable was not set.
#[derive(Debug)]
pub struct MissingEnvVar(pub &'static str);

impl fmt::Display for MissingEnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "required environment variable {} is not set", self.0)
    }
}

impl Error for MissingEnvVar {}

fn required(name: &'static str) -> Result<String, MissingEnvVar> {
    env::var(name).map_err(|_| MissingEnvVar(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn port(name: &str, default: u16) -> u16 {
    optional(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Credentials and endpoints for the WhatsApp Cloud API.
#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    /// Bearer token for the Graph API.
    pub access_token: String,
    /// Sending phone number id (not the phone number itself).
    pub phone_number_id: String,
    /// Token echoed during Meta's webhook subscription handshake.
    pub verify_token: Option<String>,
    /// App secret used to verify `X-Hub-Signature-256` on inbound webhooks.
    /// When unset, signature verification is skipped (dev mode).
    pub app_secret: Option<String>,
    /// Graph API root, overridable for tests.
    pub api_base_url: String,
}

impl WhatsAppConfig {
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Ok(Self {
            access_token: required("WHATSAPP_ACCESS_TOKEN")?,
            phone_number_id: required("WHATSAPP_PHONE_NUMBER_ID")?,
            verify_token: optional("WHATSAPP_VERIFY_TOKEN"),
            app_secret: optional("WHATSAPP_APP_SECRET"),
            api_base_url: optional("WHATSAPP_API_BASE_URL")
                .unwrap_or_else(|| "https://graph.facebook.com/v22.0".to_string()),
        })
    }
}

/// Everything the orchestrator daemon needs to start.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// API key for the hosted model.
    pub gemini_api_key: String,
    /// Model identifier passed to the client wrapper.
    pub model: String,
    /// Directory holding per-user history documents.
    pub history_dir: PathBuf,
    /// Directory holding the system prompt files.
    pub prompt_dir: PathBuf,
    /// Port for the inbound WhatsApp webhook server.
    pub webhook_port: u16,
    /// Base URL of the field service agent service.
    pub field_service_url: String,
    /// Base URL of the office agent service.
    pub office_url: String,
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Ok(Self {
            gemini_api_key: required("GEMINI_API_KEY")?,
            model: optional("FIELDOPS_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            history_dir: optional("FIELDOPS_HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("chat_history")),
            prompt_dir: optional("FIELDOPS_PROMPT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("prompts")),
            webhook_port: port("WEBHOOK_PORT", 8010),
            field_service_url: optional("FIELD_SERVICE_AGENT_URL")
                .unwrap_or_else(|| "http://localhost:8001".to_string()),
            office_url: optional("OFFICE_AGENT_URL")
                .unwrap_or_else(|| "http://localhost:8002".to_string()),
        })
    }
}

/// Config for a specialist agent daemon.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub gemini_api_key: String,
    pub model: String,
    pub prompt_dir: PathBuf,
    pub port: u16,
}

impl AgentConfig {
    /// `port_var` lets the two specialist daemons pick distinct defaults
    /// (8001 field service, 8002 office).
    pub fn from_env(port_var: &str, default_port: u16) -> Result<Self, MissingEnvVar> {
        Ok(Self {
            gemini_api_key: required("GEMINI_API_KEY")?,
            model: optional("FIELDOPS_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            prompt_dir: optional("FIELDOPS_PROMPT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("prompts")),
            port: port(port_var, default_port),
        })
    }
}

//! Remote specialist agent proxies.
//!
//! A specialist agent runs as its own HTTP service (see
//! [`agent_server`](crate::agent_server)). The orchestrator reaches it through
//! an [`AgentProxy`], a stateless tool that forwards the message plus the
//! requesting user's serialized history to `POST {endpoint}/process` and hands
//! the text reply back to the model.
//!
//! Transport failures (connection refused, timeout, non-2xx) are reported as
//! the tool's reply text rather than hard errors: the orchestrator model is
//! expected to relay "the office agent is unreachable" to the human, not to
//! crash the turn.

use crate::tool_protocol::{
    ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolResult,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::error::Error;
use std::time::Duration;

/// Protocol name shared by all remote agent proxies. The router keys on this
/// to know which tool calls need the conversation context injected.
pub const REMOTE_AGENT_PROTOCOL: &str = "remote-agent";

/// Proxy for one remote specialist agent, exposed as a single tool.
pub struct AgentProxy {
    tool_name: String,
    description: String,
    endpoint: String,
    client: reqwest::Client,
}

impl AgentProxy {
    /// `endpoint` is the service base URL, e.g. `http://localhost:8001`.
    pub fn new(
        tool_name: impl Into<String>,
        description: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.into();
        Self {
            tool_name: tool_name.into(),
            description: description.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Proxy for the field service specialist.
    pub fn field_service(endpoint: impl Into<String>) -> Self {
        Self::new(
            "field_service_agent",
            "Handles messages from technicians: job completion reports, customer \
             lookups, and field work documentation. Use for any message from a user \
             with role 'technician'.",
            endpoint,
        )
    }

    /// Proxy for the office/billing specialist.
    pub fn office(endpoint: impl Into<String>) -> Self {
        Self::new(
            "office_agent",
            "Handles billing, compliance, and administrative tasks: office staff \
             messages, completed-job handoffs from the field, invoice validation, \
             and escalations to office humans.",
            endpoint,
        )
    }

    /// Forward a message (plus serialized history) to the remote agent and
    /// return its text reply. Transport problems become explanatory text.
    pub async fn call(&self, message: &str, context: &JsonValue) -> String {
        let url = format!("{}/process", self.endpoint);
        let payload = serde_json::json!({
            "message": message,
            "context": context,
        });

        let preview: String = message.chars().take(80).collect();
        log::info!("[TOOL] calling {} at {}: {}", self.tool_name, url, preview);

        let response = match self.client.post(&url).json(&payload).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                let msg = format!("{} timeout (exceeded 30 seconds)", self.tool_name);
                log::warn!("[TOOL] {}", msg);
                return msg;
            }
            Err(e) if e.is_connect() => {
                let msg = format!(
                    "Cannot connect to {} (is it running at {}?)",
                    self.tool_name, self.endpoint
                );
                log::warn!("[TOOL] {}: {}", msg, e);
                return msg;
            }
            Err(e) => {
                let msg = format!("Error calling {}: {}", self.tool_name, e);
                log::warn!("[TOOL] {}", msg);
                return msg;
            }
        };

        if !response.status().is_success() {
            let msg = format!(
                "{} failed to respond (HTTP {})",
                self.tool_name,
                response.status().as_u16()
            );
            log::warn!("[TOOL] {}", msg);
            return msg;
        }

        match response.json::<JsonValue>().await {
            Ok(body) => extract_reply_text(&body),
            Err(e) => format!("{} returned an unreadable body: {}", self.tool_name, e),
        }
    }
}

/// The agent server wraps text replies in `{"message": "...", "status": "success"}`,
/// but older services return a bare string or arbitrary JSON. Accept all three.
pub fn extract_reply_text(body: &JsonValue) -> String {
    if let Some(text) = body.get("message").and_then(|m| m.as_str()) {
        return text.to_string();
    }
    if let Some(text) = body.as_str() {
        return text.to_string();
    }
    body.to_string()
}

#[async_trait]
impl ToolProtocol for AgentProxy {
    async fn execute(
        &self,
        _tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let message = parameters
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        let context = parameters
            .get("context")
            .cloned()
            .unwrap_or_else(|| JsonValue::Array(Vec::new()));

        let reply = self.call(&message, &context).await;
        Ok(ToolResult::success(serde_json::json!({ "message": reply })))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![ToolMetadata::new(
            self.tool_name.clone(),
            self.description.clone(),
        )
        .with_parameter(
            ToolParameter::new("message", ToolParameterType::String)
                .with_description("The message for the specialist agent to process")
                .required(),
        )])
    }

    fn protocol_name(&self) -> &str {
        REMOTE_AGENT_PROTOCOL
    }
}

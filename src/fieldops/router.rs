//! Message orchestrator.
//!
//! The [`Orchestrator`] is the hub of the workflow: every inbound message,
//! whether it arrived over the CLI or the WhatsApp webhook, goes through
//! [`Orchestrator::process_message`]. It resolves the sender against the user
//! registry, stamps the message with identity context, runs the model with the
//! registered tools (specialist agent delegates plus the human-notification
//! tool), and keeps every user's history consistent on disk.
//!
//! Tool use follows the JSON convention the model is instructed with: a
//! response containing `{"tool_call": {"name": "...", "parameters": {...}}}`
//! triggers a registry dispatch, the result is fed back as a follow-up user
//! message, and the model is called again, up to [`MAX_TOOL_ITERATIONS`]
//! rounds per inbound message.

use crate::agent_proxy::REMOTE_AGENT_PROTOCOL;
use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::history::{ChatTurn, HistoryStore};
use crate::tool_protocol::ToolRegistry;
use crate::users;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Upper bound on tool-call rounds for a single inbound message.
pub const MAX_TOOL_ITERATIONS: usize = 5;

/// Shared per-user history map. The notification tool mutates other users'
/// histories mid-call, so the orchestrator and its tools hold the same handle.
pub type SharedHistories = Arc<RwLock<HashMap<String, Vec<ChatTurn>>>>;

/// A tool invocation extracted from model output.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub parameters: serde_json::Value,
}

/// Routes user messages through the model and its tools.
pub struct Orchestrator {
    client: Arc<dyn ClientWrapper>,
    system_prompt: String,
    registry: Arc<RwLock<ToolRegistry>>,
    histories: SharedHistories,
    store: Arc<HistoryStore>,
}

impl Orchestrator {
    /// Build an orchestrator over an opened history store, loading every
    /// existing history document into memory.
    pub fn new(
        client: Arc<dyn ClientWrapper>,
        system_prompt: impl Into<String>,
        registry: Arc<RwLock<ToolRegistry>>,
        store: HistoryStore,
    ) -> std::io::Result<Self> {
        let loaded = store.load_all_histories()?;
        log::info!(
            "loaded {} conversation(s) from {}",
            loaded.len(),
            store.dir().display()
        );
        Ok(Self {
            client,
            system_prompt: system_prompt.into(),
            registry,
            histories: Arc::new(RwLock::new(loaded)),
            store: Arc::new(store),
        })
    }

    /// Handle to the shared history map, for wiring history-aware tools.
    pub fn histories(&self) -> SharedHistories {
        Arc::clone(&self.histories)
    }

    /// Process one inbound message and return the reply text.
    ///
    /// Unknown senders get an explanatory reply and nothing is recorded.
    /// Internal failures are logged and surface as an apologetic reply; this
    /// method never panics and never drops a turn that was already appended.
    pub async fn process_message(&self, user_id: &str, text: &str) -> String {
        let Some(user) = users::lookup(user_id) else {
            log::warn!("message from unregistered user id {:?}", user_id);
            return "Sorry, I don't recognize you. This assistant only serves \
                    registered field service and office staff."
                .to_string();
        };

        let prefixed = format!("[User: {}, Role: {}]\n{}", user.name, user.role, text);
        log::info!("[{}] processing message from {}", user.role, user.name);

        {
            let mut histories = self.histories.write().await;
            histories
                .entry(user_id.to_string())
                .or_default()
                .push(ChatTurn::user(prefixed));
        }

        let reply = match self.run_model_loop(user_id).await {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("model loop failed for {}: {}", user_id, e);
                "Sorry, something went wrong while processing your message. \
                 Please try again."
                    .to_string()
            }
        };

        {
            let mut histories = self.histories.write().await;
            histories
                .entry(user_id.to_string())
                .or_default()
                .push(ChatTurn::model(reply.clone()));
        }

        self.persist_all().await;
        reply
    }

    /// Drop one user's conversation, in memory and on disk.
    pub async fn reset_conversation(&self, user_id: &str) -> std::io::Result<()> {
        self.histories.write().await.remove(user_id);
        self.store.clear_history(user_id)
    }

    /// Run the send/parse/execute loop until the model answers without a tool
    /// call or the iteration cap is reached.
    async fn run_model_loop(
        &self,
        user_id: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let system = {
            let registry = self.registry.read().await;
            augment_system_prompt(&self.system_prompt, &registry)
        };

        let mut messages = vec![Message {
            role: Role::System,
            content: system,
        }];
        {
            let histories = self.histories.read().await;
            if let Some(turns) = histories.get(user_id) {
                for turn in turns {
                    messages.push(Message {
                        role: turn.role.clone(),
                        content: turn.text.clone(),
                    });
                }
            }
        }

        // Remote specialists get the requesting user's serialized history as
        // call context; snapshot it once, it only grows after this turn.
        let snapshot = self.history_snapshot(user_id).await;
        run_tool_loop(
            Arc::clone(&self.client),
            &self.registry,
            messages,
            Some(snapshot),
        )
        .await
    }

    async fn history_snapshot(&self, user_id: &str) -> serde_json::Value {
        let histories = self.histories.read().await;
        match histories.get(user_id) {
            Some(turns) => {
                serde_json::to_value(turns).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
            }
            None => serde_json::Value::Array(Vec::new()),
        }
    }

    /// Write every in-memory history back to the store. Failures are logged
    /// per user so one bad document never blocks the others.
    async fn persist_all(&self) {
        let histories = self.histories.read().await;
        for (user_id, turns) in histories.iter() {
            if let Err(e) = self.store.save_history(user_id, turns) {
                log::error!("failed to persist history for {}: {}", user_id, e);
            }
        }
    }
}

/// The send/parse/execute loop shared by the orchestrator and the specialist
/// agents: call the model, dispatch any `{"tool_call": ...}` it emits through
/// the registry, feed the result back, repeat until a plain answer or the
/// iteration cap.
///
/// `remote_context` is injected as the `context` parameter for tools served by
/// the remote-agent protocol, so specialists see the caller's conversation.
pub async fn run_tool_loop(
    client: Arc<dyn ClientWrapper>,
    registry: &RwLock<ToolRegistry>,
    mut messages: Vec<Message>,
    remote_context: Option<serde_json::Value>,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let mut iterations = 0usize;
    loop {
        let response = client.send_message(&messages).await?;
        let content = response.content.clone();

        let Some(call) = parse_tool_call(&content) else {
            return Ok(content);
        };
        if iterations >= MAX_TOOL_ITERATIONS {
            // Never hand raw tool-call JSON to the human.
            log::warn!("tool iteration cap reached after {} rounds", iterations);
            return Ok(
                "I couldn't finish this request within the allowed number of tool \
                 steps. Please rephrase or try again. \
                 [Warning: Maximum tool iterations reached]"
                    .to_string(),
            );
        }
        iterations += 1;

        log::info!("[TOOL] model requested {} (round {})", call.name, iterations);

        let mut parameters = call.parameters.clone();
        let feedback = {
            let registry = registry.read().await;
            if registry.protocol_of(&call.name) == Some(REMOTE_AGENT_PROTOCOL) {
                if let (Some(obj), Some(context)) = (parameters.as_object_mut(), &remote_context) {
                    obj.insert("context".to_string(), context.clone());
                }
            }
            match registry.execute_tool(&call.name, parameters).await {
                Ok(result) if result.success => format!(
                    "Tool '{}' executed successfully. Result: {}",
                    call.name,
                    serde_json::to_string_pretty(&result.output)
                        .unwrap_or_else(|_| format!("{:?}", result.output))
                ),
                Ok(result) => {
                    let err = result.error.unwrap_or_else(|| "Unknown error".to_string());
                    log::warn!("[TOOL] {} reported failure: {}", call.name, err);
                    format!("Tool '{}' failed. Error: {}", call.name, err)
                }
                Err(e) => {
                    log::warn!("[TOOL] {} dispatch failed: {}", call.name, e);
                    format!("Tool '{}' failed. Error: {}", call.name, e)
                }
            }
        };

        // The tool round stays in the transient message array; only the final
        // reply is committed to persisted history.
        messages.push(Message {
            role: Role::Assistant,
            content,
        });
        messages.push(Message {
            role: Role::User,
            content: feedback,
        });
    }
}

/// Append tool descriptions and the invocation convention to a system prompt.
pub fn augment_system_prompt(base: &str, registry: &ToolRegistry) -> String {
    let tools = registry.list_tools();
    if tools.is_empty() {
        return base.to_string();
    }

    let mut prompt = format!("{}\n\nYou have access to the following tools:\n", base);
    for meta in tools {
        prompt.push_str(&format!("- {}: {}\n", meta.name, meta.description));
        for param in &meta.parameters {
            prompt.push_str(&format!(
                "    - {} ({:?}{}): {}\n",
                param.name,
                param.param_type,
                if param.required { ", required" } else { "" },
                param.description.as_deref().unwrap_or("")
            ));
        }
    }
    prompt.push_str(
        "\nTo use a tool, respond with a JSON object in the following format:\n\
         {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
         After tool execution, I'll provide the result and you can continue.\n",
    );
    prompt
}

/// Scan model output for the first `{"tool_call": ...}` fragment.
///
/// Uses brace counting rather than whole-response JSON parsing, so a tool
/// call wrapped in prose is still found.
pub fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let start_idx = response.find("{\"tool_call\"")?;

    let mut brace_count = 0i32;
    let mut end_idx = start_idx;
    for (offset, ch) in response[start_idx..].char_indices() {
        match ch {
            '{' => brace_count += 1,
            '}' => {
                brace_count -= 1;
                if brace_count == 0 {
                    end_idx = start_idx + offset + 1;
                    break;
                }
            }
            _ => {}
        }
    }
    if end_idx <= start_idx {
        return None;
    }

    let parsed: serde_json::Value = serde_json::from_str(&response[start_idx..end_idx]).ok()?;
    let obj = parsed.get("tool_call")?;
    let name = obj.get("name")?.as_str()?;
    let parameters = obj.get("parameters")?.clone();
    Some(ToolCall {
        name: name.to_string(),
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tool_call_embedded_in_prose() {
        let response = r#"Let me delegate that.
{"tool_call": {"name": "field_service_agent", "parameters": {"message": "boiler fixed"}}}
I'll get back to you."#;
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.name, "field_service_agent");
        assert_eq!(call.parameters["message"], "boiler fixed");
    }

    #[test]
    fn plain_text_has_no_tool_call() {
        assert!(parse_tool_call("All done, the office has been notified.").is_none());
    }

    #[test]
    fn nested_parameter_objects_survive_brace_counting() {
        let response = r#"{"tool_call": {"name": "office_agent", "parameters": {"message": "job", "details": {"hours": 2}}}}"#;
        let call = parse_tool_call(response).unwrap();
        assert_eq!(call.parameters["details"]["hours"], 2);
    }

    #[test]
    fn malformed_fragment_is_ignored() {
        assert!(parse_tool_call(r#"{"tool_call": {"name": "x""#).is_none());
        assert!(parse_tool_call(r#"{"tool_call": "not an object"}"#).is_none());
    }
}

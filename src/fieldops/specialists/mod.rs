//! Specialist agents hosted behind the agent HTTP server.
//!
//! A [`SpecialistAgent`] is stateless across requests: every `/process` call
//! carries the requesting user's history as context, and the agent rebuilds
//! its message array from scratch. Business behavior comes from the system
//! prompt plus a small fixed toolset of deterministic functions.

pub mod field_service;
pub mod office;

use crate::agent_server::AgentHandler;
use crate::client_wrapper::{ClientWrapper, Message, Role};
use crate::history::ChatTurn;
use crate::router::{augment_system_prompt, run_tool_loop};
use crate::tool_protocol::ToolRegistry;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A prompt-plus-toolset agent that processes one message at a time.
pub struct SpecialistAgent {
    name: String,
    client: Arc<dyn ClientWrapper>,
    system_prompt: String,
    registry: Arc<RwLock<ToolRegistry>>,
}

impl SpecialistAgent {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
        system_prompt: impl Into<String>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            system_prompt: system_prompt.into(),
            registry: Arc::new(RwLock::new(registry)),
        }
    }
}

#[async_trait]
impl AgentHandler for SpecialistAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, message: &str, context: &JsonValue) -> String {
        let system = {
            let registry = self.registry.read().await;
            augment_system_prompt(&self.system_prompt, &registry)
        };

        let mut messages = vec![Message {
            role: Role::System,
            content: system,
        }];
        // Context turns that don't parse are skipped rather than failing the
        // request; the caller may be an older orchestrator.
        if let Some(turns) = context.as_array() {
            for turn in turns {
                if let Ok(turn) = serde_json::from_value::<ChatTurn>(turn.clone()) {
                    messages.push(Message {
                        role: turn.role,
                        content: turn.text,
                    });
                }
            }
        }
        messages.push(Message {
            role: Role::User,
            content: message.to_string(),
        });

        match run_tool_loop(Arc::clone(&self.client), &self.registry, messages, None).await {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("[{}] processing failed: {}", self.name, e);
                format!(
                    "Sorry, I encountered an error processing your request: {}",
                    e
                )
            }
        }
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Mutex;

/// A ClientWrapper is a wrapper around a specific hosted LLM service.
/// It provides a common interface to interact with the model: the full
/// conversation goes in, one assistant message comes out. It keeps no
/// conversation state of its own; the orchestrator owns the history and
/// hands the relevant slice to the client on every call.

/// Represents the possible roles for a message.
///
/// Serialized with Gemini role names (`system` / `user` / `model`) because the
/// persisted history documents and the `/process` context payloads follow the
/// Gemini convention.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    // set by the developer to steer the model's responses
    System,
    // a message sent by a human user (or app user)
    User,
    // content generated by the model in response to a user message
    #[serde(rename = "model")]
    Assistant,
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

/// Trait defining the interface to interact with various LLM services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the full message array to the LLM and get a single assistant
    /// response back.
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Identifier of the backing model, for logging.
    fn model_name(&self) -> &str;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl returns None so wrappers without accounting don't break.
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    /// ClientWrapper implementations supporting TokenUsage tracking should
    /// return their slot by overriding this method.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}

use crate::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use crate::clients::common::send_and_track;
use async_trait::async_trait;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use std::error::Error;
use std::sync::Mutex;

/// Google Gemini client, reached through the OpenAI-compatible endpoint of the
/// Generative Language API. All agents in the workflow (orchestrator, field
/// service, office) talk to the model through this wrapper.
pub struct GeminiClient {
    client: openai_rust::Client,
    pub model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

/// Gemini chat models the workflow has been exercised with.
pub enum Model {
    Gemini20Flash,
    Gemini20FlashLite001,
    Gemini25Flash,
    Gemini25Pro,
}

pub fn model_to_string(model: Model) -> String {
    match model {
        Model::Gemini20Flash => "gemini-2.0-flash".to_string(),
        Model::Gemini20FlashLite001 => "gemini-2.0-flash-lite-001".to_string(),
        Model::Gemini25Flash => "gemini-2.5-flash".to_string(),
        Model::Gemini25Pro => "gemini-2.5-pro".to_string(),
    }
}

impl GeminiClient {
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        GeminiClient {
            client: openai_rust::Client::new_with_base_url(
                secret_key,
                "https://generativelanguage.googleapis.com/v1beta/",
            ),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }

    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_string(secret_key, &model_to_string(model))
    }

    /// This function is used to create a GeminiClient with a custom base URL.
    /// The default base URL is "<https://generativelanguage.googleapis.com/v1beta/>"
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        GeminiClient {
            client: openai_rust::Client::new_with_base_url(secret_key, base_url),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ClientWrapper for GeminiClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        // Convert to openai_rust chat::Message
        let mut formatted_messages = Vec::with_capacity(messages.len());
        for msg in messages {
            formatted_messages.push(chat::Message {
                role: match msg.role {
                    Role::System => "system".to_owned(),
                    Role::User => "user".to_owned(),
                    Role::Assistant => "assistant".to_owned(),
                },
                content: msg.content.clone(),
            });
        }

        let url_path = Some("/v1beta/chat/completions".to_string());
        let content = send_and_track(
            &self.client,
            &self.model,
            formatted_messages,
            url_path,
            &self.token_usage,
        )
        .await?;

        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    /// This function is used to get the token usage for the last request,
    /// otherwise there will be no tracking for token usage available because
    /// the default trait implementation of `usage_slot()` returns `None`.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

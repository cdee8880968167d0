//! Outbound WhatsApp Cloud API client.
//!
//! Thin reqwest wrapper over the Graph API messages endpoint. Payload
//! construction is kept in pure functions so the Cloud API limits (three reply
//! buttons, 20-character titles) are unit-testable without the network.

use crate::config::WhatsAppConfig;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::fmt;
use std::path::Path;

/// Cloud API limit: reply buttons per interactive message.
const MAX_BUTTONS: usize = 3;
/// Cloud API limit: characters per button title.
const MAX_BUTTON_TITLE: usize = 20;

/// Outbound channel failure.
#[derive(Debug)]
pub enum ChannelError {
    /// The request never completed (DNS, connect, timeout, body I/O).
    Request(String),
    /// The API answered with a non-success status.
    Status(u16, String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Request(msg) => write!(f, "WhatsApp request failed: {}", msg),
            ChannelError::Status(code, body) => {
                write!(f, "WhatsApp API returned HTTP {}: {}", code, body)
            }
        }
    }
}

impl Error for ChannelError {}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        ChannelError::Request(e.to_string())
    }
}

/// One interactive reply button.
#[derive(Clone, Debug, PartialEq)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl Button {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Seam for sending replies, so the webhook server can be tested with a
/// recording stub instead of the Graph API.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), ChannelError>;

    /// Acknowledge an inbound message (read receipt). No-op by default.
    async fn mark_read(&self, _message_id: &str) {}
}

/// Graph API client bound to one sending phone number.
pub struct WhatsAppClient {
    http: reqwest::Client,
    access_token: String,
    phone_number_id: String,
    api_base_url: String,
}

impl WhatsAppClient {
    pub fn new(config: &WhatsAppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base_url, self.phone_number_id)
    }

    async fn post_message(&self, payload: JsonValue) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status(status.as_u16(), body));
        }
        Ok(())
    }

    /// Send a plain text message.
    pub async fn send(&self, to: &str, text: &str) -> Result<(), ChannelError> {
        log::info!("[WHATSAPP] sending text to {}", to);
        self.post_message(text_payload(to, text)).await
    }

    /// Send a text message with interactive reply buttons. Falls back to a
    /// plain text message when `buttons` is empty.
    pub async fn send_with_buttons(
        &self,
        to: &str,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), ChannelError> {
        if buttons.is_empty() {
            return self.send(to, text).await;
        }
        log::info!("[WHATSAPP] sending {} button(s) to {}", buttons.len(), to);
        self.post_message(interactive_payload(to, text, buttons))
            .await
    }

    /// Mark an inbound message as read (double blue check). Best effort: a
    /// failure is logged and swallowed, read receipts are cosmetic.
    pub async fn mark_as_read(&self, message_id: &str) {
        let payload = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });
        if let Err(e) = self.post_message(payload).await {
            log::warn!("[WHATSAPP] mark_as_read failed for {}: {}", message_id, e);
        }
    }

    /// Resolve a media id to its short-lived download URL.
    pub async fn get_media_url(&self, media_id: &str) -> Result<String, ChannelError> {
        let url = format!("{}/{}", self.api_base_url, media_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status(status.as_u16(), body));
        }

        let body: JsonValue = response.json().await?;
        body.get("url")
            .and_then(|u| u.as_str())
            .map(|u| u.to_string())
            .ok_or_else(|| {
                ChannelError::Request(format!("no url in media response for {}", media_id))
            })
    }

    /// Download media content to a local file. The URL must come from
    /// [`get_media_url`](WhatsAppClient::get_media_url); the bearer token is
    /// required on the download request as well.
    pub async fn download_media(&self, url: &str, dest: &Path) -> Result<(), ChannelError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status(status.as_u16(), body));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ChannelError::Request(format!("writing {}: {}", dest.display(), e)))
    }
}

#[async_trait]
impl OutboundSender for WhatsAppClient {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), ChannelError> {
        self.send(to, text).await
    }

    async fn mark_read(&self, message_id: &str) {
        self.mark_as_read(message_id).await;
    }
}

/// Build the payload for a plain text message.
pub fn text_payload(to: &str, text: &str) -> JsonValue {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": text },
    })
}

/// Build the payload for an interactive reply-button message, clamping to the
/// Cloud API limits: at most three buttons, titles cut to 20 characters.
pub fn interactive_payload(to: &str, text: &str, buttons: &[Button]) -> JsonValue {
    let rendered: Vec<JsonValue> = buttons
        .iter()
        .take(MAX_BUTTONS)
        .map(|b| {
            let title: String = b.title.chars().take(MAX_BUTTON_TITLE).collect();
            json!({
                "type": "reply",
                "reply": { "id": b.id, "title": title },
            })
        })
        .collect();

    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": text },
            "action": { "buttons": rendered },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_shape() {
        let payload = text_payload("491718398683", "job received");
        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["to"], "491718398683");
        assert_eq!(payload["text"]["body"], "job received");
    }

    #[test]
    fn interactive_payload_caps_buttons_at_three() {
        let buttons = vec![
            Button::new("a", "A"),
            Button::new("b", "B"),
            Button::new("c", "C"),
            Button::new("d", "D"),
        ];
        let payload = interactive_payload("19712187997", "choose", &buttons);
        let rendered = payload["interactive"]["action"]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(rendered.len(), 3);
        assert_eq!(rendered[2]["reply"]["id"], "c");
    }

    #[test]
    fn interactive_payload_truncates_long_titles() {
        let buttons = vec![Button::new(
            "approve_goodwill",
            "Approve as goodwill gesture (no charge)",
        )];
        let payload = interactive_payload("19712187997", "billing conflict", &buttons);
        let title = payload["interactive"]["action"]["buttons"][0]["reply"]["title"]
            .as_str()
            .unwrap();
        assert_eq!(title.chars().count(), 20);
        assert_eq!(title, "Approve as goodwill ");
    }
}

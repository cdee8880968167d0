//! Human notification tool for the orchestrator.
//!
//! Lets the model push a WhatsApp message to every registered user holding a
//! role ("technician" or "office"), optionally with reply buttons. The sent
//! text is appended as a model turn to each recipient's history so their next
//! inbound message sees the question it is answering.

use crate::history::ChatTurn;
use crate::router::SharedHistories;
use crate::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolResult};
use crate::tool_protocols::FunctionToolProtocol;
use crate::users;
use crate::whatsapp::{Button, WhatsAppClient};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// Parse the tool's `buttons` parameter: an array of `{id, title}` objects.
/// Malformed entries are dropped.
pub fn parse_buttons(value: &JsonValue) -> Vec<Button> {
    value
        .as_array()
        .map(|buttons| {
            buttons
                .iter()
                .filter_map(|b| {
                    let id = b.get("id").and_then(|v| v.as_str())?;
                    let title = b.get("title").and_then(|v| v.as_str())?;
                    Some(Button::new(id, title))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Register `communicate_with_human` on the given protocol.
///
/// Without a WhatsApp client (CLI-only runs) the message is logged instead of
/// sent, but histories are still updated so the conversation stays coherent.
pub async fn register_communicate_tool(
    functions: &FunctionToolProtocol,
    whatsapp: Option<Arc<WhatsAppClient>>,
    histories: SharedHistories,
) {
    functions
        .register_tool(
            ToolMetadata::new(
                "communicate_with_human",
                "Send a WhatsApp message to a technician or office staff member. Use \
                 this when you need to reach a human other than the one you are \
                 currently talking to, or to ask a human a question with buttons.",
            )
            .with_parameter(
                ToolParameter::new("recipient_role", ToolParameterType::String)
                    .with_description("Who to message: \"technician\" or \"office\"")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("message", ToolParameterType::String)
                    .with_description("The message to send")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("buttons", ToolParameterType::Array).with_description(
                    "Optional reply buttons, e.g. [{\"id\": \"yes\", \"title\": \"Yes\"}]",
                ),
            ),
            Arc::new(move |params| {
                let whatsapp = whatsapp.clone();
                let histories = Arc::clone(&histories);
                Box::pin(async move {
                    let role = params["recipient_role"].as_str().unwrap_or("").to_string();
                    let message = params["message"].as_str().unwrap_or("").to_string();
                    let buttons = parse_buttons(&params["buttons"]);

                    if users::whatsapp_numbers_for_role(&role).is_empty()
                        && users::lookup(&role).is_none()
                    {
                        return Ok(ToolResult::failure(format!(
                            "no registered users with role {:?}",
                            role
                        )));
                    }

                    // Record the outbound message on every matching user's
                    // history before sending, so a quick reply never races an
                    // unrecorded question.
                    {
                        let mut map = histories.write().await;
                        for user_id in users::user_ids() {
                            if users::lookup(user_id).map(|u| u.role) == Some(role.as_str()) {
                                map.entry(user_id.to_string())
                                    .or_default()
                                    .push(ChatTurn::model(message.clone()));
                            }
                        }
                    }

                    let mut failures = Vec::new();
                    match &whatsapp {
                        Some(client) => {
                            for number in users::whatsapp_numbers_for_role(&role) {
                                let sent = if buttons.is_empty() {
                                    client.send(number, &message).await
                                } else {
                                    client.send_with_buttons(number, &message, &buttons).await
                                };
                                if let Err(e) = sent {
                                    log::error!("notify {} failed: {}", number, e);
                                    failures.push(number.to_string());
                                }
                            }
                        }
                        None => {
                            log::info!("[NOTIFY:{}] {}", role, message);
                        }
                    }

                    if failures.is_empty() {
                        Ok(ToolResult::success(json!({
                            "status": "sent",
                            "recipient": role,
                            "note": "Message delivered. The reply will arrive through the normal input loop.",
                        })))
                    } else {
                        Ok(ToolResult::failure(format!(
                            "failed to deliver to: {}",
                            failures.join(", ")
                        )))
                    }
                })
            }),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buttons_parse_and_skip_malformed_entries() {
        let value = json!([
            {"id": "yes", "title": "Yes"},
            {"id": "no"},
            "garbage",
            {"id": "later", "title": "Ask me later"},
        ]);
        let buttons = parse_buttons(&value);
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0], Button::new("yes", "Yes"));
        assert_eq!(buttons[1].id, "later");
    }

    #[test]
    fn missing_buttons_value_is_empty() {
        assert!(parse_buttons(&JsonValue::Null).is_empty());
    }
}

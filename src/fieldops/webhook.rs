//! Inbound WhatsApp webhook server.
//!
//! Receives Meta Cloud API webhook deliveries for the orchestrator:
//!
//! - `GET /whatsapp/webhook`: subscription handshake (echo `hub.challenge`).
//! - `POST /whatsapp/webhook`: message deliveries. The raw body is
//!   authenticated against `X-Hub-Signature-256` when an app secret is
//!   configured, message ids are deduplicated (Meta delivers at least once),
//!   and each extracted message is handed to the registered async handler.
//!   The handler's reply goes back out through the [`OutboundSender`] seam.
//! - `GET /` and `GET /health`: banner and liveness probes.
//!
//! Payload parsing and signature verification are pure functions, separate
//! from the axum plumbing, so they are testable without a socket.

use crate::whatsapp::OutboundSender;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde_json::{json, Value as JsonValue};
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Async callback invoked with `(from_number, content)`; returns the reply
/// text to send back to the sender.
pub type InboundHandler =
    Arc<dyn Fn(String, String) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// One user message extracted from a webhook delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    /// WhatsApp message id, used for dedup and read receipts.
    pub id: String,
    /// Sender phone number.
    pub from: String,
    /// Normalized text content (see [`extract_messages`]).
    pub content: String,
}

/// Webhook server settings.
#[derive(Clone)]
pub struct WebhookConfig {
    pub port: u16,
    /// Token Meta echoes back during the subscription handshake.
    pub verify_token: Option<String>,
    /// App secret for `X-Hub-Signature-256`. When unset, signatures are not
    /// checked and a warning is logged at startup.
    pub app_secret: Option<String>,
}

/// Running webhook server handle.
pub struct WebhookHandle {
    pub addr: SocketAddr,
    join: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl WebhookHandle {
    /// Stop accepting webhook deliveries.
    pub fn shutdown(&self) {
        self.join.abort();
    }
}

/// Compute `sha256=<hex hmac>` over the raw body and compare it with the
/// header value in constant time.
pub fn verify_signature(app_secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(received_hex) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(received) = hex::decode(received_hex) else {
        return false;
    };

    let mut mac = match Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.ct_eq(received.as_slice()).into()
}

/// Walk a webhook payload and pull out every user message.
///
/// Content normalization per message type:
/// - `text` → the body text
/// - `button` → the button payload
/// - `interactive` → `button_reply.id` or `list_reply.id`
/// - media (`image`, `audio`, `video`, `document`, `sticker`) →
///   `{"type": ..., "media_id": ...}` marker JSON
/// - `location` → `[LOCATION:lat,lon]`
///
/// Delivery `statuses` entries are logged and skipped; unsupported message
/// types are dropped with a log line.
pub fn extract_messages(payload: &JsonValue) -> Vec<InboundMessage> {
    let mut out = Vec::new();

    let entries = payload
        .get("entry")
        .and_then(|e| e.as_array())
        .cloned()
        .unwrap_or_default();
    for entry in &entries {
        let changes = entry
            .get("changes")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();
        for change in &changes {
            let Some(value) = change.get("value") else {
                continue;
            };

            if let Some(statuses) = value.get("statuses").and_then(|s| s.as_array()) {
                for status in statuses {
                    log::debug!(
                        "[WEBHOOK] delivery status {} for {}",
                        status.get("status").and_then(|s| s.as_str()).unwrap_or("?"),
                        status.get("id").and_then(|s| s.as_str()).unwrap_or("?"),
                    );
                }
            }

            let messages = value
                .get("messages")
                .and_then(|m| m.as_array())
                .cloned()
                .unwrap_or_default();
            for message in &messages {
                let (Some(id), Some(from)) = (
                    message.get("id").and_then(|v| v.as_str()),
                    message.get("from").and_then(|v| v.as_str()),
                ) else {
                    continue;
                };
                let Some(content) = extract_content(message) else {
                    continue;
                };
                out.push(InboundMessage {
                    id: id.to_string(),
                    from: from.to_string(),
                    content,
                });
            }
        }
    }

    out
}

fn extract_content(message: &JsonValue) -> Option<String> {
    let msg_type = message.get("type").and_then(|t| t.as_str())?;
    match msg_type {
        "text" => message
            .get("text")
            .and_then(|t| t.get("body"))
            .and_then(|b| b.as_str())
            .map(|s| s.to_string()),
        "button" => message
            .get("button")
            .and_then(|b| b.get("payload"))
            .and_then(|p| p.as_str())
            .map(|s| s.to_string()),
        "interactive" => {
            let interactive = message.get("interactive")?;
            interactive
                .get("button_reply")
                .or_else(|| interactive.get("list_reply"))
                .and_then(|r| r.get("id"))
                .and_then(|id| id.as_str())
                .map(|s| s.to_string())
        }
        "image" | "audio" | "video" | "document" | "sticker" => {
            let media_id = message
                .get(msg_type)
                .and_then(|m| m.get("id"))
                .and_then(|id| id.as_str())?;
            Some(json!({"type": msg_type, "media_id": media_id}).to_string())
        }
        "location" => {
            let location = message.get("location")?;
            let lat = location.get("latitude").and_then(|v| v.as_f64())?;
            let lon = location.get("longitude").and_then(|v| v.as_f64())?;
            Some(format!("[LOCATION:{},{}]", lat, lon))
        }
        other => {
            log::info!("[WEBHOOK] dropping unsupported message type {:?}", other);
            None
        }
    }
}

/// Build the webhook router. Exposed separately from [`serve`] so tests can
/// drive it with `tower::util::ServiceExt::oneshot`.
pub fn build_router(
    config: WebhookConfig,
    handler: InboundHandler,
    outbound: Arc<dyn OutboundSender>,
) -> Router {
    let seen_ids: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let verify_token = Arc::new(config.verify_token);
    let app_secret = Arc::new(config.app_secret);

    if app_secret.is_none() {
        log::warn!("[WEBHOOK] no app secret configured; signature verification disabled");
    }

    Router::new()
        .route(
            "/",
            get(|| async { Json(json!({"service": "fieldops orchestrator webhook"})) }),
        )
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/whatsapp/webhook",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let verify_token = Arc::clone(&verify_token);
                async move { handshake(&params, verify_token.as_deref()) }
            }),
        )
        .route(
            "/whatsapp/webhook",
            post(move |headers: HeaderMap, body: Bytes| {
                let handler = Arc::clone(&handler);
                let outbound = Arc::clone(&outbound);
                let seen_ids = Arc::clone(&seen_ids);
                let app_secret = Arc::clone(&app_secret);
                async move {
                    receive_delivery(&headers, &body, app_secret.as_deref(), seen_ids, handler, outbound)
                        .await
                }
            }),
        )
}

fn handshake(params: &HashMap<String, String>, verify_token: Option<&str>) -> axum::response::Response {
    let mode = params.get("hub.mode").map(|s| s.as_str());
    let token = params.get("hub.verify_token").map(|s| s.as_str());
    let challenge = params.get("hub.challenge").cloned();

    match (mode, token, challenge, verify_token) {
        (Some("subscribe"), Some(token), Some(challenge), Some(expected)) if token == expected => {
            log::info!("[WEBHOOK] subscription handshake verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            log::warn!("[WEBHOOK] subscription handshake rejected");
            (StatusCode::FORBIDDEN, "verification failed").into_response()
        }
    }
}

async fn receive_delivery(
    headers: &HeaderMap,
    body: &[u8],
    app_secret: Option<&str>,
    seen_ids: Arc<Mutex<HashSet<String>>>,
    handler: InboundHandler,
    outbound: Arc<dyn OutboundSender>,
) -> axum::response::Response {
    if let Some(secret) = app_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(secret, body, signature) {
            log::warn!("[WEBHOOK] rejected delivery with bad signature");
            return (StatusCode::FORBIDDEN, Json(json!({"error": "invalid signature"})))
                .into_response();
        }
    }

    let payload: JsonValue = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("[WEBHOOK] malformed delivery body: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "malformed JSON"})))
                .into_response();
        }
    };

    for message in extract_messages(&payload) {
        // Record the id before processing: Meta redelivers until it gets a
        // 200, and a slow handler must not cause a duplicate conversation
        // turn.
        {
            let mut seen = seen_ids.lock().await;
            if !seen.insert(message.id.clone()) {
                log::info!("[WEBHOOK] skipping duplicate message {}", message.id);
                continue;
            }
        }

        log::info!("[WEBHOOK] message {} from {}", message.id, message.from);
        outbound.mark_read(&message.id).await;
        let reply = handler(message.from.clone(), message.content.clone()).await;
        if let Err(e) = outbound.send_text(&message.from, &reply).await {
            log::error!("[WEBHOOK] failed to reply to {}: {}", message.from, e);
        }
    }

    (StatusCode::OK, Json(json!({"status": "received"}))).into_response()
}

/// Bind and serve the webhook in a background task.
pub async fn serve(
    config: WebhookConfig,
    handler: InboundHandler,
    outbound: Arc<dyn OutboundSender>,
) -> Result<WebhookHandle, Box<dyn std::error::Error + Send + Sync>> {
    let port = config.port;
    let app = build_router(config, handler, outbound);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let addr = listener.local_addr()?;
    log::info!("[WEBHOOK] listening on {}", addr);

    let join = tokio::spawn(async move { axum::serve(listener, app).await });
    Ok(WebhookHandle { addr, join })
}

//! HTTP host for a specialist agent.
//!
//! Each specialist runs as its own process behind this small axum server:
//! `POST /process` takes `{"message": ..., "context": [...]}` and returns
//! `{"message": ..., "status": "success"}`, the shape the orchestrator's
//! [`AgentProxy`](crate::agent_proxy::AgentProxy) expects. Generic over
//! [`AgentHandler`] so tests can mount a stub instead of a model-backed
//! specialist.

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Something that can process one message with optional conversation context.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Agent name for the banner and logs.
    fn name(&self) -> &str;

    /// Process a message and produce the reply text. `context` is the
    /// requesting user's serialized history (may be an empty array).
    async fn process(&self, message: &str, context: &JsonValue) -> String;
}

/// Build the agent router. Exposed for oneshot-style tests.
pub fn build_router(handler: Arc<dyn AgentHandler>) -> Router {
    let banner_handler = Arc::clone(&handler);
    let process_handler = Arc::clone(&handler);

    Router::new()
        .route(
            "/",
            get(move || {
                let handler = Arc::clone(&banner_handler);
                async move {
                    Json(json!({
                        "agent": handler.name(),
                        "status": "running",
                    }))
                }
            }),
        )
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/process",
            post(move |Json(payload): Json<JsonValue>| {
                let handler = Arc::clone(&process_handler);
                async move {
                    let Some(message) = payload.get("message").and_then(|m| m.as_str()) else {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": "missing 'message' field"})),
                        )
                            .into_response();
                    };
                    let context = payload
                        .get("context")
                        .cloned()
                        .unwrap_or_else(|| JsonValue::Array(Vec::new()));

                    let request_id = uuid::Uuid::new_v4();
                    let preview: String = message.chars().take(80).collect();
                    log::info!(
                        "[{}] {} processing: {}",
                        handler.name(),
                        request_id,
                        preview
                    );
                    let reply = handler.process(message, &context).await;
                    log::info!("[{}] {} done", handler.name(), request_id);

                    (
                        StatusCode::OK,
                        Json(json!({"message": reply, "status": "success"})),
                    )
                        .into_response()
                }
            }),
        )
}

/// Running agent server handle.
pub struct AgentServerHandle {
    pub addr: SocketAddr,
    join: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl AgentServerHandle {
    pub fn shutdown(&self) {
        self.join.abort();
    }

    /// Wait for the server task; used by the agent daemons' main loops.
    pub async fn wait(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.join.await??;
        Ok(())
    }
}

/// Bind and serve an agent on the given port.
pub async fn serve(
    port: u16,
    handler: Arc<dyn AgentHandler>,
) -> Result<AgentServerHandle, Box<dyn std::error::Error + Send + Sync>> {
    let name = handler.name().to_string();
    let app = build_router(handler);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let addr = listener.local_addr()?;
    log::info!("[{}] listening on {}", name, addr);

    let join = tokio::spawn(async move { axum::serve(listener, app).await });
    Ok(AgentServerHandle { addr, join })
}

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fieldops::agent_server::{build_router, AgentHandler};
use fieldops::client_wrapper::{ClientWrapper, Message, Role};
use fieldops::specialists::office;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

// Echoes the message and reports how many context turns it saw.
struct EchoAgent;

#[async_trait]
impl AgentHandler for EchoAgent {
    fn name(&self) -> &str {
        "echo-agent"
    }

    async fn process(&self, message: &str, context: &JsonValue) -> String {
        let turns = context.as_array().map(|a| a.len()).unwrap_or(0);
        format!("echo: {} ({} context turns)", message, turns)
    }
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn process_wraps_the_reply_in_the_standard_envelope() {
    let app = build_router(Arc::new(EchoAgent));

    let payload = json!({
        "message": "boiler fixed",
        "context": [{"role": "user", "text": "earlier"}],
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "echo: boiler fixed (1 context turns)");
}

#[tokio::test]
async fn missing_message_field_is_a_bad_request() {
    let app = build_router(Arc::new(EchoAgent));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"context": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn banner_names_the_agent() {
    let app = build_router(Arc::new(EchoAgent));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["agent"], "echo-agent");
}

// Scripted mock for driving a real specialist through the tool loop.
struct MockClient {
    responses: Mutex<VecDeque<String>>,
}

impl MockClient {
    fn scripted(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        let content = self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "script exhausted".to_string());
        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[tokio::test]
async fn office_agent_runs_the_billing_rule_behind_the_server() {
    let job = r#"{\"job_id\": \"JOB-789-001\", \"work_hours\": 2.0}"#;
    let client = Arc::new(MockClient::scripted(vec![
        &format!(
            r#"{{"tool_call": {{"name": "process_billing_rule", "parameters": {{"job_data": "{}"}}}}}}"#,
            job
        ),
        "Conflict: 1h over the included hour, escalating.",
    ]));

    let agent = office::build(client, "office rules".to_string(), None)
        .await
        .unwrap();
    let app = build_router(Arc::new(agent));

    let payload = json!({"message": "new job handoff", "context": []});
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Conflict: 1h over the included hour, escalating.");
}

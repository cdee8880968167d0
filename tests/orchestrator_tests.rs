use async_trait::async_trait;
use fieldops::agent_proxy::REMOTE_AGENT_PROTOCOL;
use fieldops::client_wrapper::{ClientWrapper, Message, Role};
use fieldops::history::HistoryStore;
use fieldops::notify;
use fieldops::router::Orchestrator;
use fieldops::tool_protocol::{ToolMetadata, ToolProtocol, ToolRegistry, ToolResult};
use fieldops::tool_protocols::FunctionToolProtocol;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

// Mock client: returns scripted responses in order and records every call's
// message array. The last scripted response repeats once the script runs out.
struct MockClient {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockClient {
    fn scripted(responses: Vec<&str>) -> Self {
        let mut queue: VecDeque<String> = responses.into_iter().map(|s| s.to_string()).collect();
        let fallback = queue
            .back()
            .cloned()
            .unwrap_or_else(|| "empty script".to_string());
        if !queue.is_empty() {
            queue.pop_back();
        }
        Self {
            responses: Mutex::new(queue),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn call_messages(&self, index: usize) -> Vec<Message> {
        self.calls.lock().await[index].clone()
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        self.calls.lock().await.push(messages.to_vec());
        let content = self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

struct FailingClient;

#[async_trait]
impl ClientWrapper for FailingClient {
    async fn send_message(
        &self,
        _messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        Err("model unavailable".into())
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

fn empty_registry() -> Arc<RwLock<ToolRegistry>> {
    Arc::new(RwLock::new(ToolRegistry::empty()))
}

async fn echo_registry() -> Arc<RwLock<ToolRegistry>> {
    let functions = FunctionToolProtocol::new();
    functions
        .register_tool(
            ToolMetadata::new("echo_tool", "Echoes its input back"),
            Arc::new(|params| {
                Box::pin(async move { Ok(ToolResult::success(serde_json::json!({"echo": params}))) })
            }),
        )
        .await;
    let mut registry = ToolRegistry::empty();
    registry.add_protocol(Arc::new(functions)).await.unwrap();
    Arc::new(RwLock::new(registry))
}

#[tokio::test]
async fn reply_is_returned_and_both_turns_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::scripted(vec!["Noted, passing it on."]));
    let orchestrator = Orchestrator::new(
        client.clone(),
        "route messages",
        empty_registry(),
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    let reply = orchestrator
        .process_message("technician", "boiler fixed at Meier, 2 hours")
        .await;
    assert_eq!(reply, "Noted, passing it on.");

    // The model saw the identity-prefixed message.
    let sent = client.call_messages(0).await;
    assert_eq!(sent[0].role, Role::System);
    assert!(sent[1]
        .content
        .starts_with("[User: Technician (CLI), Role: technician]"));
    assert!(sent[1].content.contains("boiler fixed"));

    // Both turns landed on disk.
    let store = HistoryStore::open(tmp.path()).unwrap();
    let turns = store.load_history("technician").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].text, "Noted, passing it on.");
}

#[tokio::test]
async fn unknown_sender_is_refused_and_nothing_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::scripted(vec!["should never be called"]));
    let orchestrator = Orchestrator::new(
        client.clone(),
        "route messages",
        empty_registry(),
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    let reply = orchestrator.process_message("15550001111", "hello?").await;
    assert!(reply.contains("don't recognize"));
    assert_eq!(client.call_count().await, 0);

    let store = HistoryStore::open(tmp.path()).unwrap();
    assert!(store.load_all_histories().unwrap().is_empty());
}

#[tokio::test]
async fn tool_call_round_trips_through_the_registry() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::scripted(vec![
        r#"{"tool_call": {"name": "echo_tool", "parameters": {"ping": 1}}}"#,
        "All done.",
    ]));
    let orchestrator = Orchestrator::new(
        client.clone(),
        "route messages",
        echo_registry().await,
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    let reply = orchestrator.process_message("office", "run the echo").await;
    assert_eq!(reply, "All done.");
    assert_eq!(client.call_count().await, 2);

    // The second model call carries the tool result as a follow-up turn.
    let second = client.call_messages(1).await;
    let feedback = &second.last().unwrap().content;
    assert!(feedback.contains("Tool 'echo_tool' executed successfully"));
    assert!(feedback.contains("\"ping\": 1"));

    // The intermediate tool round is not persisted, only user + final reply.
    let turns = HistoryStore::open(tmp.path())
        .unwrap()
        .load_history("office")
        .unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].text, "All done.");
}

#[tokio::test]
async fn unknown_tool_feeds_an_error_back_to_the_model() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::scripted(vec![
        r#"{"tool_call": {"name": "no_such_tool", "parameters": {}}}"#,
        "I could not do that.",
    ]));
    let orchestrator = Orchestrator::new(
        client.clone(),
        "route messages",
        echo_registry().await,
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    let reply = orchestrator.process_message("office", "try something").await;
    assert_eq!(reply, "I could not do that.");

    let second = client.call_messages(1).await;
    assert!(second
        .last()
        .unwrap()
        .content
        .contains("Tool 'no_such_tool' failed"));
}

#[tokio::test]
async fn tool_loop_stops_at_the_iteration_cap() {
    let tmp = tempfile::tempdir().unwrap();
    // The model never stops asking for the tool; the loop must bail out.
    let client = Arc::new(MockClient::scripted(vec![
        r#"{"tool_call": {"name": "echo_tool", "parameters": {}}}"#,
    ]));
    let orchestrator = Orchestrator::new(
        client.clone(),
        "route messages",
        echo_registry().await,
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    let reply = orchestrator.process_message("office", "loop forever").await;
    // Cap of 5 tool rounds means 6 model calls in total.
    assert_eq!(client.call_count().await, 6);
    // The human gets an explanation, never the model's raw tool-call JSON.
    assert!(!reply.contains("tool_call"));
    assert!(reply.contains("Maximum tool iterations reached"));
}

// Remote-agent stub that records the parameters the registry executed it with.
struct RecordingRemoteAgent {
    executed: Mutex<Vec<serde_json::Value>>,
}

#[async_trait]
impl ToolProtocol for RecordingRemoteAgent {
    async fn execute(
        &self,
        _tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn std::error::Error + Send + Sync>> {
        self.executed.lock().await.push(parameters);
        Ok(ToolResult::success(serde_json::json!({"message": "handled"})))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(vec![ToolMetadata::new(
            "field_service_agent",
            "Stub field service agent",
        )])
    }

    fn protocol_name(&self) -> &str {
        REMOTE_AGENT_PROTOCOL
    }
}

#[tokio::test]
async fn remote_agent_tools_receive_the_callers_history_as_context() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::scripted(vec![
        r#"{"tool_call": {"name": "field_service_agent", "parameters": {"message": "boiler fixed"}}}"#,
        "Passed along.",
    ]));
    let agent = Arc::new(RecordingRemoteAgent {
        executed: Mutex::new(Vec::new()),
    });
    let mut registry = ToolRegistry::empty();
    registry
        .add_protocol(Arc::clone(&agent) as Arc<dyn ToolProtocol>)
        .await
        .unwrap();
    let orchestrator = Orchestrator::new(
        client,
        "route messages",
        Arc::new(RwLock::new(registry)),
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    orchestrator
        .process_message("technician", "boiler fixed at Meier, 2 hours")
        .await;

    // The proxy call carried the technician's serialized turns as context.
    let executed = agent.executed.lock().await;
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0]["message"], "boiler fixed");
    let context = executed[0]["context"].as_array().unwrap();
    assert_eq!(context.len(), 1);
    assert_eq!(context[0]["role"], "user");
    assert!(context[0]["text"]
        .as_str()
        .unwrap()
        .contains("boiler fixed at Meier, 2 hours"));
}

#[tokio::test]
async fn communicate_tool_updates_every_matching_history_and_persists() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::scripted(vec![
        r#"{"tool_call": {"name": "communicate_with_human", "parameters": {"recipient_role": "office", "message": "Grant goodwill for JOB-789-001?"}}}"#,
        "Asked the office, waiting for their decision.",
    ]));
    let registry = empty_registry();
    let orchestrator = Orchestrator::new(
        client,
        "route messages",
        Arc::clone(&registry),
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    // Registered after construction so the tool shares the live history map,
    // the same order the daemon wires it in.
    let functions = FunctionToolProtocol::new();
    notify::register_communicate_tool(&functions, None, orchestrator.histories()).await;
    registry
        .write()
        .await
        .add_protocol(Arc::new(functions))
        .await
        .unwrap();

    let reply = orchestrator
        .process_message("technician", "2 hours at Meier, over contract")
        .await;
    assert_eq!(reply, "Asked the office, waiting for their decision.");

    // Every office-role user (CLI id and phone number) got the question as a
    // model turn, persisted by the same process_message call.
    let store = HistoryStore::open(tmp.path()).unwrap();
    for recipient in ["office", "19712187997"] {
        let turns = store.load_history(recipient).unwrap();
        assert_eq!(turns.len(), 1, "history of {}", recipient);
        assert_eq!(turns[0].role, Role::Assistant);
        assert!(turns[0].text.contains("Grant goodwill"));
    }

    // The sender's own history holds only their turn and the final reply.
    let turns = store.load_history("technician").unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].text, "Asked the office, waiting for their decision.");
}

#[tokio::test]
async fn model_failure_surfaces_as_an_apology_and_keeps_the_user_turn() {
    let tmp = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        Arc::new(FailingClient),
        "route messages",
        empty_registry(),
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    let reply = orchestrator.process_message("technician", "anyone there?").await;
    assert!(reply.contains("Sorry"));

    let turns = HistoryStore::open(tmp.path())
        .unwrap()
        .load_history("technician")
        .unwrap();
    assert_eq!(turns.len(), 2);
    assert!(turns[0].text.contains("anyone there?"));
    assert!(turns[1].text.contains("Sorry"));
}

#[tokio::test]
async fn histories_survive_a_restart() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let client = Arc::new(MockClient::scripted(vec!["first reply"]));
        let orchestrator = Orchestrator::new(
            client,
            "route messages",
            empty_registry(),
            HistoryStore::open(tmp.path()).unwrap(),
        )
        .unwrap();
        orchestrator.process_message("technician", "job one").await;
    }

    // A fresh orchestrator over the same directory picks the history up.
    let client = Arc::new(MockClient::scripted(vec!["second reply"]));
    let orchestrator = Orchestrator::new(
        client.clone(),
        "route messages",
        empty_registry(),
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();
    orchestrator.process_message("technician", "job two").await;

    // system + two prior turns + the new user turn
    let sent = client.call_messages(0).await;
    assert_eq!(sent.len(), 4);
    assert!(sent[1].content.contains("job one"));
    assert_eq!(sent[2].content, "first reply");

    let turns = HistoryStore::open(tmp.path())
        .unwrap()
        .load_history("technician")
        .unwrap();
    assert_eq!(turns.len(), 4);
}

#[tokio::test]
async fn reset_conversation_clears_memory_and_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Arc::new(MockClient::scripted(vec!["ok"]));
    let orchestrator = Orchestrator::new(
        client.clone(),
        "route messages",
        empty_registry(),
        HistoryStore::open(tmp.path()).unwrap(),
    )
    .unwrap();

    orchestrator.process_message("office", "remember this").await;
    orchestrator.reset_conversation("office").await.unwrap();

    orchestrator.process_message("office", "what did I say?").await;
    // Second exchange starts from scratch: system + single user turn.
    let sent = client.call_messages(1).await;
    assert_eq!(sent.len(), 2);
}

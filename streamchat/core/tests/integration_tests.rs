//! End-to-end tests: HTTP transport + orchestrator against a mock event-stream
//! server, with conversations persisted to disk.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use streamchat_core::{
    ChatOrchestrator, ConversationStore, FileStorage, HttpTransport, MemoryStorage, MessageRole,
    OrchestratorConfig, StreamOutcome, StreamUpdate,
};
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM_PATH: &str = "/api/chat/stream";

fn event_stream(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn orchestrator(
    server: &MockServer,
    store: ConversationStore,
) -> ChatOrchestrator<HttpTransport> {
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).unwrap());
    let config = OrchestratorConfig::new(format!("{}{STREAM_PATH}", server.uri()))
        .with_header("X-Client", "integration");
    ChatOrchestrator::new(store, transport, config)
}

fn memory_store() -> ConversationStore {
    ConversationStore::new(Arc::new(MemoryStorage::new()))
}

fn messages(chat: &ChatOrchestrator<HttpTransport>) -> Vec<(MessageRole, String, bool)> {
    chat.store()
        .active_conversation()
        .unwrap()
        .messages
        .iter()
        .map(|m| (m.role, m.content.clone(), m.is_streaming))
        .collect()
}

#[tokio::test]
async fn test_streams_response_into_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(header("accept", "text/event-stream"))
        .and(header("content-type", "application/json"))
        .and(header("x-client", "integration"))
        .and(body_json(json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .respond_with(event_stream(
            "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: [DONE]\n\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut chat = orchestrator(&server, memory_store());
    chat.send_in_new_conversation("Hi").unwrap();

    let mut deltas = Vec::new();
    let mut outcome = None;
    while let Some(update) = chat.next_update().await {
        match update {
            StreamUpdate::Delta { content, .. } => deltas.push(content),
            StreamUpdate::Finished { outcome: o, .. } => outcome = Some(o),
        }
    }

    assert_eq!(deltas, vec!["Hel".to_string(), "lo".to_string()]);
    assert_eq!(outcome, Some(StreamOutcome::Completed));
    assert_eq!(
        messages(&chat),
        vec![
            (MessageRole::User, "Hi".to_string(), false),
            (MessageRole::Assistant, "Hello".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_error_status_finishes_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let mut chat = orchestrator(&server, memory_store());
    chat.send_in_new_conversation("Hi").unwrap();

    assert_eq!(
        chat.run_to_completion().await,
        Some(StreamOutcome::Errored("HTTP error! status: 500".to_string()))
    );
    assert!(!chat.is_streaming());
    assert_eq!(
        messages(&chat),
        vec![(MessageRole::User, "Hi".to_string(), false)]
    );
}

#[tokio::test]
async fn test_no_content_response_is_missing_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let mut chat = orchestrator(&server, memory_store());
    chat.send_in_new_conversation("Hi").unwrap();

    assert_eq!(
        chat.run_to_completion().await,
        Some(StreamOutcome::Errored("Response body is null".to_string()))
    );
}

#[tokio::test]
async fn test_plain_text_server_and_end_of_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(event_stream(
            ": comment\ndata: plain text, not json\ndata: {\"content\":\" tail\"}\ndata: {\"content\":\"cut",
        ))
        .mount(&server)
        .await;

    let mut chat = orchestrator(&server, memory_store());
    chat.send_in_new_conversation("Hi").unwrap();

    // No sentinel: the end of the body completes the stream and the
    // unterminated last frame is dropped
    assert_eq!(chat.run_to_completion().await, Some(StreamOutcome::Completed));
    assert_eq!(
        messages(&chat)[1],
        (MessageRole::Assistant, "plain text, not json tail".to_string(), false)
    );
}

#[tokio::test]
async fn test_done_flag_and_retry_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(event_stream(
            "data: {\"content\":\"Hello\",\"done\":true}\ndata: {\"content\":\"ignored\"}\n",
        ))
        .expect(2)
        .mount(&server)
        .await;

    let mut chat = orchestrator(&server, memory_store());
    chat.send_in_new_conversation("Hi").unwrap();
    chat.run_to_completion().await;

    let conversation_id = chat.store().active_conversation_id().unwrap();
    chat.retry(conversation_id).unwrap();
    assert_eq!(chat.run_to_completion().await, Some(StreamOutcome::Completed));

    assert_eq!(
        messages(&chat),
        vec![
            (MessageRole::User, "Hi".to_string(), false),
            (MessageRole::Assistant, "Hello".to_string(), false),
        ]
    );

    // Retry sends the same history as the original request
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn test_conversations_survive_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(event_stream("data: {\"content\":\"Persisted reply\"}\ndata: [DONE]\n"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();

    let (conversation_id, before) = {
        let store = ConversationStore::load(Arc::new(FileStorage::new(dir.path())));
        let mut chat = orchestrator(&server, store);
        chat.send_in_new_conversation("Remember this conversation please")
            .unwrap();
        chat.run_to_completion().await;
        chat.store_mut().flush().await;

        let id = chat.store().active_conversation_id().unwrap();
        (id, chat.store().conversations().to_vec())
    };

    let restored = ConversationStore::load(Arc::new(FileStorage::new(dir.path())));
    assert_eq!(restored.active_conversation_id(), Some(conversation_id));
    assert_eq!(restored.conversations(), before.as_slice());

    let conversation = restored.conversation(conversation_id).unwrap();
    assert_eq!(conversation.title, "Remember this conversation please");
    assert_eq!(conversation.streaming_count(), 0);
    assert_eq!(conversation.messages[1].content, "Persisted reply");
}

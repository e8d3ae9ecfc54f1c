//! Integration tests for the OpenAI-compatible runtime
//!
//! Runs the HTTP client against a wiremock server:
//! - chat and inference request/response handling
//! - status code to error mapping
//! - availability probing
//! - retrying through the handoff coordinator

use agent_swarm::handoff::{HandoffCoordinator, HandoffRequest, RetryPolicy};
use agent_swarm::runtime::{
    AgentRuntime, Message, OpenAiCompatConfig, OpenAiCompatRuntime, RequestParams, RuntimeError,
    RuntimeKind,
};
use agent_swarm::testing::RecordingDelay;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn runtime(base_url: &str, api_key: Option<&str>) -> OpenAiCompatRuntime {
    OpenAiCompatRuntime::new(OpenAiCompatConfig {
        name: "test-runtime".to_string(),
        kind: RuntimeKind::Local,
        base_url: base_url.to_string(),
        model: "llama3".to_string(),
        api_key: api_key.map(str::to_string),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }
        ]
    })
}

#[tokio::test]
async fn test_chat_request_returns_first_choice() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "messages": [
                {"role": "system", "content": "You continue tasks."},
                {"role": "user", "content": "{}"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Picked up the task")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let runtime = runtime(&mock_server.uri(), Some("test-key"));
    let reply = runtime
        .send_chat_request(
            &[Message::system("You continue tasks."), Message::user("{}")],
            &RequestParams::default().with_max_tokens(64),
        )
        .await
        .unwrap();

    assert_eq!(reply, "Picked up the task");
}

#[tokio::test]
async fn test_inference_request_uses_completions_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/completions"))
        .and(body_partial_json(json!({"prompt": "Summarize"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": "A summary", "index": 0}]
        })))
        .mount(&mock_server)
        .await;

    let reply = runtime(&mock_server.uri(), None)
        .send_inference_request("Summarize", &RequestParams::default())
        .await
        .unwrap();
    assert_eq!(reply, "A summary");
}

#[tokio::test]
async fn test_error_statuses_are_mapped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&mock_server)
        .await;

    let err = runtime(&mock_server.uri(), None)
        .send_chat_request(&[Message::user("hi")], &RequestParams::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::RateLimitExceeded(ref detail) if detail.contains("slow down")
    ));
}

#[tokio::test]
async fn test_empty_choices_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let err = runtime(&mock_server.uri(), None)
        .send_chat_request(&[Message::user("hi")], &RequestParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_availability_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    assert!(runtime(&mock_server.uri(), None).is_available().await);
    // Nothing listens on port 9 locally
    assert!(!runtime("http://127.0.0.1:9", None).is_available().await);
}

#[tokio::test]
async fn test_handoff_retries_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("recovered")))
        .mount(&mock_server)
        .await;

    let delay = Arc::new(RecordingDelay::new());
    let coordinator = HandoffCoordinator::default()
        .with_retry_policy(RetryPolicy::exponential(3, Duration::from_millis(100)))
        .with_delay(delay.clone());
    coordinator.register_agent("worker", Arc::new(runtime(&mock_server.uri(), None)));

    let outcome = coordinator
        .initiate_handoff(HandoffRequest::new(
            "planner",
            "worker",
            "task-1",
            json!({"goal": "finish"}),
        ))
        .await
        .unwrap();

    assert_eq!(outcome.response, "recovered");
    assert_eq!(outcome.attempts, 3);
    assert_eq!(delay.waits().len(), 2);
}

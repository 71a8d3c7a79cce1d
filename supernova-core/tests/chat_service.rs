//! Integration tests for ChatService using wiremock.

use supernova_core::{CancellationToken, ChatProvider, ChatService, FetchError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(server: &MockServer) -> ChatService {
    ChatService::with_base_url("sk-test".to_string(), &server.uri()).unwrap()
}

#[tokio::test]
async fn test_complete_returns_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-3.5-turbo",
            "messages": [{ "role": "user", "content": "tell me a joke" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Why did the crab never share?" } },
                { "message": { "role": "assistant", "content": "second" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = service(&server)
        .complete("tell me a joke", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reply, "Why did the crab never share?");
}

#[tokio::test]
async fn test_configured_model_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "ok" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let svc = service(&server).with_model("gpt-4o-mini");
    let reply = svc.complete("ping", &CancellationToken::new()).await.unwrap();
    assert_eq!(reply, "ok");
}

#[tokio::test]
async fn test_error_status_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "Incorrect API key provided" }
        })))
        .mount(&server)
        .await;

    let err = service(&server).complete("hi", &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, FetchError::Transport(ref msg) if msg.contains("401")));
}

#[tokio::test]
async fn test_no_choices_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = service(&server).complete("hi", &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn test_empty_content_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "content": "" } }]
        })))
        .mount(&server)
        .await;

    let err = service(&server).complete("hi", &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, FetchError::Decode(_)));
}

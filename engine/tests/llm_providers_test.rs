//! Integration tests for the completion providers
//!
//! Both providers are pointed at mock servers.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use sophie_engine::config::OpenAIConfig;
use sophie_engine::llm::{
    CompletionClient, LLMError, LLMProvider, OllamaProvider, OpenAIProvider,
};
use sophie_engine::secrets::SecretString;

fn openai(server: &MockServer) -> OpenAIProvider {
    let config = OpenAIConfig {
        base_url: format!("{}/v1", server.uri()),
        model: "gpt-test".to_string(),
        ..Default::default()
    };
    OpenAIProvider::new(config, SecretString::new("sk-test-key"))
}

#[tokio::test]
async fn test_openai_sends_single_user_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "max_tokens": 64,
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "  Hi there!\n"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = openai(&server).complete("hello", 64).await.unwrap();
    assert_eq!(answer, "Hi there!");
}

#[tokio::test]
async fn test_openai_status_mapping() {
    let cases = [
        (401, "auth"),
        (429, "rate"),
        (503, "unavailable"),
        (400, "invalid"),
    ];

    for (status, kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = openai(&server).complete("hello", 16).await.unwrap_err();
        let matched = match kind {
            "auth" => matches!(err, LLMError::AuthenticationFailed(_)),
            "rate" => matches!(err, LLMError::RateLimitExceeded),
            "unavailable" => matches!(err, LLMError::ProviderUnavailable(_)),
            _ => matches!(err, LLMError::InvalidRequest(_)),
        };
        assert!(matched, "status {} mapped to {:?}", status, err);
    }
}

#[tokio::test]
async fn test_openai_empty_choices_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = openai(&server).complete("hello", 16).await.unwrap_err();
    assert!(matches!(err, LLMError::ParseError(_)));
}

#[tokio::test]
async fn test_ollama_chat_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1:8b",
            "stream": false,
            "options": {"num_predict": 120},
            "messages": [{"role": "user", "content": "tell me a joke"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1:8b",
            "message": {"role": "assistant", "content": "Why did the crab never share?"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(format!("{}/", server.uri()), "llama3.1:8b");
    let answer = provider.complete("tell me a joke", 120).await.unwrap();
    assert_eq!(answer, "Why did the crab never share?");
}

#[tokio::test]
async fn test_ollama_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let healthy = OllamaProvider::new(server.uri(), "llama3.1:8b");
    assert!(healthy.check_health().await);

    let empty = MockServer::start().await;
    let unhealthy = OllamaProvider::new(empty.uri(), "llama3.1:8b");
    assert!(!unhealthy.check_health().await);
}

#[tokio::test]
async fn test_client_turns_provider_errors_into_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let client = CompletionClient::new(
        Arc::new(OllamaProvider::new(server.uri(), "llama3.1:8b")),
        Duration::from_secs(5),
    );
    let reply = client.complete("hello", 16).await;

    assert!(reply.starts_with("Error contacting the language model:"));
    assert!(reply.contains("model not loaded"));
}

#[tokio::test]
async fn test_client_times_out_slow_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({"message": {"role": "assistant", "content": "late"}})),
        )
        .mount(&server)
        .await;

    let client = CompletionClient::new(
        Arc::new(OllamaProvider::new(server.uri(), "llama3.1:8b")),
        Duration::from_millis(100),
    );
    let reply = client.complete("hello", 16).await;
    assert_eq!(reply, sophie_engine::llm::TIMEOUT_REPLY);
}

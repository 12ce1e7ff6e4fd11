//! Integration tests for the Ollama client against a mock HTTP server.

use aquifer_advisor::llm::{AgentRole, ChatMessage, LlmClient, LlmConfig, LlmError, OllamaClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OllamaClient {
    OllamaClient::new(LlmConfig {
        base_url: server.uri(),
        ..LlmConfig::default()
    })
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are a test agent."),
        ChatMessage::user("hello"),
    ]
}

#[tokio::test]
async fn test_generate_returns_trimmed_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "  the answer  " },
            "done": true,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let content = client
        .generate(AgentRole::Planner, &messages(), 0.1, None)
        .await
        .unwrap();

    assert_eq!(content, "the answer");
}

#[tokio::test]
async fn test_generate_sends_model_for_role() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "qwen2.5-coder:7b",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "MATCH (a:Aquifer) RETURN a LIMIT 1" },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client
        .generate(AgentRole::CypherSpecialist, &messages(), 0.0, Some(500))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_generate_json_parses_structured_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "format": "json" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "role": "assistant",
                "content": "{\"complexity\": \"SIMPLE\", \"reasoning\": \"single lookup\"}",
            },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let value = client
        .generate_json(AgentRole::Planner, &messages(), 0.1)
        .await
        .unwrap();

    assert_eq!(value["complexity"], "SIMPLE");
    assert_eq!(value["reasoning"], "single lookup");
}

#[tokio::test]
async fn test_generate_json_rejects_malformed_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "not json at all" },
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .generate_json(AgentRole::Validator, &messages(), 0.0)
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::SchemaConformance(_)));
}

#[tokio::test]
async fn test_provider_error_carries_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .generate(AgentRole::Analyst, &messages(), 0.3, None)
        .await
        .unwrap_err();

    match err {
        LlmError::Provider { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "model not loaded");
        }
        other => panic!("expected provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_model_reply_is_a_provider_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "" },
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .generate(AgentRole::Planner, &messages(), 0.1, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LlmError::Provider { .. }));
}

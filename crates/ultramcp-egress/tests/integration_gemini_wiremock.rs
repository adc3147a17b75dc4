//! Integration tests for the Gemini connector using wiremock

use futures::StreamExt;
use ultramcp_core::provider::Provider;
use ultramcp_core::types::{FinishReason, GenerateRequest, StreamEvent};
use ultramcp_egress::gemini::{GeminiConfig, GeminiConnector};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn connector_for(server: &MockServer) -> GeminiConnector {
    let config = GeminiConfig::new(Some("test-key".to_string())).with_base_url(server.uri());
    GeminiConnector::new(config).unwrap()
}

#[tokio::test]
async fn test_gemini_generate_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "Grounded answer"}]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 8,
                "candidatesTokenCount": 3,
                "totalTokenCount": 11
            },
            "modelVersion": "gemini-2.5-pro"
        })))
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let response = connector
        .generate(GenerateRequest {
            prompt: "What happened today?".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.text, "Grounded answer");
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.unwrap().total_tokens, 11);
}

#[tokio::test]
async fn test_gemini_pro_default_requests_search_grounding() {
    let mock_server = MockServer::start().await;

    // The Pro tier must send the google_search tool when the request
    // leaves use_search_grounding unset
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
        .and(body_partial_json(serde_json::json!({
            "tools": [{"google_search": {}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "ok"}]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    connector
        .generate(GenerateRequest {
            prompt: "hi".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_gemini_streaming() {
    let mock_server = MockServer::start().await;

    let sse_body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"He\"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"llo\"}]},\"finishReason\":\"STOP\"}],",
        "\"usageMetadata\":{\"promptTokenCount\":4,\"candidatesTokenCount\":2,\"totalTokenCount\":6}}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-pro:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes(), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let mut stream = connector
        .stream_generate(GenerateRequest {
            prompt: "hi".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let mut text = String::new();
    let mut saw_usage = false;
    let mut finish = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::Delta { content } => text.push_str(&content),
            StreamEvent::Usage { usage } => {
                saw_usage = true;
                assert_eq!(usage.total_tokens, 6);
            }
            StreamEvent::End { finish_reason } => finish = Some(finish_reason),
        }
    }

    assert_eq!(text, "Hello");
    assert!(saw_usage);
    assert_eq!(finish, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_gemini_error_carries_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let err = connector
        .generate(GenerateRequest {
            prompt: "hi".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("403"));
    assert!(message.contains("API key invalid"));
}

//! Integration tests for the OpenAI connector using wiremock
//!
//! These tests mock the OpenAI API to verify the egress connector's HTTP
//! behavior, including the SSE streaming path.

use futures::StreamExt;
use ultramcp_core::provider::Provider;
use ultramcp_core::types::{FinishReason, GenerateRequest, StreamEvent};
use ultramcp_egress::openai::{OpenAIConfig, OpenAIConnector};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn connector_for(server: &MockServer) -> OpenAIConnector {
    let config = OpenAIConfig::new(Some("test-key".to_string())).with_base_url(server.uri());
    OpenAIConnector::new(config).unwrap()
}

fn request(prompt: &str) -> GenerateRequest {
    GenerateRequest {
        prompt: prompt.to_string(),
        model: Some("gpt-4o".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_openai_send_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1234567890,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello from mock API!"
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15
            }
        })))
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let response = connector.generate(request("Hello!")).await.unwrap();

    assert_eq!(response.text, "Hello from mock API!");
    assert_eq!(response.model, "gpt-4o");
    assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    assert_eq!(response.usage.unwrap().total_tokens, 15);
}

#[tokio::test]
async fn test_openai_error_carries_status_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_string(r#"{"error":{"message":"slow down"}}"#),
        )
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let err = connector.generate(request("Hello!")).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("429"), "missing status in: {message}");
    assert!(message.contains("slow down"), "missing body in: {message}");
}

#[tokio::test]
async fn test_openai_streaming_yields_chunks_in_order() {
    let mock_server = MockServer::start().await;

    let sse_body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"He\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"llo\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes(), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let mut stream = connector.stream_generate(request("Hello!")).await.unwrap();

    let mut text = String::new();
    let mut finish = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            StreamEvent::Delta { content } => text.push_str(&content),
            StreamEvent::End { finish_reason } => finish = Some(finish_reason),
            StreamEvent::Usage { .. } => {}
        }
    }

    assert_eq!(text, "Hello");
    assert_eq!(finish, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_openai_streaming_with_zero_content_chunks() {
    let mock_server = MockServer::start().await;

    // Upstream closes cleanly without emitting any content
    let sse_body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes(), "text/event-stream"),
        )
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let stream = connector.stream_generate(request("Hello!")).await.unwrap();
    let events: Vec<_> = stream.map(|e| e.unwrap()).collect().await;

    assert_eq!(
        events,
        vec![StreamEvent::End {
            finish_reason: FinishReason::Stop
        }]
    );
}

#[tokio::test]
async fn test_reasoning_model_request_shape() {
    let mock_server = MockServer::start().await;

    // temperature pinned to 1.0 and max_completion_tokens used for o3
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "o3",
            "temperature": 1.0,
            "max_completion_tokens": 256,
            "reasoning_effort": "medium"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "o3",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "ok"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let connector = connector_for(&mock_server);
    let response = connector
        .generate(GenerateRequest {
            prompt: "Hello!".to_string(),
            model: Some("o3".to_string()),
            temperature: Some(0.2),
            max_output_tokens: Some(256),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.text, "ok");
}

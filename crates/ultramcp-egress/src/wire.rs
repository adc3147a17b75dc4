//! OpenAI chat-completions wire format
//!
//! Shared by every adapter speaking the chat-completions dialect: OpenAI,
//! Azure OpenAI, xAI Grok, Bailian compatible-mode, and user-supplied
//! OpenAI-compatible endpoints.

use crate::{EgressError, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use ultramcp_core::types::{
    FinishReason, GenerateRequest, GenerateResponse, ProviderKind, StreamEvent, Usage,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Reasoning models use max_completion_tokens instead of max_tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamChoice {
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
}

/// Build the message list: optional system message, then the user prompt.
pub fn messages_from(request: &GenerateRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: request.prompt.clone(),
    });
    messages
}

pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn map_usage(usage: &ChatUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

/// Convert a non-streaming chat response into the uniform shape.
pub fn from_chat_response(
    resp: ChatResponse,
    provider: ProviderKind,
    requested_model: &str,
) -> Result<GenerateResponse> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| EgressError::Parse("response contained no choices".to_string()))?;

    Ok(GenerateResponse {
        text: choice.message.content.unwrap_or_default(),
        model: resp.model.unwrap_or_else(|| requested_model.to_string()),
        provider,
        usage: resp.usage.as_ref().map(map_usage),
        finish_reason: choice.finish_reason.as_deref().map(map_finish_reason),
    })
}

/// Check a response status; non-2xx becomes `EgressError::Provider` with
/// the body attached.
pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());
    Err(EgressError::Provider {
        status_code: status.as_u16(),
        message: body,
    })
}

/// POST a chat-completions request with bearer authentication and check
/// the response status.
pub async fn post_chat_bearer(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    body: &ChatRequest,
) -> Result<reqwest::Response> {
    let response = client
        .post(format!(
            "{}/chat/completions",
            base_url.trim_end_matches('/')
        ))
        .header("Content-Type", "application/json")
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await?;

    check_status(response).await
}

/// Decode a chat-completions SSE body into uniform stream events.
///
/// Lines prefixed `data: ` carry JSON chunks; the literal `[DONE]` is the
/// terminator. Unparseable fragments are skipped silently. Each decoded
/// content delta is yielded in upstream order; the final usage chunk (when
/// the upstream emits one) and the finish reason are surfaced as their own
/// events.
pub fn decode_sse<S, B, E>(
    byte_stream: S,
) -> Pin<Box<dyn Stream<Item = ultramcp_core::Result<StreamEvent>> + Send>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let event_stream = eventsource_stream::EventStream::new(byte_stream);

    let stream = event_stream
        .map(|result| match result {
            Ok(event) => {
                if event.data == "[DONE]" {
                    // Sentinel only; End was already emitted with the chunk
                    // that carried finish_reason
                    return None;
                }

                match serde_json::from_str::<StreamChunk>(&event.data) {
                    Ok(chunk) => {
                        if let Some(usage) = chunk.usage {
                            return Some(Ok(StreamEvent::Usage {
                                usage: map_usage(&usage),
                            }));
                        }

                        if let Some(choice) = chunk.choices.first() {
                            if let Some(reason) = &choice.finish_reason {
                                return Some(Ok(StreamEvent::End {
                                    finish_reason: map_finish_reason(reason),
                                }));
                            }
                            if let Some(content) = &choice.delta.content {
                                return Some(Ok(StreamEvent::Delta {
                                    content: content.clone(),
                                }));
                            }
                        }

                        // Role-only first chunk and keepalives carry nothing
                        None
                    }
                    Err(e) => {
                        tracing::debug!("Skipping unparseable SSE fragment: {e}");
                        None
                    }
                }
            }
            Err(e) => Some(Err(ultramcp_core::Error::Provider(format!(
                "Stream error: {e}"
            )))),
        })
        .filter_map(|opt| async move { opt });

    Box::pin(stream)
}

//! Google Gemini egress connector
//!
//! Speaks the generative-language wire format (`generateContent` /
//! `streamGenerateContent?alt=sse`) with the API key in the query string.
//! Outbound requests honor the environment proxy variables; the default
//! Pro tier enables search grounding unless the request says otherwise.

use crate::{
    client::{create_client, HttpClientConfig},
    wire::check_status,
    EgressError, Result,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::{debug, instrument};
use ultramcp_core::provider::{EventStream, Provider};
use ultramcp_core::types::{
    FinishReason, GenerateRequest, GenerateResponse, ProviderKind, StreamEvent, Usage,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

pub const MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

/// Gemini connector configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub preferred_model: Option<String>,
    pub client_config: HttpClientConfig,
}

impl GeminiConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            preferred_model: None,
            // Gemini is the one upstream routinely reached through a tunnel
            client_config: HttpClientConfig::with_env_proxy(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }
}

// Gemini wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Stop,
    }
}

fn map_usage(usage: &UsageMetadata) -> Usage {
    Usage {
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    }
}

fn candidate_text(candidate: &Candidate) -> String {
    candidate
        .content
        .as_ref()
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Gemini connector
pub struct GeminiConnector {
    config: GeminiConfig,
    client: Client,
}

impl GeminiConnector {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = create_client(&config.client_config)?;
        Ok(Self { config, client })
    }

    fn resolve_model<'a>(&'a self, request: &'a GenerateRequest) -> &'a str {
        request
            .model
            .as_deref()
            .or(self.config.preferred_model.as_deref())
            .unwrap_or(DEFAULT_MODEL)
    }

    fn endpoint(&self, model: &str, method: &str, sse: bool) -> Result<String> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            EgressError::Config("Gemini API key is not configured".to_string())
        })?;
        let base = self.config.base_url.trim_end_matches('/');
        let alt = if sse { "alt=sse&" } else { "" };
        Ok(format!(
            "{base}/v1beta/models/{model}:{method}?{alt}key={api_key}"
        ))
    }

    fn build_request(&self, request: &GenerateRequest, model: &str) -> GeminiRequest {
        // The Pro tier defaults to grounded answers; other tiers stay off
        // unless asked.
        let grounding = request
            .use_search_grounding
            .unwrap_or_else(|| model.starts_with(DEFAULT_MODEL));

        GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(request.prompt.clone()),
                }],
            }],
            system_instruction: request.system_prompt.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part {
                    text: Some(text.clone()),
                }],
            }),
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            }),
            tools: grounding.then(|| {
                vec![GeminiTool {
                    google_search: serde_json::Map::new(),
                }]
            }),
        }
    }
}

#[async_trait]
impl Provider for GeminiConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    #[instrument(skip(self, request), fields(model = self.resolve_model(&request)))]
    async fn generate(&self, request: GenerateRequest) -> ultramcp_core::Result<GenerateResponse> {
        debug!("Sending non-streaming request to Gemini");

        let model = self.resolve_model(&request).to_string();
        let body = self.build_request(&request, &model);

        let response = self
            .client
            .post(self.endpoint(&model, "generateContent", false)?)
            .json(&body)
            .send()
            .await
            .map_err(EgressError::from)?;
        let response = check_status(response).await?;

        let gemini: GeminiResponse = response
            .json()
            .await
            .map_err(|e| EgressError::Parse(format!("Failed to parse Gemini response: {e}")))?;

        let candidate = gemini
            .candidates
            .first()
            .ok_or_else(|| EgressError::Parse("response contained no candidates".to_string()))?;

        Ok(GenerateResponse {
            text: candidate_text(candidate),
            model: gemini.model_version.clone().unwrap_or(model),
            provider: ProviderKind::Gemini,
            usage: gemini.usage_metadata.as_ref().map(map_usage),
            finish_reason: candidate
                .finish_reason
                .as_deref()
                .map(map_finish_reason),
        })
    }

    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> ultramcp_core::Result<EventStream> {
        debug!("Sending streaming request to Gemini");

        let model = self.resolve_model(&request).to_string();
        let body = self.build_request(&request, &model);

        let response = self
            .client
            .post(self.endpoint(&model, "streamGenerateContent", true)?)
            .json(&body)
            .send()
            .await
            .map_err(EgressError::from)?;
        let response = check_status(response).await?;

        Ok(Box::new(decode_gemini_sse(response.bytes_stream())))
    }

    fn list_models(&self) -> Vec<String> {
        MODELS.iter().map(|m| m.to_string()).collect()
    }

    fn default_model(&self) -> &str {
        self.config.preferred_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Decode a Gemini SSE body.
///
/// Unlike the chat-completions dialect there is no `[DONE]` sentinel; the
/// stream simply ends. A single chunk can carry text, usage, and a finish
/// reason together, so one SSE event may fan out into several stream
/// events (delta before usage before end).
fn decode_gemini_sse<S, B, E>(
    byte_stream: S,
) -> Pin<Box<dyn Stream<Item = ultramcp_core::Result<StreamEvent>> + Send>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let event_stream = eventsource_stream::EventStream::new(byte_stream);

    let stream = event_stream
        .map(|result| {
            let mut out: Vec<ultramcp_core::Result<StreamEvent>> = Vec::new();
            match result {
                Ok(event) => match serde_json::from_str::<GeminiResponse>(&event.data) {
                    Ok(chunk) => {
                        if let Some(candidate) = chunk.candidates.first() {
                            let text = candidate_text(candidate);
                            if !text.is_empty() {
                                out.push(Ok(StreamEvent::Delta { content: text }));
                            }
                            if let Some(usage) = &chunk.usage_metadata {
                                out.push(Ok(StreamEvent::Usage {
                                    usage: map_usage(usage),
                                }));
                            }
                            if let Some(reason) = &candidate.finish_reason {
                                out.push(Ok(StreamEvent::End {
                                    finish_reason: map_finish_reason(reason),
                                }));
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Skipping unparseable Gemini SSE fragment: {e}");
                    }
                },
                Err(e) => out.push(Err(ultramcp_core::Error::Provider(format!(
                    "Stream error: {e}"
                )))),
            }
            futures::stream::iter(out)
        })
        .flatten();

    Box::pin(stream)
}

//! OpenAI egress connector

use crate::{
    client::{create_client, HttpClientConfig},
    wire, EgressError, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use ultramcp_core::provider::{EventStream, Provider};
use ultramcp_core::types::{GenerateRequest, GenerateResponse, ProviderKind, ReasoningEffort};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "o3";

pub const MODELS: &[&str] = &[
    "gpt-5",
    "gpt-5-mini",
    "o3",
    "o3-mini",
    "o4-mini",
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
];

/// Model prefixes the platform treats as reasoning models.
///
/// These reject any temperature other than 1.0 and take their output limit
/// via `max_completion_tokens`; the `o1`/`o3` families additionally accept
/// a `reasoning_effort` knob.
const REASONING_PREFIXES: &[&str] = &["o1", "o3", "gpt-5"];
const EFFORT_PREFIXES: &[&str] = &["o1", "o3"];

pub fn is_reasoning_model(model: &str) -> bool {
    REASONING_PREFIXES.iter().any(|p| model.starts_with(p))
}

fn takes_reasoning_effort(model: &str) -> bool {
    EFFORT_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// Build a chat-completions request under the OpenAI platform rules.
///
/// Used by both the OpenAI and Azure adapters; other chat-completions
/// upstreams (Grok, Bailian) have their own, less restrictive builders.
pub fn build_chat_request(request: &GenerateRequest, model: &str) -> wire::ChatRequest {
    let reasoning = is_reasoning_model(model);

    // Upstream hard requirement: reasoning models only accept 1.0
    let temperature = if reasoning {
        Some(1.0)
    } else {
        request.temperature
    };

    let (max_tokens, max_completion_tokens) = if reasoning {
        (None, request.max_output_tokens)
    } else {
        (request.max_output_tokens, None)
    };

    let reasoning_effort = takes_reasoning_effort(model).then(|| {
        request
            .reasoning_effort
            .unwrap_or(ReasoningEffort::Medium)
            .as_str()
            .to_string()
    });

    wire::ChatRequest {
        model: model.to_string(),
        messages: wire::messages_from(request),
        temperature,
        max_tokens,
        max_completion_tokens,
        reasoning_effort,
        stream: None,
    }
}

/// OpenAI connector configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: Option<String>,

    /// Base URL for the OpenAI API
    pub base_url: String,

    /// Model used when a request names none
    pub preferred_model: Option<String>,

    /// HTTP client configuration
    pub client_config: HttpClientConfig,
}

impl OpenAIConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            preferred_model: None,
            client_config: HttpClientConfig::default(),
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

/// OpenAI connector
pub struct OpenAIConnector {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIConnector {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = create_client(&config.client_config)?;
        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| EgressError::Config("OpenAI API key is not configured".to_string()))
    }

    fn resolve_model<'a>(&'a self, request: &'a GenerateRequest) -> &'a str {
        request
            .model
            .as_deref()
            .or(self.config.preferred_model.as_deref())
            .unwrap_or(DEFAULT_MODEL)
    }

    async fn post_chat(&self, body: &wire::ChatRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Content-Type", "application/json")
            .bearer_auth(self.api_key()?)
            .json(body)
            .send()
            .await?;

        wire::check_status(response).await
    }
}

#[async_trait]
impl Provider for OpenAIConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    #[instrument(skip(self, request), fields(model = self.resolve_model(&request)))]
    async fn generate(&self, request: GenerateRequest) -> ultramcp_core::Result<GenerateResponse> {
        debug!("Sending non-streaming request to OpenAI");

        let model = self.resolve_model(&request).to_string();
        let body = build_chat_request(&request, &model);

        let response = self.post_chat(&body).await?;
        let chat: wire::ChatResponse = response
            .json()
            .await
            .map_err(|e| EgressError::Parse(format!("Failed to parse OpenAI response: {e}")))?;

        Ok(wire::from_chat_response(chat, ProviderKind::Openai, &model)?)
    }

    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> ultramcp_core::Result<EventStream> {
        debug!("Sending streaming request to OpenAI");

        let model = self.resolve_model(&request).to_string();
        let mut body = build_chat_request(&request, &model);
        body.stream = Some(true);

        let response = self.post_chat(&body).await?;
        Ok(Box::new(wire::decode_sse(response.bytes_stream())))
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

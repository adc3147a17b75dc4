//! xAI Grok egress connector
//!
//! Chat-completions wire at `https://api.x.ai/v1`, accepting the same
//! reasoning-effort knob as the OpenAI reasoning models. Temperature is
//! passed through untouched; xAI does not pin it.

use crate::{
    client::{create_client, HttpClientConfig},
    wire, EgressError, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use ultramcp_core::provider::{EventStream, Provider};
use ultramcp_core::types::{GenerateRequest, GenerateResponse, ProviderKind};

pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_MODEL: &str = "grok-4";

pub const MODELS: &[&str] = &["grok-4", "grok-3", "grok-3-mini", "grok-3-fast"];

/// Grok connector configuration
#[derive(Debug, Clone)]
pub struct GrokConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub preferred_model: Option<String>,
    pub client_config: HttpClientConfig,
}

impl GrokConfig {
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

/// Grok connector
pub struct GrokConnector {
    config: GrokConfig,
    client: Client,
}

impl GrokConnector {
    pub fn new(config: GrokConfig) -> Result<Self> {
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

    fn build_request(&self, request: &GenerateRequest, model: &str) -> wire::ChatRequest {
        wire::ChatRequest {
            model: model.to_string(),
            messages: wire::messages_from(request),
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            max_completion_tokens: None,
            reasoning_effort: request
                .reasoning_effort
                .map(|e| e.as_str().to_string()),
            stream: None,
        }
    }

    async fn post_chat(&self, body: &wire::ChatRequest) -> Result<reqwest::Response> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| EgressError::Config("xAI API key is not configured".to_string()))?;
        wire::post_chat_bearer(&self.client, &self.config.base_url, api_key, body).await
    }
}

#[async_trait]
impl Provider for GrokConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Grok
    }

    #[instrument(skip(self, request), fields(model = self.resolve_model(&request)))]
    async fn generate(&self, request: GenerateRequest) -> ultramcp_core::Result<GenerateResponse> {
        debug!("Sending non-streaming request to Grok");

        let model = self.resolve_model(&request).to_string();
        let body = self.build_request(&request, &model);

        let response = self.post_chat(&body).await?;
        let chat: wire::ChatResponse = response
            .json()
            .await
            .map_err(|e| EgressError::Parse(format!("Failed to parse Grok response: {e}")))?;

        Ok(wire::from_chat_response(chat, ProviderKind::Grok, &model)?)
    }

    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> ultramcp_core::Result<EventStream> {
        debug!("Sending streaming request to Grok");

        let model = self.resolve_model(&request).to_string();
        let mut body = self.build_request(&request, &model);
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

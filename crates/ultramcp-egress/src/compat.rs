//! OpenAI-compatible egress connector for user-supplied endpoints
//!
//! Points the chat-completions wire at a configured base URL (Ollama,
//! OpenRouter, and anything else speaking the dialect). The subtype only
//! changes the authentication requirement: Ollama runs without real
//! credentials and gets a placeholder key, OpenRouter needs a real one.

use crate::{
    client::{create_client, HttpClientConfig},
    wire, EgressError, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use ultramcp_core::provider::{EventStream, Provider};
use ultramcp_core::types::{CompatKind, GenerateRequest, GenerateResponse, ProviderKind};

/// Key sent to endpoints that do not check authentication
const PLACEHOLDER_KEY: &str = "ollama";

pub const DEFAULT_MODEL: &str = "llama3.2";

/// OpenAI-compatible connector configuration
#[derive(Debug, Clone)]
pub struct CompatConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub subtype: CompatKind,
    /// Models this endpoint exposes, as configured by the user
    pub models: Vec<String>,
    pub preferred_model: Option<String>,
    pub client_config: HttpClientConfig,
}

impl CompatConfig {
    pub fn new(subtype: CompatKind, base_url: Option<String>) -> Self {
        Self {
            api_key: None,
            base_url,
            subtype,
            models: Vec::new(),
            preferred_model: None,
            client_config: HttpClientConfig::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }
}

/// OpenAI-compatible connector
pub struct CompatConnector {
    config: CompatConfig,
    client: Client,
}

impl CompatConnector {
    pub fn new(config: CompatConfig) -> Result<Self> {
        let client = create_client(&config.client_config)?;
        Ok(Self { config, client })
    }

    fn resolve_model<'a>(&'a self, request: &'a GenerateRequest) -> &'a str {
        request
            .model
            .as_deref()
            .or(self.config.preferred_model.as_deref())
            .or_else(|| self.config.models.first().map(String::as_str))
            .unwrap_or(DEFAULT_MODEL)
    }

    fn api_key(&self) -> Result<&str> {
        match self.config.subtype {
            CompatKind::Ollama => Ok(self
                .config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .unwrap_or(PLACEHOLDER_KEY)),
            CompatKind::Openrouter => self
                .config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    EgressError::Config("OpenRouter requires an API key".to_string())
                }),
        }
    }

    async fn post_chat(&self, body: &wire::ChatRequest) -> Result<reqwest::Response> {
        let base_url = self.config.base_url.as_deref().ok_or_else(|| {
            EgressError::Config("OpenAI-compatible base URL is not configured".to_string())
        })?;
        wire::post_chat_bearer(&self.client, base_url, self.api_key()?, body).await
    }

    fn build_request(&self, request: &GenerateRequest, model: &str) -> wire::ChatRequest {
        wire::ChatRequest {
            model: model.to_string(),
            messages: wire::messages_from(request),
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            max_completion_tokens: None,
            reasoning_effort: None,
            stream: None,
        }
    }
}

#[async_trait]
impl Provider for CompatConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenaiCompatible
    }

    #[instrument(skip(self, request), fields(model = self.resolve_model(&request)))]
    async fn generate(&self, request: GenerateRequest) -> ultramcp_core::Result<GenerateResponse> {
        debug!("Sending non-streaming request to OpenAI-compatible endpoint");

        let model = self.resolve_model(&request).to_string();
        let body = self.build_request(&request, &model);

        let response = self.post_chat(&body).await?;
        let chat: wire::ChatResponse = response.json().await.map_err(|e| {
            EgressError::Parse(format!("Failed to parse compatible-endpoint response: {e}"))
        })?;

        Ok(wire::from_chat_response(
            chat,
            ProviderKind::OpenaiCompatible,
            &model,
        )?)
    }

    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> ultramcp_core::Result<EventStream> {
        debug!("Sending streaming request to OpenAI-compatible endpoint");

        let model = self.resolve_model(&request).to_string();
        let mut body = self.build_request(&request, &model);
        body.stream = Some(true);

        let response = self.post_chat(&body).await?;
        Ok(Box::new(wire::decode_sse(response.bytes_stream())))
    }

    fn list_models(&self) -> Vec<String> {
        self.config.models.clone()
    }

    fn default_model(&self) -> &str {
        self.config
            .preferred_model
            .as_deref()
            .or_else(|| self.config.models.first().map(String::as_str))
            .unwrap_or(DEFAULT_MODEL)
    }

    fn is_configured(&self) -> bool {
        let has_base = self.config.base_url.as_deref().is_some_and(|u| !u.is_empty());
        match self.config.subtype {
            CompatKind::Ollama => has_base,
            CompatKind::Openrouter => {
                has_base && self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
            }
        }
    }
}

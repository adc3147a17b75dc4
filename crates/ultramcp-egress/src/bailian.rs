//! Alibaba Bailian / DashScope egress connector
//!
//! Uses DashScope's OpenAI-compatible chat-completions endpoint at
//! `…/compatible-mode/v1`. The configured subtype selects the model
//! family (Qwen, Qwen3-Coder, or DeepSeek-R1), each with its own
//! credential environment variable.

use crate::{
    client::{create_client, HttpClientConfig},
    wire, EgressError, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use ultramcp_core::provider::{EventStream, Provider};
use ultramcp_core::types::{BailianKind, GenerateRequest, GenerateResponse, ProviderKind};

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

const QWEN_MODELS: &[&str] = &["qwen-max", "qwen-plus", "qwen-turbo", "qwen-long"];
const QWEN3_CODER_MODELS: &[&str] = &["qwen3-coder-plus", "qwen3-coder-flash"];
const DEEPSEEK_R1_MODELS: &[&str] = &["deepseek-r1", "deepseek-v3"];

pub fn models_for(kind: BailianKind) -> &'static [&'static str] {
    match kind {
        BailianKind::Bailian => QWEN_MODELS,
        BailianKind::Qwen3Coder => QWEN3_CODER_MODELS,
        BailianKind::DeepseekR1 => DEEPSEEK_R1_MODELS,
    }
}

/// Bailian connector configuration
#[derive(Debug, Clone)]
pub struct BailianConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub subtype: BailianKind,
    pub preferred_model: Option<String>,
    pub client_config: HttpClientConfig,
}

impl BailianConfig {
    pub fn new(api_key: Option<String>, subtype: BailianKind) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            subtype,
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

/// Bailian connector
pub struct BailianConnector {
    config: BailianConfig,
    client: Client,
}

impl BailianConnector {
    pub fn new(config: BailianConfig) -> Result<Self> {
        let client = create_client(&config.client_config)?;
        Ok(Self { config, client })
    }

    fn resolve_model<'a>(&'a self, request: &'a GenerateRequest) -> &'a str {
        request
            .model
            .as_deref()
            .or(self.config.preferred_model.as_deref())
            .unwrap_or(models_for(self.config.subtype)[0])
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

    async fn post_chat(&self, body: &wire::ChatRequest) -> Result<reqwest::Response> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            EgressError::Config("DashScope API key is not configured".to_string())
        })?;
        wire::post_chat_bearer(&self.client, &self.config.base_url, api_key, body).await
    }
}

#[async_trait]
impl Provider for BailianConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bailian
    }

    #[instrument(skip(self, request), fields(model = self.resolve_model(&request)))]
    async fn generate(&self, request: GenerateRequest) -> ultramcp_core::Result<GenerateResponse> {
        debug!("Sending non-streaming request to Bailian");

        let model = self.resolve_model(&request).to_string();
        let body = self.build_request(&request, &model);

        let response = self.post_chat(&body).await?;
        let chat: wire::ChatResponse = response
            .json()
            .await
            .map_err(|e| EgressError::Parse(format!("Failed to parse Bailian response: {e}")))?;

        Ok(wire::from_chat_response(chat, ProviderKind::Bailian, &model)?)
    }

    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> ultramcp_core::Result<EventStream> {
        debug!("Sending streaming request to Bailian");

        let model = self.resolve_model(&request).to_string();
        let mut body = self.build_request(&request, &model);
        body.stream = Some(true);

        let response = self.post_chat(&body).await?;
        Ok(Box::new(wire::decode_sse(response.bytes_stream())))
    }

    fn list_models(&self) -> Vec<String> {
        models_for(self.config.subtype)
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    fn default_model(&self) -> &str {
        self.config
            .preferred_model
            .as_deref()
            .unwrap_or(models_for(self.config.subtype)[0])
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

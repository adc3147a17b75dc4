//! Azure OpenAI egress connector
//!
//! Speaks the same chat-completions wire as OpenAI but addresses a
//! per-deployment endpoint and authenticates with an `api-key` header.
//! The platform's reasoning-model rules (temperature pinned to 1.0,
//! `max_completion_tokens`) apply identically.

use crate::{
    client::{create_client, HttpClientConfig},
    openai::build_chat_request,
    wire, EgressError, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use ultramcp_core::provider::{EventStream, Provider};
use ultramcp_core::types::{GenerateRequest, GenerateResponse, ProviderKind};

const API_VERSION: &str = "2024-10-21";

pub const DEFAULT_MODEL: &str = "gpt-4o";

pub const MODELS: &[&str] = &["gpt-5", "o3", "o3-mini", "gpt-4o", "gpt-4o-mini", "gpt-4.1"];

/// Azure OpenAI connector configuration
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub api_key: Option<String>,

    /// Explicit endpoint; when absent it is derived from `resource_name`
    pub base_url: Option<String>,

    /// Azure resource name (`https://{resource}.openai.azure.com`)
    pub resource_name: Option<String>,

    /// Deployment used when a request names none
    pub preferred_model: Option<String>,

    pub client_config: HttpClientConfig,
}

impl AzureConfig {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: None,
            resource_name: None,
            preferred_model: None,
            client_config: HttpClientConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_resource_name(mut self, resource: impl Into<String>) -> Self {
        self.resource_name = Some(resource.into());
        self
    }

    pub fn with_preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }

    /// Endpoint root, trailing slash trimmed.
    pub fn endpoint(&self) -> Option<String> {
        if let Some(url) = &self.base_url {
            return Some(url.trim_end_matches('/').to_string());
        }
        self.resource_name
            .as_ref()
            .map(|r| format!("https://{r}.openai.azure.com"))
    }
}

/// Azure OpenAI connector
pub struct AzureConnector {
    config: AzureConfig,
    client: Client,
}

impl AzureConnector {
    pub fn new(config: AzureConfig) -> Result<Self> {
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

    fn chat_url(&self, deployment: &str) -> Result<String> {
        let endpoint = self.config.endpoint().ok_or_else(|| {
            EgressError::Config("Azure endpoint or resource name is not configured".to_string())
        })?;
        Ok(format!(
            "{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={API_VERSION}"
        ))
    }

    async fn post_chat(&self, deployment: &str, body: &wire::ChatRequest) -> Result<reqwest::Response> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| EgressError::Config("Azure API key is not configured".to_string()))?;

        let response = self
            .client
            .post(self.chat_url(deployment)?)
            .header("Content-Type", "application/json")
            .header("api-key", api_key)
            .json(body)
            .send()
            .await?;

        wire::check_status(response).await
    }
}

#[async_trait]
impl Provider for AzureConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    #[instrument(skip(self, request), fields(model = self.resolve_model(&request)))]
    async fn generate(&self, request: GenerateRequest) -> ultramcp_core::Result<GenerateResponse> {
        debug!("Sending non-streaming request to Azure OpenAI");

        let model = self.resolve_model(&request).to_string();
        let body = build_chat_request(&request, &model);

        let response = self.post_chat(&model, &body).await?;
        let chat: wire::ChatResponse = response
            .json()
            .await
            .map_err(|e| EgressError::Parse(format!("Failed to parse Azure response: {e}")))?;

        Ok(wire::from_chat_response(chat, ProviderKind::Azure, &model)?)
    }

    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> ultramcp_core::Result<EventStream> {
        debug!("Sending streaming request to Azure OpenAI");

        let model = self.resolve_model(&request).to_string();
        let mut body = build_chat_request(&request, &model);
        body.stream = Some(true);

        let response = self.post_chat(&model, &body).await?;
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
            && self.config.endpoint().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_derived_from_resource_name() {
        let config = AzureConfig::new(Some("key".to_string())).with_resource_name("myres");
        assert_eq!(
            config.endpoint().unwrap(),
            "https://myres.openai.azure.com"
        );
    }

    #[test]
    fn explicit_base_url_wins() {
        let config = AzureConfig::new(Some("key".to_string()))
            .with_resource_name("myres")
            .with_base_url("https://custom.example.com/");
        assert_eq!(config.endpoint().unwrap(), "https://custom.example.com");
    }

    #[test]
    fn configured_requires_key_and_endpoint() {
        let connector =
            AzureConnector::new(AzureConfig::new(Some("key".to_string()))).unwrap();
        assert!(!connector.is_configured());

        let connector = AzureConnector::new(
            AzureConfig::new(Some("key".to_string())).with_resource_name("myres"),
        )
        .unwrap();
        assert!(connector.is_configured());
    }

    #[test]
    fn deployment_url_shape() {
        let connector = AzureConnector::new(
            AzureConfig::new(Some("key".to_string())).with_resource_name("myres"),
        )
        .unwrap();
        let url = connector.chat_url("gpt-4o").unwrap();
        assert_eq!(
            url,
            "https://myres.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-10-21"
        );
    }
}

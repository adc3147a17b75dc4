//! Provider registry and tracked dispatch

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use ultramcp_config::Config;
use ultramcp_core::provider::{EventStream, Provider};
use ultramcp_core::types::{GenerateRequest, GenerateResponse, ProviderKind};
use ultramcp_core::{Error, Result};
use ultramcp_egress::{
    azure::{AzureConfig, AzureConnector},
    bailian::{BailianConfig, BailianConnector},
    compat::{CompatConfig, CompatConnector},
    gemini::{GeminiConfig, GeminiConnector},
    grok::{GrokConfig, GrokConnector},
    openai::{OpenAIConfig, OpenAIConnector},
};
use ultramcp_tracking::{CompletionOutcome, RequestTracker, StartContext};

use crate::tracked_stream::TrackedStream;

/// Model listing entry for the `list-ai-models` tool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelListing {
    pub provider: ProviderKind,
    pub models: Vec<String>,
    pub default_model: String,
}

/// Registry mapping provider kinds to adapter implementations.
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    tracker: RequestTracker,
}

impl ProviderRegistry {
    /// Build every adapter from configuration. Unconfigured adapters are
    /// still registered; `is_configured` gates their use.
    pub fn from_config(config: &Config, tracker: RequestTracker) -> Result<Self> {
        let mut providers: HashMap<ProviderKind, Arc<dyn Provider>> = HashMap::new();

        let openai = config.openai.clone().unwrap_or_default();
        let mut openai_config = OpenAIConfig::new(openai.api_key);
        if let Some(url) = openai.base_url {
            openai_config = openai_config.with_base_url(url);
        }
        if let Some(model) = openai.preferred_model {
            openai_config = openai_config.with_preferred_model(model);
        }
        providers.insert(
            ProviderKind::Openai,
            Arc::new(OpenAIConnector::new(openai_config).map_err(Error::from)?),
        );

        let azure = config.azure.clone().unwrap_or_default();
        let mut azure_config = AzureConfig::new(azure.common.api_key);
        if let Some(url) = azure.common.base_url {
            azure_config = azure_config.with_base_url(url);
        }
        if let Some(resource) = azure.resource_name {
            azure_config = azure_config.with_resource_name(resource);
        }
        if let Some(model) = azure.common.preferred_model {
            azure_config = azure_config.with_preferred_model(model);
        }
        providers.insert(
            ProviderKind::Azure,
            Arc::new(AzureConnector::new(azure_config).map_err(Error::from)?),
        );

        let gemini = config.gemini.clone().unwrap_or_default();
        let mut gemini_config = GeminiConfig::new(gemini.api_key);
        if let Some(url) = gemini.base_url {
            gemini_config = gemini_config.with_base_url(url);
        }
        if let Some(model) = gemini.preferred_model {
            gemini_config = gemini_config.with_preferred_model(model);
        }
        providers.insert(
            ProviderKind::Gemini,
            Arc::new(GeminiConnector::new(gemini_config).map_err(Error::from)?),
        );

        let grok = config.grok.clone().unwrap_or_default();
        let mut grok_config = GrokConfig::new(grok.api_key);
        if let Some(url) = grok.base_url {
            grok_config = grok_config.with_base_url(url);
        }
        if let Some(model) = grok.preferred_model {
            grok_config = grok_config.with_preferred_model(model);
        }
        providers.insert(
            ProviderKind::Grok,
            Arc::new(GrokConnector::new(grok_config).map_err(Error::from)?),
        );

        let bailian = config.bailian.clone().unwrap_or_default();
        let mut bailian_config = BailianConfig::new(bailian.common.api_key, bailian.subtype);
        if let Some(url) = bailian.common.base_url {
            bailian_config = bailian_config.with_base_url(url);
        }
        if let Some(model) = bailian.common.preferred_model {
            bailian_config = bailian_config.with_preferred_model(model);
        }
        providers.insert(
            ProviderKind::Bailian,
            Arc::new(BailianConnector::new(bailian_config).map_err(Error::from)?),
        );

        let compat = config.openai_compatible.clone().unwrap_or_default();
        let mut compat_config = CompatConfig::new(compat.subtype, compat.common.base_url)
            .with_models(compat.models);
        if let Some(key) = compat.common.api_key {
            compat_config = compat_config.with_api_key(key);
        }
        if let Some(model) = compat.common.preferred_model {
            compat_config = compat_config.with_preferred_model(model);
        }
        providers.insert(
            ProviderKind::OpenaiCompatible,
            Arc::new(CompatConnector::new(compat_config).map_err(Error::from)?),
        );

        Ok(Self { providers, tracker })
    }

    /// Build a registry from pre-constructed adapters (used by tests).
    pub fn from_providers(providers: Vec<Arc<dyn Provider>>, tracker: RequestTracker) -> Self {
        Self {
            providers: providers.into_iter().map(|p| (p.kind(), p)).collect(),
            tracker,
        }
    }

    /// Providers with complete credentials, in priority order.
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::PRIORITY
            .into_iter()
            .filter(|kind| {
                self.providers
                    .get(kind)
                    .is_some_and(|p| p.is_configured())
            })
            .collect()
    }

    /// Resolve the adapter for a request.
    ///
    /// An explicit provider must be configured; otherwise the first
    /// configured provider in the fixed priority order wins. The result
    /// is a deterministic function of the configuration.
    pub fn select(&self, requested: Option<ProviderKind>) -> Result<&Arc<dyn Provider>> {
        match requested {
            Some(kind) => {
                let provider = self
                    .providers
                    .get(&kind)
                    .ok_or(Error::ConfigurationMissing(kind))?;
                if !provider.is_configured() {
                    return Err(Error::ConfigurationMissing(kind));
                }
                Ok(provider)
            }
            None => ProviderKind::PRIORITY
                .iter()
                .filter_map(|kind| self.providers.get(kind))
                .find(|p| p.is_configured())
                .ok_or(Error::NoProviderConfigured),
        }
    }

    /// Model catalog across configured providers.
    pub fn list_models(&self) -> Vec<ModelListing> {
        self.configured_providers()
            .into_iter()
            .filter_map(|kind| self.providers.get(&kind))
            .map(|p| ModelListing {
                provider: p.kind(),
                models: p.list_models(),
                default_model: p.default_model().to_string(),
            })
            .collect()
    }

    fn start_context(provider: &Arc<dyn Provider>, request: &GenerateRequest) -> StartContext {
        StartContext {
            provider: provider.kind(),
            model: request
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
            tool_name: request.tool_name.clone(),
            prompt: request.prompt.clone(),
        }
    }

    /// Dispatch a non-streaming call with a tracking record around it.
    #[instrument(skip(self, request), fields(tool = request.tool_name.as_deref().unwrap_or("-")))]
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let provider = self.select(request.provider)?;
        debug!(provider = %provider.kind(), "Dispatching generate");

        let guard = self
            .tracker
            .start_tracked(Self::start_context(provider, &request))
            .await
            .map_err(Error::from)?;

        match provider.generate(request).await {
            Ok(response) => {
                guard
                    .complete(CompletionOutcome {
                        response_text: response.text.clone(),
                        usage: response.usage,
                        finish_reason: response.finish_reason,
                        ended_at: Utc::now(),
                    })
                    .await
                    .map_err(Error::from)?;
                Ok(response)
            }
            Err(e) => {
                // Record must close before the error propagates
                if let Err(tracking_err) = guard.fail(&e.to_string()).await {
                    tracing::warn!("Failed to record error outcome: {tracking_err}");
                }
                Err(e)
            }
        }
    }

    /// Dispatch a streaming call. The returned stream completes the
    /// tracking record when the upstream closes and marks it canceled if
    /// the consumer drops mid-stream.
    #[instrument(skip(self, request), fields(tool = request.tool_name.as_deref().unwrap_or("-")))]
    pub async fn stream_generate(&self, request: GenerateRequest) -> Result<EventStream> {
        let provider = self.select(request.provider)?;
        debug!(provider = %provider.kind(), "Dispatching stream");

        let guard = self
            .tracker
            .start_tracked(Self::start_context(provider, &request))
            .await
            .map_err(Error::from)?;

        match provider.stream_generate(request).await {
            Ok(stream) => Ok(Box::new(TrackedStream::new(stream, guard))),
            Err(e) => {
                if let Err(tracking_err) = guard.fail(&e.to_string()).await {
                    tracing::warn!("Failed to record error outcome: {tracking_err}");
                }
                Err(e)
            }
        }
    }

    /// Tracker handle for CLI queries.
    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use ultramcp_core::types::{FinishReason, StreamEvent, Usage};
    use ultramcp_pricing::{PricingService, PricingServiceConfig};
    use ultramcp_tracking::RequestStatus;

    struct FakeProvider {
        kind: ProviderKind,
        configured: bool,
        events: Vec<StreamEvent>,
        fail_with: Option<String>,
    }

    impl FakeProvider {
        fn ready(kind: ProviderKind) -> Arc<dyn Provider> {
            Arc::new(Self {
                kind,
                configured: true,
                events: Vec::new(),
                fail_with: None,
            })
        }

        fn unready(kind: ProviderKind) -> Arc<dyn Provider> {
            Arc::new(Self {
                kind,
                configured: false,
                events: Vec::new(),
                fail_with: None,
            })
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
            if let Some(message) = &self.fail_with {
                return Err(Error::Provider(message.clone()));
            }
            Ok(GenerateResponse {
                text: "ok".to_string(),
                model: "fake-model".to_string(),
                provider: self.kind,
                usage: Some(Usage {
                    input_tokens: 3,
                    output_tokens: 1,
                    total_tokens: 4,
                }),
                finish_reason: Some(FinishReason::Stop),
            })
        }

        async fn stream_generate(&self, _request: GenerateRequest) -> Result<EventStream> {
            let events: Vec<Result<StreamEvent>> =
                self.events.clone().into_iter().map(Ok).collect();
            Ok(Box::new(Box::pin(futures::stream::iter(events))))
        }

        fn list_models(&self) -> Vec<String> {
            vec!["fake-model".to_string()]
        }

        fn default_model(&self) -> &str {
            "fake-model"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    async fn tracker_in(dir: &TempDir) -> RequestTracker {
        let pricing = Arc::new(PricingService::new(
            PricingServiceConfig::new(dir.path().join("pricing"))
                .with_source_url("http://127.0.0.1:9/catalog.json"),
        ));
        RequestTracker::new(&dir.path().join("test.db"), pricing)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn selection_follows_priority_order() {
        let dir = TempDir::new().unwrap();
        let registry = ProviderRegistry::from_providers(
            vec![
                FakeProvider::unready(ProviderKind::Azure),
                FakeProvider::ready(ProviderKind::Openai),
                FakeProvider::ready(ProviderKind::Grok),
            ],
            tracker_in(&dir).await,
        );

        // Azure is first in priority but unconfigured; OpenAI wins
        let selected = registry.select(None).unwrap();
        assert_eq!(selected.kind(), ProviderKind::Openai);

        assert_eq!(
            registry.configured_providers(),
            vec![ProviderKind::Openai, ProviderKind::Grok]
        );
    }

    #[tokio::test]
    async fn explicit_unconfigured_provider_is_an_error() {
        let dir = TempDir::new().unwrap();
        let registry = ProviderRegistry::from_providers(
            vec![FakeProvider::unready(ProviderKind::Gemini)],
            tracker_in(&dir).await,
        );

        let err = match registry.select(Some(ProviderKind::Gemini)) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::ConfigurationMissing(ProviderKind::Gemini)));

        let err = match registry.select(None) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::NoProviderConfigured));
    }

    #[tokio::test]
    async fn generate_closes_record_success() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir).await;
        let registry = ProviderRegistry::from_providers(
            vec![FakeProvider::ready(ProviderKind::Openai)],
            tracker.clone(),
        );

        let response = registry
            .generate(GenerateRequest {
                prompt: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.text, "ok");

        let records = tracker.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RequestStatus::Success);
        assert_eq!(records[0].total_tokens, Some(4));
    }

    #[tokio::test]
    async fn generate_closes_record_error_before_propagating() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir).await;
        let registry = ProviderRegistry::from_providers(
            vec![Arc::new(FakeProvider {
                kind: ProviderKind::Openai,
                configured: true,
                events: Vec::new(),
                fail_with: Some("upstream 500".to_string()),
            }) as Arc<dyn Provider>],
            tracker.clone(),
        );

        let err = registry
            .generate(GenerateRequest {
                prompt: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upstream 500"));

        let records = tracker.recent(10).await.unwrap();
        assert_eq!(records[0].status, RequestStatus::Error);
    }

    #[tokio::test]
    async fn stream_completes_record_with_accumulated_text() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir).await;
        let registry = ProviderRegistry::from_providers(
            vec![Arc::new(FakeProvider {
                kind: ProviderKind::Openai,
                configured: true,
                events: vec![
                    StreamEvent::Delta {
                        content: "He".to_string(),
                    },
                    StreamEvent::Delta {
                        content: "llo".to_string(),
                    },
                    StreamEvent::End {
                        finish_reason: FinishReason::Stop,
                    },
                ],
                fail_with: None,
            }) as Arc<dyn Provider>],
            tracker.clone(),
        );

        let stream = registry
            .stream_generate(GenerateRequest {
                prompt: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let chunks: Vec<String> = stream
            .filter_map(|event| async move {
                match event.unwrap() {
                    StreamEvent::Delta { content } => Some(content),
                    _ => None,
                }
            })
            .collect()
            .await;
        assert_eq!(chunks, vec!["He", "llo"]);

        // Completion runs on a spawned task after stream exhaustion
        let mut record = tracker.recent(1).await.unwrap().remove(0);
        for _ in 0..50 {
            if record.status != RequestStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            record = tracker.recent(1).await.unwrap().remove(0);
        }

        assert_eq!(record.status, RequestStatus::Success);
        assert_eq!(record.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn empty_stream_still_records_success() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir).await;
        let registry = ProviderRegistry::from_providers(
            vec![Arc::new(FakeProvider {
                kind: ProviderKind::Openai,
                configured: true,
                events: Vec::new(),
                fail_with: None,
            }) as Arc<dyn Provider>],
            tracker.clone(),
        );

        let stream = registry
            .stream_generate(GenerateRequest {
                prompt: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let events: Vec<_> = stream.collect().await;
        assert!(events.is_empty());

        let mut record = tracker.recent(1).await.unwrap().remove(0);
        for _ in 0..50 {
            if record.status != RequestStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            record = tracker.recent(1).await.unwrap().remove(0);
        }
        assert_eq!(record.status, RequestStatus::Success);
    }

    #[tokio::test]
    async fn dropped_stream_marks_record_canceled() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker_in(&dir).await;
        let registry = ProviderRegistry::from_providers(
            vec![Arc::new(FakeProvider {
                kind: ProviderKind::Openai,
                configured: true,
                events: vec![StreamEvent::Delta {
                    content: "partial".to_string(),
                }],
                fail_with: None,
            }) as Arc<dyn Provider>],
            tracker.clone(),
        );

        let mut stream = registry
            .stream_generate(GenerateRequest {
                prompt: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        // Pull one chunk, then abandon the stream
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(
            first,
            StreamEvent::Delta {
                content: "partial".to_string()
            }
        );
        drop(stream);

        let mut record = tracker.recent(1).await.unwrap().remove(0);
        for _ in 0..50 {
            if record.status != RequestStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            record = tracker.recent(1).await.unwrap().remove(0);
        }

        assert_eq!(record.status, RequestStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some("canceled"));
    }
}

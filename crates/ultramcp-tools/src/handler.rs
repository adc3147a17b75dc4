//! Tool dispatch into the engine

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use ultramcp_core::types::{GenerateRequest, ProviderKind, ReasoningEffort};
use ultramcp_core::{Error, Result};
use ultramcp_memory::{MemoryStore, MessageRole};
use ultramcp_router::ProviderRegistry;

use crate::catalog::{self, CHALLENGE_PREFIX};

/// Arguments shared by every prompt-driven tool.
#[derive(Debug, Clone, Deserialize, Default)]
struct ToolArgs {
    prompt: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    reasoning_effort: Option<ReasoningEffort>,
    use_search_grounding: Option<bool>,
    session_id: Option<String>,
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Dispatches tool invocations to the provider registry and, when a
/// session is named, appends the exchange to conversation memory.
pub struct ToolHandler {
    registry: Arc<ProviderRegistry>,
    memory: Arc<MemoryStore>,
}

impl ToolHandler {
    pub fn new(registry: Arc<ProviderRegistry>, memory: Arc<MemoryStore>) -> Self {
        Self { registry, memory }
    }

    /// Invoke a tool by catalog name.
    #[instrument(skip(self, args))]
    pub async fn call_tool(&self, name: &str, args: serde_json::Value) -> Result<ToolOutput> {
        if name == "list-ai-models" {
            let listing = self.registry.list_models();
            return Ok(ToolOutput {
                text: serde_json::to_string_pretty(&listing)?,
                session_id: None,
            });
        }

        let tool = catalog::find_tool(name)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown tool: {name}")))?;
        let args: ToolArgs = serde_json::from_value(args)
            .map_err(|e| Error::InvalidRequest(format!("invalid arguments for {name}: {e}")))?;

        let request = build_request(&tool, &args)?;
        let session_id = args.session_id.clone();

        debug!(tool = name, "Dispatching tool call");
        let response = self.registry.generate(request).await?;

        if let Some(session_id) = &session_id {
            self.record_exchange(session_id, name, &args, &response.text)
                .await?;
        }

        Ok(ToolOutput {
            text: response.text,
            session_id,
        })
    }

    async fn record_exchange(
        &self,
        session_id: &str,
        tool_name: &str,
        args: &ToolArgs,
        response_text: &str,
    ) -> Result<()> {
        let session = self
            .memory
            .get_or_create_session(Some(session_id), None)
            .await?;

        let prompt = args.prompt.clone().unwrap_or_default();
        self.memory
            .add_message(
                &session.id,
                MessageRole::User,
                &prompt,
                Some(tool_name),
                None,
                None,
            )
            .await?;
        self.memory
            .add_message(
                &session.id,
                MessageRole::Assistant,
                response_text,
                Some(tool_name),
                None,
                None,
            )
            .await?;
        Ok(())
    }
}

fn build_request(tool: &catalog::ToolDefinition, args: &ToolArgs) -> Result<GenerateRequest> {
    let prompt = args
        .prompt
        .clone()
        .ok_or_else(|| Error::InvalidRequest(format!("{} requires a prompt", tool.name)))?;

    // The challenge preamble is part of the prompt and is forwarded to the
    // provider unchanged.
    let prompt = if tool.name == "challenge" {
        format!("{CHALLENGE_PREFIX}{prompt}")
    } else {
        prompt
    };

    let provider = match args.provider.as_deref() {
        Some(name) => Some(
            ProviderKind::parse(name)
                .ok_or_else(|| Error::InvalidRequest(format!("unknown provider: {name}")))?,
        ),
        None => None,
    };

    Ok(GenerateRequest {
        provider,
        model: args.model.clone(),
        prompt,
        system_prompt: tool.system_prompt.map(str::to_string),
        temperature: args.temperature,
        max_output_tokens: args.max_output_tokens,
        reasoning_effort: args.reasoning_effort,
        use_search_grounding: args.use_search_grounding,
        tool_name: Some(tool.name.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use ultramcp_core::provider::{EventStream, Provider};
    use ultramcp_core::types::{FinishReason, GenerateResponse, Usage};
    use ultramcp_pricing::{PricingService, PricingServiceConfig};
    use ultramcp_tracking::RequestTracker;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Openai
        }

        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                text: format!("echo: {}", request.prompt),
                model: "fake-model".to_string(),
                provider: ProviderKind::Openai,
                usage: Some(Usage {
                    input_tokens: 1,
                    output_tokens: 1,
                    total_tokens: 2,
                }),
                finish_reason: Some(FinishReason::Stop),
            })
        }

        async fn stream_generate(&self, _request: GenerateRequest) -> Result<EventStream> {
            Ok(Box::new(Box::pin(futures::stream::empty())))
        }

        fn list_models(&self) -> Vec<String> {
            vec!["fake-model".to_string()]
        }

        fn default_model(&self) -> &str {
            "fake-model"
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    async fn handler_in(dir: &TempDir) -> (ToolHandler, Arc<MemoryStore>) {
        let pricing = Arc::new(PricingService::new(
            PricingServiceConfig::new(dir.path().join("pricing"))
                .with_source_url("http://127.0.0.1:9/catalog.json"),
        ));
        let tracker = RequestTracker::new(&dir.path().join("test.db"), pricing)
            .await
            .unwrap();
        let registry = Arc::new(ProviderRegistry::from_providers(
            vec![Arc::new(EchoProvider) as Arc<dyn Provider>],
            tracker,
        ));
        let memory = Arc::new(
            MemoryStore::new(&dir.path().join("memory.db")).await.unwrap(),
        );
        (ToolHandler::new(registry.clone(), memory.clone()), memory)
    }

    #[tokio::test]
    async fn dispatches_prompt_tool() {
        let dir = TempDir::new().unwrap();
        let (handler, _memory) = handler_in(&dir).await;

        let output = handler
            .call_tool(
                "deep-reasoning",
                serde_json::json!({"prompt": "why is the sky blue"}),
            )
            .await
            .unwrap();

        assert_eq!(output.text, "echo: why is the sky blue");
    }

    #[tokio::test]
    async fn challenge_prefix_is_forwarded_unchanged() {
        let dir = TempDir::new().unwrap();
        let (handler, _memory) = handler_in(&dir).await;

        let output = handler
            .call_tool("challenge", serde_json::json!({"prompt": "rust is slow"}))
            .await
            .unwrap();

        // Echo provider reflects the exact prompt it received
        assert!(output.text.contains("CRITICAL REASSESSMENT"));
        assert!(output.text.ends_with("rust is slow"));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (handler, _memory) = handler_in(&dir).await;

        let err = handler
            .call_tool("make-coffee", serde_json::json!({"prompt": "x"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (handler, _memory) = handler_in(&dir).await;

        let err = handler
            .call_tool(
                "research",
                serde_json::json!({"prompt": "x", "provider": "anthropic"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[tokio::test]
    async fn session_argument_appends_exchange_to_memory() {
        let dir = TempDir::new().unwrap();
        let (handler, memory) = handler_in(&dir).await;

        let output = handler
            .call_tool(
                "investigate",
                serde_json::json!({"prompt": "what changed", "session_id": "s-42"}),
            )
            .await
            .unwrap();
        assert_eq!(output.session_id.as_deref(), Some("s-42"));

        let messages = memory.messages("s-42").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "what changed");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert!(messages[1].content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn list_ai_models_does_not_call_provider() {
        let dir = TempDir::new().unwrap();
        let (handler, _memory) = handler_in(&dir).await;

        let output = handler
            .call_tool("list-ai-models", serde_json::json!({}))
            .await
            .unwrap();
        assert!(output.text.contains("fake-model"));
    }
}

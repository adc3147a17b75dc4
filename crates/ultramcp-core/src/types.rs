//! Uniform request, response, and stream types

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of upstream provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Azure,
    Openai,
    Gemini,
    Grok,
    Bailian,
    OpenaiCompatible,
}

impl ProviderKind {
    /// Fixed priority order used when a request does not name a provider.
    pub const PRIORITY: [ProviderKind; 6] = [
        ProviderKind::Azure,
        ProviderKind::Openai,
        ProviderKind::Gemini,
        ProviderKind::Grok,
        ProviderKind::Bailian,
        ProviderKind::OpenaiCompatible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Azure => "azure",
            ProviderKind::Openai => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Grok => "grok",
            ProviderKind::Bailian => "bailian",
            ProviderKind::OpenaiCompatible => "openai-compatible",
        }
    }

    /// Parse a provider name as it appears in tool arguments and config.
    ///
    /// Accepts `google` as an alias for `gemini` since both appear in the
    /// wild in client configurations.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "azure" => Some(ProviderKind::Azure),
            "openai" => Some(ProviderKind::Openai),
            "gemini" | "google" => Some(ProviderKind::Gemini),
            "grok" | "xai" => Some(ProviderKind::Grok),
            "bailian" => Some(ProviderKind::Bailian),
            "openai-compatible" => Some(ProviderKind::OpenaiCompatible),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DashScope compatible-mode subtypes, each with its own model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BailianKind {
    #[default]
    Bailian,
    Qwen3Coder,
    DeepseekR1,
}

/// Subtype of a user-supplied OpenAI-compatible endpoint.
///
/// The subtype decides the authentication requirement: Ollama runs locally
/// and accepts a placeholder key, OpenRouter requires a real one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompatKind {
    #[default]
    Ollama,
    Openrouter,
}

/// Reasoning effort knob for reasoning-capable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

/// Uniform text-generation request accepted by every adapter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerateRequest {
    /// Target provider; when absent the registry picks by priority order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,

    /// Model identifier; when absent the provider's preferred or hardcoded
    /// default model is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// User prompt, passed through literally
    pub prompt: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Ask the provider to consult live web search during generation.
    /// Defaulted to true by the Gemini adapter on its Pro tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_search_grounding: Option<bool>,

    /// Name of the MCP tool that produced this request, for tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Token usage reported by an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why generation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop point
    Stop,

    /// Max tokens reached
    Length,

    /// Content filtered
    ContentFilter,

    /// Error occurred
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Error => "error",
        }
    }
}

/// Uniform non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text
    pub text: String,

    /// Model that actually served the request
    pub model: String,

    pub provider: ProviderKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One event of a streaming response.
///
/// Adapters yield `Delta` items in upstream order, then at most one `Usage`
/// and one `End` before the stream closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A decoded content fragment
    Delta { content: String },

    /// Usage totals from the upstream's final chunk
    Usage { usage: Usage },

    /// Clean termination
    End { finish_reason: FinishReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parse_roundtrip() {
        for kind in ProviderKind::PRIORITY {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn provider_kind_google_alias() {
        assert_eq!(ProviderKind::parse("google"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::parse("anthropic"), None);
    }

    #[test]
    fn priority_order_is_azure_first() {
        assert_eq!(ProviderKind::PRIORITY[0], ProviderKind::Azure);
        assert_eq!(
            ProviderKind::PRIORITY[5],
            ProviderKind::OpenaiCompatible
        );
    }

    #[test]
    fn stream_event_serde() {
        let event = StreamEvent::Delta {
            content: "He".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"delta","content":"He"}"#);
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

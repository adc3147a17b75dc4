//! UltraMCP Egress Connectors
//!
//! One adapter per upstream provider family, all implementing the core
//! `Provider` trait over their native wire formats:
//! - OpenAI and Azure OpenAI (chat completions)
//! - Google Gemini (generateContent)
//! - xAI Grok, Alibaba Bailian, and user-supplied OpenAI-compatible
//!   endpoints (chat-completions wire)

use thiserror::Error;

pub mod azure;
pub mod bailian;
pub mod client;
pub mod compat;
pub mod embeddings;
pub mod gemini;
pub mod grok;
pub mod openai;
pub mod wire;

pub use client::{create_client, HttpClientConfig};

/// Egress-specific errors
#[derive(Debug, Error)]
pub enum EgressError {
    /// Transport failure: network, DNS, TLS
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the upstream
    #[error("Provider error: {status_code} - {message}")]
    Provider { status_code: u16, message: String },

    /// Failed to parse a provider response body
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Invalid adapter configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Egress result type
pub type Result<T> = std::result::Result<T, EgressError>;

impl From<EgressError> for ultramcp_core::Error {
    fn from(err: EgressError) -> Self {
        ultramcp_core::Error::Provider(err.to_string())
    }
}

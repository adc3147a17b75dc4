//! Error types for UltraMCP Core

use thiserror::Error;

use crate::types::ProviderKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(
        "Provider '{0}' is not configured. Run `ultramcp config set-key --provider {0}` to add credentials."
    )]
    ConfigurationMissing(ProviderKind),

    #[error("No provider is configured")]
    NoProviderConfigured,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Request was canceled")]
    Canceled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    // Session / memory errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

//! UltraMCP Conversation Memory
//!
//! Persistent sessions with ordered messages, deduplicated file
//! attachments, per-session budgets, accurate token counting, and
//! token-budget context pruning.

use thiserror::Error;

pub mod context;
pub mod store;
pub mod tokens;

pub use context::{ConversationContext, FILE_TOKEN_RATIO, MESSAGE_TOKEN_RATIO};
pub use store::{
    AddFilesResult, BudgetStatus, ConversationBudget, ConversationFile, ConversationMessage,
    MemoryStore, MessageRole, NewFile, Session, SessionPage, SessionStatus, SessionSummary,
};
pub use tokens::{count_text, count_text_for_model, TokenCount};

/// Memory errors
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl From<MemoryError> for ultramcp_core::Error {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::SessionNotFound(id) => ultramcp_core::Error::SessionNotFound(id),
            MemoryError::Database(msg) => ultramcp_core::Error::Database(msg),
        }
    }
}

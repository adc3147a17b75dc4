//! Provider trait definitions

use crate::{
    Result,
    types::{GenerateRequest, GenerateResponse, ProviderKind, StreamEvent},
};
use futures::Stream;

/// Boxed event stream returned by [`Provider::stream_generate`].
///
/// Dropping the stream aborts the in-flight upstream request.
pub type EventStream = Box<dyn Stream<Item = Result<StreamEvent>> + Send + Unpin>;

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Which upstream family this adapter speaks to
    fn kind(&self) -> ProviderKind;

    /// Send a non-streaming request
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Send a streaming request
    async fn stream_generate(&self, request: GenerateRequest) -> Result<EventStream>;

    /// Static set of models this adapter exposes (never a remote call).
    /// For OpenAI-compatible endpoints the set comes from configuration.
    fn list_models(&self) -> Vec<String>;

    /// Model used when the request names none and no preference is configured
    fn default_model(&self) -> &str;

    /// True iff the credentials required by this upstream are present
    fn is_configured(&self) -> bool;
}

/// Narrow embedding interface reusing the chat provider's credentials.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    ///
    /// The default implementation issues one request per text; providers
    /// with a batch endpoint override this with a single call.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding model in use
    fn model(&self) -> &str;
}

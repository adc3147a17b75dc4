//! Embedding subservice
//!
//! A narrower interface than the chat adapters, reusing their credentials.
//! Providers with a batch endpoint issue one request for `embed_many`;
//! Azure's embedding deployments reject batch inputs, so the Azure
//! embedder iterates sequentially and concatenates results.

use crate::{
    client::{create_client, HttpClientConfig},
    wire::check_status,
    EgressError, Result,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use ultramcp_core::provider::EmbeddingProvider;

pub const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";
pub const GEMINI_DEFAULT_MODEL: &str = "text-embedding-004";
pub const BAILIAN_DEFAULT_MODEL: &str = "text-embedding-v1";

const AZURE_API_VERSION: &str = "2024-10-21";

// OpenAI-style embeddings wire, also used by Azure and Bailian

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

async fn post_embeddings(
    client: &Client,
    url: String,
    auth: Auth<'_>,
    model: &str,
    texts: Vec<&str>,
) -> Result<Vec<Vec<f32>>> {
    let mut builder = client.post(url).json(&EmbeddingsRequest {
        model,
        input: texts,
    });
    builder = match auth {
        Auth::Bearer(key) => builder.bearer_auth(key),
        Auth::ApiKeyHeader(key) => builder.header("api-key", key),
    };

    let response = check_status(builder.send().await?).await?;
    let parsed: EmbeddingsResponse = response
        .json()
        .await
        .map_err(|e| EgressError::Parse(format!("Failed to parse embeddings response: {e}")))?;

    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

enum Auth<'a> {
    Bearer(&'a str),
    ApiKeyHeader(&'a str),
}

fn single_vector(mut vectors: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    if vectors.len() != 1 {
        return Err(EgressError::Parse(format!(
            "expected one embedding, got {}",
            vectors.len()
        )));
    }
    Ok(vectors.remove(0))
}

/// OpenAI (and OpenAI-compatible) embedder with a native batch endpoint.
pub struct OpenAIEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAIEmbedder {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: Option<String>) -> Result<Self> {
        Ok(Self {
            client: create_client(&HttpClientConfig::default())?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed_one(&self, text: &str) -> ultramcp_core::Result<Vec<f32>> {
        let input = [text.to_string()];
        let vectors = self.embed_many(&input).await?;
        Ok(single_vector(vectors)?)
    }

    async fn embed_many(&self, texts: &[String]) -> ultramcp_core::Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), "Batch embedding via OpenAI");
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        Ok(post_embeddings(&self.client, url, Auth::Bearer(&self.api_key), &self.model, inputs)
            .await?)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Azure embedder.
///
/// The deployment endpoint accepts one input per request; `embed_many`
/// inherits the trait's sequential default, which issues exactly one HTTP
/// request per text.
pub struct AzureEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl AzureEmbedder {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, model: Option<String>) -> Result<Self> {
        Ok(Self {
            client: create_client(&HttpClientConfig::default())?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for AzureEmbedder {
    async fn embed_one(&self, text: &str) -> ultramcp_core::Result<Vec<f32>> {
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={AZURE_API_VERSION}",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        let vectors = post_embeddings(
            &self.client,
            url,
            Auth::ApiKeyHeader(&self.api_key),
            &self.model,
            vec![text],
        )
        .await?;
        Ok(single_vector(vectors)?)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Bailian embedder over the DashScope compatible-mode batch endpoint.
pub struct BailianEmbedder {
    inner: OpenAIEmbedder,
}

impl BailianEmbedder {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: Option<String>) -> Result<Self> {
        Ok(Self {
            inner: OpenAIEmbedder::new(
                api_key,
                base_url,
                Some(model.unwrap_or_else(|| BAILIAN_DEFAULT_MODEL.to_string())),
            )?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for BailianEmbedder {
    async fn embed_one(&self, text: &str) -> ultramcp_core::Result<Vec<f32>> {
        self.inner.embed_one(text).await
    }

    async fn embed_many(&self, texts: &[String]) -> ultramcp_core::Result<Vec<Vec<f32>>> {
        self.inner.embed_many(texts).await
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

// Gemini embeddings wire

#[derive(Debug, Serialize)]
struct GeminiEmbedRequest<'a> {
    content: GeminiEmbedContent<'a>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbedContent<'a> {
    parts: Vec<GeminiEmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiBatchEmbedRequest<'a> {
    requests: Vec<GeminiBatchEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiBatchEntry<'a> {
    model: String,
    content: GeminiEmbedContent<'a>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiEmbedding,
}

#[derive(Debug, Deserialize)]
struct GeminiBatchEmbedResponse {
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

/// Gemini embedder using `embedContent` / `batchEmbedContents`.
pub struct GeminiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: Option<String>) -> Result<Self> {
        Ok(Self {
            client: create_client(&HttpClientConfig::with_env_proxy())?,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{method}?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed_one(&self, text: &str) -> ultramcp_core::Result<Vec<f32>> {
        let body = GeminiEmbedRequest {
            content: GeminiEmbedContent {
                parts: vec![GeminiEmbedPart { text }],
            },
        };

        let response = self
            .client
            .post(self.endpoint("embedContent"))
            .json(&body)
            .send()
            .await
            .map_err(EgressError::from)?;
        let response = check_status(response).await?;

        let parsed: GeminiEmbedResponse = response.json().await.map_err(|e| {
            EgressError::Parse(format!("Failed to parse Gemini embedding response: {e}"))
        })?;
        Ok(parsed.embedding.values)
    }

    async fn embed_many(&self, texts: &[String]) -> ultramcp_core::Result<Vec<Vec<f32>>> {
        debug!(count = texts.len(), "Batch embedding via Gemini");

        let body = GeminiBatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| GeminiBatchEntry {
                    model: format!("models/{}", self.model),
                    content: GeminiEmbedContent {
                        parts: vec![GeminiEmbedPart { text }],
                    },
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint("batchEmbedContents"))
            .json(&body)
            .send()
            .await
            .map_err(EgressError::from)?;
        let response = check_status(response).await?;

        let parsed: GeminiBatchEmbedResponse = response.json().await.map_err(|e| {
            EgressError::Parse(format!("Failed to parse Gemini batch embedding response: {e}"))
        })?;
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

//! LiteLLM catalog ingest: field coercion and entry filtering

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::{PricingError, Result};

/// Name fragments that mark non-chat entries (image generation, speech,
/// embeddings, moderation). These are filtered out at ingest.
const EXCLUDED_NAME_FRAGMENTS: &[&str] = &[
    "dall-e",
    "whisper",
    "tts",
    "embedding",
    "moderation",
    "flux",
    "stable-diffusion",
    "sample_spec",
];

/// Per-model pricing entry as consumed from the LiteLLM document.
///
/// Numeric fields occasionally arrive as strings in the upstream JSON; every
/// numeric field tolerates that. Unknown fields are ignored so newly added
/// catalog columns never break ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelPricing {
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub input_cost_per_token: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub output_cost_per_token: Option<f64>,

    #[serde(
        default,
        rename = "input_cost_per_token_above_200k_tokens",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub input_cost_per_token_above_200k: Option<f64>,

    #[serde(
        default,
        rename = "output_cost_per_token_above_200k_tokens",
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_cost_per_token_above_200k: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub input_cost_per_image: Option<f64>,

    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub output_cost_per_image: Option<f64>,

    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<u64>,

    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_function_calling: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supports_vision: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub litellm_provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl ModelPricing {
    /// An entry is retained only when it carries both base token prices, or
    /// explicit image pricing.
    pub fn is_usable(&self) -> bool {
        (self.input_cost_per_token.is_some() && self.output_cost_per_token.is_some())
            || self.input_cost_per_image.is_some()
            || self.output_cost_per_image.is_some()
    }
}

/// Map of model name to pricing entry.
pub type PricingData = HashMap<String, ModelPricing>;

/// Envelope persisted to `litellm-pricing-cache.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub metadata: CacheMetadata,
    pub data: PricingData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Unix epoch seconds of the fetch that produced this file
    pub timestamp: i64,
    pub source_url: String,
    pub ttl_secs: u64,
}

impl CacheFile {
    /// Freshness: `now − timestamp < ttl`.
    pub fn is_fresh(&self, now_epoch_secs: i64) -> bool {
        let age = now_epoch_secs.saturating_sub(self.metadata.timestamp);
        age >= 0 && (age as u64) < self.metadata.ttl_secs
    }
}

/// Parse the raw catalog document and apply the ingest rules:
/// skip excluded name fragments, drop entries without usable pricing,
/// silently skip entries that fail to deserialize.
pub fn ingest_catalog(raw: &str) -> Result<PricingData> {
    let document: HashMap<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| PricingError::Parse(e.to_string()))?;

    let mut data = PricingData::with_capacity(document.len());
    for (name, value) in document {
        let lower = name.to_lowercase();
        if EXCLUDED_NAME_FRAGMENTS.iter().any(|frag| lower.contains(frag)) {
            continue;
        }

        let Ok(pricing) = serde_json::from_value::<ModelPricing>(value) else {
            continue;
        };
        if pricing.is_usable() {
            data.insert(name, pricing);
        }
    }

    Ok(data)
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => Ok(s.trim().parse::<f64>().ok()),
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?.map(|f| f as u64))
}

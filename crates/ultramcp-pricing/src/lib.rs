//! UltraMCP Pricing Service
//!
//! Fetches the LiteLLM model-price catalog, caches it on disk and in memory,
//! and resolves per-call cost with tiered (above-200k-token) rates.

use thiserror::Error;

pub mod catalog;
pub mod cost;
pub mod normalize;
pub mod service;

pub use catalog::{CacheFile, CacheMetadata, ModelPricing, PricingData};
pub use cost::{format_cost, CostBreakdown, TIER_THRESHOLD_TOKENS};
pub use normalize::normalize_model_name;
pub use service::{PricingService, PricingServiceConfig};

/// Pricing fetch and cache errors
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Failed to fetch pricing: {0}")]
    Fetch(String),

    #[error("Failed to parse pricing: {0}")]
    Parse(String),

    #[error("Failed to read cache: {0}")]
    CacheRead(String),

    #[error("Failed to write cache: {0}")]
    CacheWrite(String),

    /// Remote fetch failed and no disk cache exists, stale or otherwise
    #[error("Pricing data unavailable: remote fetch failed and no cache exists")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, PricingError>;

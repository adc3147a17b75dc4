//! UltraMCP Configuration Store
//!
//! Persists per-provider credentials to a platform config directory and
//! overlays environment variables on read. The config file wins when both
//! sources define a value.

pub mod schema;
pub mod store;

pub use schema::{
    AzureSettings, BailianSettings, CompatSettings, Config, ProviderSettings, VectorConfig,
};
pub use store::ConfigStore;

//! UltraMCP Provider Registry
//!
//! Maps provider kinds to adapter implementations, applies the fixed
//! selection priority when a request names no provider, and dispatches
//! generate/stream calls with a tracking record opened around every
//! upstream call.

pub mod registry;
pub mod tracked_stream;

pub use registry::{ModelListing, ProviderRegistry};

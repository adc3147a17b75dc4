//! UltraMCP Request Tracking
//!
//! Every model call opens a tracking record before the upstream request
//! goes out and closes it exactly once on success, failure, or
//! cancellation. Completed records carry token counts and the cost
//! resolved against the pricing service.

use thiserror::Error;

pub mod tracker;

pub use tracker::{
    CompletionOutcome, RequestRecord, RequestStatus, RequestTracker, StartContext, TrackedCall,
    TrackerStats,
};

/// Tracking errors
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Request record not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, TrackingError>;

impl From<TrackingError> for ultramcp_core::Error {
    fn from(err: TrackingError) -> Self {
        ultramcp_core::Error::Database(err.to_string())
    }
}

//! UltraMCP Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout UltraMCP:
//! - Uniform generate/stream request and response types
//! - Provider and embedding trait abstractions
//! - Core error types

pub mod error;
pub mod provider;
pub mod types;

pub use error::{Error, Result};

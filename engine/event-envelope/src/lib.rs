//! Event Envelope - the unit of work moving through the analytics pipeline
//!
//! An envelope is built from untrusted request JSON by the ingestion endpoint,
//! serialized to its wire form for the queue, and decoded unchanged by the
//! event processor. Nothing mutates it in between.

pub mod envelope;
pub mod error;

pub use envelope::{DecodeError, EventEnvelope};
pub use error::ValidationError;

/// Result type for envelope validation
pub type Result<T> = std::result::Result<T, ValidationError>;

/// The five fields every envelope must carry, in wire order
pub const REQUIRED_FIELDS: [&str; 5] = ["site_id", "event_type", "path", "user_id", "timestamp"];

//! EventStore - append-only analytics store and on-demand site statistics
//!
//! Rows are written one per processed envelope and never updated. Delivery
//! upstream is at-least-once, so the same envelope may appear more than once;
//! the store keeps every copy.

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod stats;

pub use config::StoreConfig;
pub use error::StoreError;
pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;
pub use stats::{SiteStats, TopPath, TOP_PATHS_LIMIT};

use async_trait::async_trait;
use chrono::NaiveDate;
use event_envelope::EventEnvelope;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage-assigned identity of a persisted row
pub type EventRowId = i64;

/// Write and read side of the analytics store
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one envelope as a new row; atomic, no partial row on failure
    async fn insert_event(&self, event: &EventEnvelope) -> Result<EventRowId>;

    /// Aggregate the rows of `site_id` whose UTC calendar day is `date`
    async fn site_stats(&self, site_id: &str, date: NaiveDate) -> Result<SiteStats>;

    /// Round-trip check against the backing store
    async fn ping(&self) -> Result<()>;
}

//! EventQueue - durable FIFO hand-off between ingestion and processing
//!
//! The queue is a byte-transparent buffer: producers append serialized
//! envelopes to the tail of one named list and consumers block on the head.
//! [`RedisQueue`] is the production backend (LPUSH / BRPOP on a Redis list);
//! [`MemoryQueue`] is an in-process stand-in with switchable availability.

pub mod config;
pub mod error;
pub mod memory;
pub mod redis_queue;

pub use config::QueueConfig;
pub use error::QueueError;
pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;

use async_trait::async_trait;
use std::time::Duration;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Default name of the shared list
pub const DEFAULT_QUEUE_NAME: &str = "events_queue";

/// Append / blocking-pop contract shared by every queue backend
///
/// On any error the caller must assume the item was not stored (enqueue) or
/// not removed (dequeue).
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Append a payload to the tail of the queue
    async fn enqueue(&self, payload: &str) -> Result<()>;

    /// Remove and return the head of the queue, waiting up to `timeout`
    ///
    /// Returns `Ok(None)` when the timeout elapses with the queue still empty.
    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<String>>;

    /// Number of items currently waiting
    async fn depth(&self) -> Result<u64>;

    /// Round-trip check against the backing service
    async fn ping(&self) -> Result<()>;

    /// Name of the list this client appends to and pops from
    fn queue_name(&self) -> &str;
}

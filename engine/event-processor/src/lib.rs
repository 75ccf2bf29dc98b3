//! EventProcessor - moves queued events into the analytics store
//!
//! Three pieces cooperate here:
//! - [`Dispatcher`] blocks on the queue and hands each popped item off
//!   without waiting for it to be processed.
//! - [`TaskRunner`] owns a worker pool fed by a bounded channel and applies
//!   the [`RetryPolicy`] to failed tasks.
//! - [`EventProcessor`] is the task itself: decode one envelope, insert one row.
//!
//! Delivery is at-least-once. An item popped but not yet handed to the runner
//! is lost if the process dies; a task retried after a write that actually
//! committed produces a duplicate row. Both are accepted.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod processor;
pub mod runner;

pub use config::{DispatcherConfig, ProcessorConfig, RetryPolicy, RunnerConfig};
pub use dispatcher::{Dispatcher, DispatcherSummary};
pub use error::{ProcessingError, SubmitError};
pub use processor::EventProcessor;
pub use runner::{RunnerStats, TaskHandler, TaskOutcome, TaskReport, TaskRunner, TaskSubmitter};

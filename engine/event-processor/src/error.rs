//! Error types for event processing

use event_envelope::DecodeError;
use event_store::StoreError;
use thiserror::Error;

/// Why a single processing task failed
///
/// These never reach a network caller; the task runner logs them and decides
/// whether to try again.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("could not decode queued event: {0}")]
    Decode(#[from] DecodeError),

    #[error("could not store event: {0}")]
    Storage(#[from] StoreError),
}

impl ProcessingError {
    /// Whether running the same task again could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessingError::Decode(_) => false,
            ProcessingError::Storage(e) => e.is_transient(),
        }
    }
}

/// The task runner no longer accepts work; the payload is handed back
#[derive(Error, Debug)]
#[error("task runner is shut down")]
pub struct SubmitError {
    pub payload: String,
}

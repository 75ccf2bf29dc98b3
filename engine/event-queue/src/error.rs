//! Error types for queue operations

use thiserror::Error;

/// Errors that can occur while talking to the queue
#[derive(Error, Debug)]
pub enum QueueError {
    /// The queue service could not be reached; transient, safe to retry later
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    /// The service answered but the command failed
    #[error("queue command failed: {0}")]
    Command(String),

    /// Client-side misconfiguration (bad URL, etc.)
    #[error("queue configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Whether the failure indicates the service is unreachable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            QueueError::Unavailable(err.to_string())
        } else if err.kind() == redis::ErrorKind::InvalidClientConfig {
            QueueError::Config(err.to_string())
        } else {
            QueueError::Command(err.to_string())
        }
    }
}

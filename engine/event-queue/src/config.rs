//! Configuration for the event queue

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Redis connection URL
    pub url: String,

    /// Name of the list used as the hand-off buffer
    pub name: String,

    /// Upper bound on establishing a connection, in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            name: crate::DEFAULT_QUEUE_NAME.to_string(),
            connect_timeout_ms: 2000,
        }
    }
}

impl QueueConfig {
    /// Get the connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("queue name must not be empty".to_string());
        }
        if !(self.url.starts_with("redis://")
            || self.url.starts_with("rediss://")
            || self.url.starts_with("redis+unix://")
            || self.url.starts_with("unix://"))
        {
            return Err(format!("unsupported queue url: {}", self.url));
        }
        if self.connect_timeout_ms == 0 {
            return Err("queue connect_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

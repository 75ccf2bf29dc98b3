//! Configuration for dispatching and running processing tasks

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Processing-side configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub dispatcher: DispatcherConfig,
    pub runner: RunnerConfig,
}

/// Dispatcher loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Longest single blocking pop, in milliseconds
    pub dequeue_timeout_ms: u64,

    /// Pause after a queue failure before popping again, in milliseconds
    pub unavailable_backoff_ms: u64,
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of concurrent task workers
    pub workers: usize,

    /// Tasks buffered between the dispatcher and the workers
    pub channel_capacity: usize,

    pub retry: RetryPolicy,
}

/// Retry policy applied to transient task failures
///
/// Attempt `n` (1-based) that fails is followed by a pause of
/// `initial_backoff_ms * multiplier^(n-1)`, capped at `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { dequeue_timeout_ms: 5_000, unavailable_backoff_ms: 5_000 }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { workers: 4, channel_capacity: 1024, retry: RetryPolicy::default() }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 500, multiplier: 2.0, max_backoff_ms: 30_000 }
    }
}

impl DispatcherConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn unavailable_backoff(&self) -> Duration {
        Duration::from_millis(self.unavailable_backoff_ms)
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    /// Pause after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let capped = if delay.is_finite() { delay.min(self.max_backoff_ms as f64) } else { self.max_backoff_ms as f64 };
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Whether another attempt is allowed after `attempt` attempts
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl ProcessorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.dispatcher.dequeue_timeout_ms == 0 {
            return Err("dequeue_timeout_ms must be greater than 0".to_string());
        }
        if self.runner.workers == 0 {
            return Err("runner workers must be greater than 0".to_string());
        }
        if self.runner.channel_capacity == 0 {
            return Err("runner channel_capacity must be greater than 0".to_string());
        }
        let retry = &self.runner.retry;
        if retry.max_attempts == 0 {
            return Err("retry max_attempts must be at least 1".to_string());
        }
        if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) {
            return Err("retry multiplier must be a finite number >= 1".to_string());
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err("retry initial_backoff_ms must not exceed max_backoff_ms".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_curve() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            multiplier: 2.0,
            max_backoff_ms: 1_000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(500), Duration::from_millis(1_000));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn test_validation() {
        assert!(ProcessorConfig::default().validate().is_ok());

        let mut config = ProcessorConfig::default();
        config.runner.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessorConfig::default();
        config.runner.retry.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = ProcessorConfig::default();
        config.runner.workers = 0;
        assert!(config.validate().is_err());
    }
}

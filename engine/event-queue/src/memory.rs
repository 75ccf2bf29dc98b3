//! In-process queue backend

use crate::error::QueueError;
use crate::{QueueClient, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// FIFO queue living in process memory
///
/// Behaves like the Redis backend, including [`QueueError::Unavailable`] when
/// switched off with [`MemoryQueue::set_available`]. Used by tests and local
/// runs that have no broker.
pub struct MemoryQueue {
    name: String,
    items: Mutex<VecDeque<String>>,
    notify: Notify,
    available: AtomicBool,
    enqueue_calls: AtomicU64,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
            enqueue_calls: AtomicU64::new(0),
        }
    }

    /// Simulate the queue service going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        // Wake blocked consumers so they observe the change.
        self.notify.notify_waiters();
    }

    /// Items currently queued, head first
    pub fn snapshot(&self) -> Vec<String> {
        self.items.lock().iter().cloned().collect()
    }

    /// Number of enqueue attempts, successful or not
    pub fn enqueue_calls(&self) -> u64 {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable(format!("memory queue {} is offline", self.name)))
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(crate::DEFAULT_QUEUE_NAME)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn enqueue(&self, payload: &str) -> Result<()> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.items.lock().push_back(payload.to_string());
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            self.check_available()?;
            if let Some(item) = self.items.lock().pop_front() {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn depth(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.items.lock().len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    fn queue_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use event_envelope::EventEnvelope;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn envelope(user: &str) -> EventEnvelope {
        EventEnvelope::new(
            "abc",
            "pageview",
            "/home",
            user,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_then_dequeue_returns_equal_envelope() {
        let queue = MemoryQueue::default();
        let original = envelope("u1");
        assert_ok!(queue.enqueue(&original.to_wire().unwrap()).await);

        let item = queue.dequeue_blocking(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(EventEnvelope::from_wire(&item).unwrap(), original);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryQueue::default();
        for i in 0..5 {
            queue.enqueue(&format!("item-{i}")).await.unwrap();
        }
        assert_eq!(queue.depth().await.unwrap(), 5);
        for i in 0..5 {
            let item = queue.dequeue_blocking(Duration::from_millis(10)).await.unwrap();
            assert_eq!(item.as_deref(), Some(format!("item-{i}").as_str()));
        }
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue = MemoryQueue::default();
        let started = Instant::now();
        let item = queue.dequeue_blocking(Duration::from_millis(30)).await.unwrap();
        assert!(item.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_blocked_consumer_wakes_on_enqueue() {
        let queue = Arc::new(MemoryQueue::default());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue_blocking(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue("late").await.unwrap();
        let item = consumer.await.unwrap().unwrap();
        assert_eq!(item.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_each_item_goes_to_one_consumer() {
        let queue = Arc::new(MemoryQueue::default());
        for i in 0..20 {
            queue.enqueue(&i.to_string()).await.unwrap();
        }
        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(item) = queue.dequeue_blocking(Duration::from_millis(10)).await.unwrap() {
                    got.push(item);
                }
                got
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_by_key(|s| s.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn test_offline_queue_stores_nothing() {
        let queue = MemoryQueue::default();
        queue.set_available(false);
        let err = assert_err!(queue.enqueue("lost").await);
        assert!(err.is_unavailable());
        assert!(queue.dequeue_blocking(Duration::from_millis(5)).await.unwrap_err().is_unavailable());

        queue.set_available(true);
        assert!(queue.snapshot().is_empty());
        assert_eq!(queue.enqueue_calls(), 1);
    }
}

//! Dispatcher loop: blocking pop from the queue, hand-off to the task runner

use crate::config::DispatcherConfig;
use crate::runner::TaskSubmitter;
use event_queue::QueueClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters returned when a dispatcher loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherSummary {
    pub dispatched: u64,
    pub backoffs: u64,
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Dispatched,
    Idle,
    QueueFailed,
    RunnerClosed,
}

/// Single consumer of the event queue
///
/// Any number of dispatchers, in one process or many, may compete for the
/// same queue. The loop never waits for a task to finish: it pops, submits,
/// and pops again.
pub struct Dispatcher {
    config: DispatcherConfig,
    queue: Arc<dyn QueueClient>,
    submitter: TaskSubmitter,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, queue: Arc<dyn QueueClient>, submitter: TaskSubmitter) -> Self {
        Self { config, queue, submitter }
    }

    /// Run until `shutdown` is cancelled or the task runner goes away
    ///
    /// Cancellation is observed between pops and during backoff, never in the
    /// middle of a pop, so stopping the loop does not drop an item.
    pub async fn run(self, shutdown: CancellationToken) -> DispatcherSummary {
        info!(queue = %self.queue.queue_name(), "Dispatcher started");
        let mut summary = DispatcherSummary::default();

        while !shutdown.is_cancelled() {
            match self.step().await {
                Step::Dispatched => summary.dispatched += 1,
                Step::Idle => {}
                Step::QueueFailed => {
                    summary.backoffs += 1;
                    metrics::increment_counter!("dispatcher_backoffs_total");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.unavailable_backoff()) => {}
                    }
                }
                Step::RunnerClosed => break,
            }
        }

        info!(
            queue = %self.queue.queue_name(),
            dispatched = summary.dispatched,
            backoffs = summary.backoffs,
            "Dispatcher stopped"
        );
        summary
    }

    async fn step(&self) -> Step {
        let payload = match self.queue.dequeue_blocking(self.config.dequeue_timeout()).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Step::Idle,
            Err(e) => {
                warn!(
                    "Could not read from queue, retrying in {:?}: {}",
                    self.config.unavailable_backoff(),
                    e
                );
                return Step::QueueFailed;
            }
        };

        match self.submitter.submit(payload).await {
            Ok(task_id) => {
                metrics::increment_counter!("events_dispatched_total");
                debug!(task_id, "Dispatched event");
                Step::Dispatched
            }
            Err(e) => {
                // Put the item back rather than lose it; order is not preserved.
                error!("{}; returning popped item to the queue", e);
                if let Err(requeue) = self.queue.enqueue(&e.payload).await {
                    error!("Could not return item to the queue, event lost: {}", requeue);
                }
                Step::RunnerClosed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryPolicy, RunnerConfig};
    use crate::processor::EventProcessor;
    use crate::runner::TaskRunner;
    use chrono::{TimeZone, Utc};
    use event_envelope::EventEnvelope;
    use event_queue::MemoryQueue;
    use event_store::MemoryEventStore;
    use std::time::Duration;

    fn fast_dispatch() -> DispatcherConfig {
        DispatcherConfig { dequeue_timeout_ms: 10, unavailable_backoff_ms: 10 }
    }

    fn runner_config() -> RunnerConfig {
        RunnerConfig { workers: 2, channel_capacity: 16, retry: RetryPolicy::no_retry() }
    }

    fn payload(user: &str) -> String {
        EventEnvelope::new(
            "abc",
            "pageview",
            "/home",
            user,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        )
        .unwrap()
        .to_wire()
        .unwrap()
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_moves_queued_events_into_store() {
        let queue = Arc::new(MemoryQueue::default());
        let store = Arc::new(MemoryEventStore::new());
        for user in ["u1", "u2", "u3"] {
            queue.enqueue(&payload(user)).await.unwrap();
        }

        let runner = TaskRunner::start(runner_config(), Arc::new(EventProcessor::new(store.clone())));
        let dispatcher = Dispatcher::new(fast_dispatch(), queue.clone(), runner.submitter());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(shutdown.clone()));

        wait_for(|| store.rows().len() == 3).await;
        shutdown.cancel();
        let summary = handle.await.unwrap();
        let stats = runner.shutdown().await;

        assert_eq!(summary.dispatched, 3);
        assert_eq!(stats.succeeded, 3);
        assert!(queue.snapshot().is_empty());
        let users: Vec<String> = store.rows().into_iter().map(|row| row.event.user_id).collect();
        let mut sorted = users.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["u1", "u2", "u3"]);
    }

    #[tokio::test]
    async fn test_backs_off_while_queue_is_down_then_recovers() {
        let queue = Arc::new(MemoryQueue::default());
        let store = Arc::new(MemoryEventStore::new());
        queue.enqueue(&payload("u1")).await.unwrap();
        queue.set_available(false);

        let runner = TaskRunner::start(runner_config(), Arc::new(EventProcessor::new(store.clone())));
        let dispatcher = Dispatcher::new(fast_dispatch(), queue.clone(), runner.submitter());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.rows().is_empty());
        queue.set_available(true);

        wait_for(|| store.rows().len() == 1).await;
        shutdown.cancel();
        let summary = handle.await.unwrap();
        runner.shutdown().await;

        assert!(summary.backoffs >= 1);
        assert_eq!(summary.dispatched, 1);
    }

    #[tokio::test]
    async fn test_failed_processing_leaves_queue_untouched() {
        let queue = Arc::new(MemoryQueue::default());
        let store = Arc::new(MemoryEventStore::new());
        store.set_available(false);
        queue.enqueue(&payload("u1")).await.unwrap();
        queue.enqueue(&payload("u2")).await.unwrap();

        let runner = TaskRunner::start(runner_config(), Arc::new(EventProcessor::new(store.clone())));
        let mut reports = runner.subscribe();
        let dispatcher = Dispatcher::new(fast_dispatch(), queue.clone(), runner.submitter());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(shutdown.clone()));

        for _ in 0..2 {
            let report = reports.recv().await.unwrap();
            assert!(matches!(report.outcome, crate::TaskOutcome::Failed { retryable: true, .. }));
        }
        shutdown.cancel();
        handle.await.unwrap();
        let stats = runner.shutdown().await;

        assert_eq!(stats.failed, 2);
        assert!(queue.snapshot().is_empty());
        assert_eq!(queue.enqueue_calls(), 2);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_item_is_returned_when_runner_is_gone() {
        let queue = Arc::new(MemoryQueue::default());
        let store = Arc::new(MemoryEventStore::new());
        queue.enqueue(&payload("u1")).await.unwrap();

        let runner = TaskRunner::start(runner_config(), Arc::new(EventProcessor::new(store.clone())));
        let submitter = runner.submitter();
        let dispatcher = Dispatcher::new(fast_dispatch(), queue.clone(), submitter);

        let TaskRunner { workers, .. } = runner;
        for worker in workers {
            worker.abort();
            let _ = worker.await;
        }

        let summary = dispatcher.run(CancellationToken::new()).await;
        assert_eq!(summary.dispatched, 0);
        assert_eq!(queue.snapshot(), vec![payload("u1")]);
    }
}

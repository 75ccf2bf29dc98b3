//! In-process task runner
//!
//! The dispatcher pushes payloads into a bounded channel; a fixed pool of
//! workers pulls from it and runs each through a [`TaskHandler`], retrying
//! transient failures according to the [`RetryPolicy`]. Outcomes are reported
//! on a broadcast channel and in [`RunnerStats`]; they never flow back into
//! the queue.

use crate::config::{RetryPolicy, RunnerConfig};
use crate::error::{ProcessingError, SubmitError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const REPORT_CHANNEL_CAPACITY: usize = 1024;

/// Work executed by the runner for each submitted payload
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, payload: &str) -> Result<(), ProcessingError>;
}

/// Identifier assigned to a task at submission, unique per runner
pub type TaskId = u64;

#[derive(Debug)]
struct Task {
    id: TaskId,
    payload: String,
}

/// Final state of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed { error: String, retryable: bool },
}

/// Status record published once per finished task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub attempts: u32,
    pub outcome: TaskOutcome,
}

/// Point-in-time runner counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicU64,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RunnerStats {
        RunnerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable handle for submitting work to a [`TaskRunner`]
#[derive(Debug, Clone)]
pub struct TaskSubmitter {
    sender: mpsc::Sender<Task>,
    counters: Arc<Counters>,
}

impl TaskSubmitter {
    /// Queue a payload for execution without waiting for it to run
    ///
    /// Waits only while the channel is full.
    pub async fn submit(&self, payload: String) -> Result<TaskId, SubmitError> {
        let id = self.counters.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        match self.sender.send(Task { id, payload }).await {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(id)
            }
            Err(mpsc::error::SendError(task)) => Err(SubmitError { payload: task.payload }),
        }
    }
}

/// Worker pool executing submitted tasks
pub struct TaskRunner {
    submitter: TaskSubmitter,
    pub(crate) workers: Vec<JoinHandle<()>>,
    reports: broadcast::Sender<TaskReport>,
}

impl TaskRunner {
    /// Spawn the worker pool on the current tokio runtime
    pub fn start<H: TaskHandler>(config: RunnerConfig, handler: Arc<H>) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    receiver: receiver.clone(),
                    handler: handler.clone(),
                    policy: config.retry.clone(),
                    counters: counters.clone(),
                    reports: reports.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers = config.workers, capacity = config.channel_capacity, "Task runner started");
        Self { submitter: TaskSubmitter { sender, counters }, workers, reports }
    }

    /// Handle for producers such as the dispatcher
    pub fn submitter(&self) -> TaskSubmitter {
        self.submitter.clone()
    }

    /// Queue a payload for execution
    pub async fn submit(&self, payload: String) -> Result<TaskId, SubmitError> {
        self.submitter.submit(payload).await
    }

    /// Receive a [`TaskReport`] for every task finished from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TaskReport> {
        self.reports.subscribe()
    }

    /// Counters so far; tasks still in flight are counted as submitted only
    pub fn stats(&self) -> RunnerStats {
        self.submitter.counters.snapshot()
    }

    /// Stop accepting work, finish everything already submitted, and join the workers
    ///
    /// Workers exit once every [`TaskSubmitter`] clone is dropped, so stop the
    /// dispatcher first.
    pub async fn shutdown(self) -> RunnerStats {
        let TaskRunner { submitter, workers, .. } = self;
        let counters = submitter.counters.clone();
        drop(submitter);

        for handle in workers {
            if let Err(e) = handle.await {
                error!("Task worker panicked: {}", e);
            }
        }
        let stats = counters.snapshot();
        info!(?stats, "Task runner stopped");
        stats
    }
}

struct Worker<H> {
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    handler: Arc<H>,
    policy: RetryPolicy,
    counters: Arc<Counters>,
    reports: broadcast::Sender<TaskReport>,
}

impl<H: TaskHandler> Worker<H> {
    async fn run(self) {
        loop {
            let next = { self.receiver.lock().await.recv().await };
            match next {
                Some(task) => self.execute(task).await,
                None => break,
            }
        }
        debug!(worker_id = self.worker_id, "Task worker exiting");
    }

    async fn execute(&self, task: Task) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.handler.handle(&task.payload).await;
            metrics::histogram!("task_duration_seconds", started.elapsed().as_secs_f64());

            match result {
                Ok(()) => {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    metrics::increment_counter!("tasks_succeeded_total");
                    self.report(task.id, attempt, TaskOutcome::Succeeded);
                    return;
                }
                Err(e) if e.is_retryable() && self.policy.should_retry(attempt) => {
                    let delay = self.policy.backoff_for(attempt);
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    metrics::increment_counter!("tasks_retried_total");
                    warn!(
                        task_id = task.id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "Task failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    metrics::increment_counter!("tasks_failed_total");
                    error!(task_id = task.id, attempt, retryable, "Task failed permanently: {}", e);
                    self.report(task.id, attempt, TaskOutcome::Failed { error: e.to_string(), retryable });
                    return;
                }
            }
        }
    }

    fn report(&self, task_id: TaskId, attempts: u32, outcome: TaskOutcome) {
        // No subscribers is fine.
        let _ = self.reports.send(TaskReport { task_id, attempts, outcome });
    }
}

//! Service state management and component initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use analytics_gateway::{spawn_ingestion, spawn_reporting};
use event_processor::{Dispatcher, EventProcessor, TaskRunner};
use event_queue::{QueueClient, RedisQueue};
use event_store::{EventStore, PgEventStore};

/// Which parts of the pipeline this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// `POST /event` only
    Ingest,
    /// `GET /stats` only
    Report,
    /// Dispatcher loop and task runner only
    Worker,
    /// Everything in one process
    All,
}

impl Role {
    pub fn runs_ingestion(self) -> bool {
        matches!(self, Role::Ingest | Role::All)
    }

    pub fn runs_reporting(self) -> bool {
        matches!(self, Role::Report | Role::All)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, Role::Worker | Role::All)
    }

    pub fn needs_store(self) -> bool {
        self.runs_reporting() || self.runs_worker()
    }
}

/// Initialized clients for the selected role
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    role: Role,

    /// Present when the role reads or writes events
    store: Option<Arc<PgEventStore>>,
}

/// Handles of the running components
struct Running {
    ingestion: Option<JoinHandle<()>>,
    reporting: Option<JoinHandle<()>>,
    worker: Option<(JoinHandle<event_processor::DispatcherSummary>, TaskRunner)>,
}

impl ServiceState {
    /// Build clients and, if configured, bring the database schema up to date
    pub async fn new(config: ServiceConfig, role: Role) -> Result<Self> {
        info!(?role, "Initializing service components...");

        let store = if role.needs_store() {
            let store = PgEventStore::connect_lazy(&config.store)
                .context("Failed to configure the event store")?;
            if config.service.run_migrations {
                store.migrate().await.context("Failed to run database migrations")?;
            }
            Some(Arc::new(store))
        } else {
            None
        };

        Ok(Self { config, role, store })
    }

    fn store(&self) -> Result<Arc<dyn EventStore>> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => Err(anyhow::anyhow!("Event store is not configured for role {:?}", self.role)),
        }
    }

    /// Fresh queue client with its own connection
    fn queue(&self) -> Result<Arc<dyn QueueClient>> {
        let queue = RedisQueue::new(&self.config.queue).context("Failed to configure the event queue")?;
        Ok(Arc::new(queue))
    }

    /// Log whether the backing services answer; never fatal
    async fn check_dependencies(&self) {
        if self.role.runs_ingestion() || self.role.runs_worker() {
            match self.queue() {
                Ok(queue) => match queue.ping().await {
                    Ok(()) => info!(queue = %queue.queue_name(), "Event queue reachable"),
                    Err(e) => warn!("Event queue not reachable yet: {}", e),
                },
                Err(e) => warn!("{:#}", e),
            }
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.ping().await {
                warn!("Event store not reachable yet: {}", e);
            }
        }
    }

    /// Run the selected components until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.check_dependencies().await;
        let running = self.start(&shutdown)?;

        info!("Analytics service is running. Press Ctrl+C to shutdown gracefully.");
        shutdown.cancelled().await;

        info!("Shutdown signal received. Initiating graceful shutdown...");
        self.graceful_shutdown(running).await;
        Ok(())
    }

    fn start(&self, shutdown: &CancellationToken) -> Result<Running> {
        let gateway = &self.config.gateway;
        let mut running = Running { ingestion: None, reporting: None, worker: None };

        if self.role.runs_ingestion() {
            let addr = gateway.ingestion.addr().context("Invalid ingestion address")?;
            let (_, handle) =
                spawn_ingestion(addr, self.queue()?, gateway.max_body_bytes, shutdown.child_token())
                    .context("Failed to start ingestion service")?;
            running.ingestion = Some(handle);
        }

        if self.role.runs_reporting() {
            let addr = gateway.reporting.addr().context("Invalid reporting address")?;
            let (_, handle) = spawn_reporting(addr, self.store()?, shutdown.child_token())
                .context("Failed to start reporting service")?;
            running.reporting = Some(handle);
        }

        if self.role.runs_worker() {
            let processor = Arc::new(EventProcessor::new(self.store()?));
            let runner = TaskRunner::start(self.config.processor.runner.clone(), processor);
            let dispatcher =
                Dispatcher::new(self.config.processor.dispatcher.clone(), self.queue()?, runner.submitter());
            let handle = tokio::spawn(dispatcher.run(shutdown.child_token()));
            running.worker = Some((handle, runner));
        }

        Ok(running)
    }

    /// Stop HTTP servers, then the dispatcher, then drain the task runner
    async fn graceful_shutdown(&self, running: Running) {
        let limit = self.config.service.shutdown_timeout();

        if let Some(handle) = running.ingestion {
            await_stopped("Ingestion service", limit, handle).await;
        }
        if let Some(handle) = running.reporting {
            await_stopped("Reporting service", limit, handle).await;
        }

        if let Some((dispatcher, runner)) = running.worker {
            // A pop in flight finishes first; allow for its full timeout.
            let dispatcher_limit = limit + self.config.processor.dispatcher.dequeue_timeout();
            if let Some(summary) = await_stopped("Dispatcher", dispatcher_limit, dispatcher).await {
                info!(dispatched = summary.dispatched, backoffs = summary.backoffs, "Dispatcher summary");
            }

            let pending = runner.stats();
            info!(
                in_flight = pending.submitted.saturating_sub(pending.succeeded + pending.failed),
                "Draining task runner"
            );
            match timeout(limit, runner.shutdown()).await {
                Ok(stats) => info!(
                    submitted = stats.submitted,
                    succeeded = stats.succeeded,
                    failed = stats.failed,
                    retried = stats.retried,
                    "Task runner drained"
                ),
                Err(_) => warn!("Task runner did not drain within timeout, abandoning pending tasks"),
            }
        }

        if let Some(store) = &self.store {
            store.close().await;
        }
        info!("Graceful shutdown complete");
    }
}

async fn await_stopped<T>(name: &str, limit: Duration, handle: JoinHandle<T>) -> Option<T> {
    match timeout(limit, handle).await {
        Ok(Ok(value)) => {
            info!("{} stopped gracefully", name);
            Some(value)
        }
        Ok(Err(e)) => {
            error!("{} task failed: {}", name, e);
            None
        }
        Err(_) => {
            warn!("{} did not stop within timeout, forcing shutdown", name);
            None
        }
    }
}

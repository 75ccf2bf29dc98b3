//! Prometheus metrics export

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its scrape listener
///
/// Must run inside the tokio runtime, at most once per process.
pub fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    let addr = config.addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    register_metrics();
    info!("Metrics exporter listening on http://{}/metrics", addr);
    Ok(())
}

fn register_metrics() {
    describe_counter!("events_accepted_total", "Events validated and enqueued by the ingestion service");
    describe_counter!("events_rejected_total", "Request bodies rejected as invalid events");
    describe_counter!("events_enqueue_failed_total", "Valid events that could not be enqueued");
    describe_counter!("events_dispatched_total", "Queue items handed to the task runner");
    describe_counter!("dispatcher_backoffs_total", "Dispatcher pauses after a queue error");
    describe_counter!("tasks_succeeded_total", "Processing tasks that stored their event");
    describe_counter!("tasks_failed_total", "Processing tasks abandoned after their last attempt");
    describe_counter!("tasks_retried_total", "Processing task retries");
    describe_counter!("stats_requests_total", "Requests to the stats endpoint");
    describe_histogram!("task_duration_seconds", "Duration of one processing attempt");
}

//! Binding the HTTP services

use crate::ingestion::ingestion_routes;
use crate::reporting::reporting_routes;
use crate::Result;
use event_queue::QueueClient;
use event_store::EventStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warp::Filter;

/// Liveness endpoint shared by both services
pub fn health_route(
    service: &'static str,
) -> impl Filter<Extract = (warp::reply::Json,), Error = warp::Rejection> + Clone {
    warp::path("health").and(warp::path::end()).and(warp::get()).map(move || {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "service": service,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    })
}

/// Bind the ingestion service and serve it until `shutdown` is cancelled
///
/// Returns the bound address, which differs from `addr` when port 0 was requested.
pub fn spawn_ingestion(
    addr: SocketAddr,
    queue: Arc<dyn QueueClient>,
    max_body_bytes: u64,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let routes = ingestion_routes(queue, max_body_bytes);
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })?;

    info!("Ingestion service listening on http://{}", bound);
    let handle = tokio::spawn(async move {
        server.await;
        info!("Ingestion service stopped");
    });
    Ok((bound, handle))
}

/// Bind the reporting service and serve it until `shutdown` is cancelled
pub fn spawn_reporting(
    addr: SocketAddr,
    store: Arc<dyn EventStore>,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let routes = reporting_routes(store);
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })?;

    info!("Reporting service listening on http://{}", bound);
    let handle = tokio::spawn(async move {
        server.await;
        info!("Reporting service stopped");
    });
    Ok((bound, handle))
}

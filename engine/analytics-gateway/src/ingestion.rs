//! `POST /event` - validate an incoming event and put it on the queue

use crate::error::{handle_rejection, GatewayError};
use crate::server::health_route;
use event_envelope::EventEnvelope;
use event_queue::QueueClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

/// Body of a `202 Accepted` reply
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub message: String,
}

/// Validate and enqueue one event
///
/// A failed enqueue is reported to the caller as is; the caller may retry.
pub async fn ingest_event(
    body: Bytes,
    queue: Arc<dyn QueueClient>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let event = match EventEnvelope::from_request_body(&body) {
        Ok(event) => event,
        Err(e) => {
            metrics::increment_counter!("events_rejected_total");
            tracing::debug!("Rejected event: {}", e);
            return Err(warp::reject::custom(GatewayError::from(e)));
        }
    };

    let payload = event.to_wire().map_err(|e| warp::reject::custom(GatewayError::from(e)))?;

    if let Err(e) = queue.enqueue(&payload).await {
        metrics::increment_counter!("events_enqueue_failed_total");
        tracing::warn!(site_id = %event.site_id, "Failed to enqueue event: {}", e);
        return Err(warp::reject::custom(GatewayError::from(e)));
    }

    metrics::increment_counter!("events_accepted_total");
    tracing::debug!(site_id = %event.site_id, event_type = %event.event_type, "Event accepted");

    Ok(warp::reply::with_status(
        warp::reply::json(&AcceptedResponse { message: "Event accepted".to_string() }),
        StatusCode::ACCEPTED,
    ))
}

/// Routes of the ingestion service
pub fn ingestion_routes(
    queue: Arc<dyn QueueClient>,
    max_body_bytes: u64,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
    let queue_filter = warp::any().map(move || queue.clone());

    let event = warp::path("event")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::bytes())
        .and(queue_filter)
        .and_then(ingest_event);

    event.or(health_route("ingestion")).recover(handle_rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_queue::MemoryQueue;
    use serde_json::{json, Value};

    fn event_body() -> Value {
        json!({
            "site_id": "abc",
            "event_type": "pageview",
            "path": "/home",
            "user_id": "u1",
            "timestamp": "2024-01-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_accepts_valid_event() {
        let queue = Arc::new(MemoryQueue::default());
        let routes = ingestion_routes(queue.clone(), 16 * 1024);

        let resp = warp::test::request()
            .method("POST")
            .path("/event")
            .json(&event_body())
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body, json!({"message": "Event accepted"}));

        let queued = queue.snapshot();
        assert_eq!(queued.len(), 1);
        let decoded = EventEnvelope::from_wire(&queued[0]).unwrap();
        assert_eq!(decoded.user_id, "u1");
        assert_eq!(decoded.timestamp.to_rfc3339(), "2024-01-01T10:00:00+00:00");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let queue = Arc::new(MemoryQueue::default());
        let routes = ingestion_routes(queue.clone(), 16 * 1024);

        let resp = warp::test::request()
            .method("POST")
            .path("/event")
            .body("{\"site_id\": ")
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"]["code"], "INVALID_JSON");
        assert_eq!(queue.enqueue_calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let queue = Arc::new(MemoryQueue::default());
        let routes = ingestion_routes(queue.clone(), 64);

        let mut body = event_body();
        body["path"] = Value::String("/".repeat(128));
        let resp = warp::test::request()
            .method("POST")
            .path("/event")
            .json(&body)
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(queue.enqueue_calls(), 0);
    }

    #[tokio::test]
    async fn test_body_without_content_length_is_411() {
        let queue = Arc::new(MemoryQueue::default());
        let routes = ingestion_routes(queue.clone(), 16 * 1024);

        let resp = warp::test::request().method("POST").path("/event").reply(&routes).await;

        assert_eq!(resp.status(), StatusCode::LENGTH_REQUIRED);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["error"]["code"], "LENGTH_REQUIRED");
        assert_eq!(queue.enqueue_calls(), 0);
    }

    #[tokio::test]
    async fn test_wrong_method_and_unknown_path() {
        let routes = ingestion_routes(Arc::new(MemoryQueue::default()), 16 * 1024);

        let resp = warp::test::request().method("GET").path("/event").reply(&routes).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let resp = warp::test::request().method("GET").path("/nope").reply(&routes).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let routes = ingestion_routes(Arc::new(MemoryQueue::default()), 16 * 1024);
        let resp = warp::test::request().method("GET").path("/health").reply(&routes).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "ingestion");
    }
}

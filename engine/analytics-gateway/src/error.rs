//! Error types and HTTP error bodies for the gateway

use event_envelope::ValidationError;
use event_queue::QueueError;
use event_store::StoreError;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use warp::http::StatusCode;

/// Errors that can occur while serving a request
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid event: {0}")]
    Validation(ValidationError),

    #[error("Invalid query parameter `{field}`: {message}")]
    InvalidQuery { field: &'static str, message: String },

    #[error("Event queue unavailable: {0}")]
    QueueUnavailable(QueueError),

    #[error("Event queue error: {0}")]
    Queue(QueueError),

    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    Server(#[from] warp::Error),
}

impl warp::reject::Reject for GatewayError {}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MalformedJson(msg) => GatewayError::InvalidJson(msg),
            other => GatewayError::Validation(other),
        }
    }
}

impl From<QueueError> for GatewayError {
    fn from(err: QueueError) -> Self {
        if err.is_unavailable() {
            GatewayError::QueueUnavailable(err)
        } else {
            GatewayError::Queue(err)
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            GatewayError::Validation(_) | GatewayError::InvalidQuery { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            GatewayError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Queue(_)
            | GatewayError::Database(_)
            | GatewayError::Serialization(_)
            | GatewayError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidJson(_) => "INVALID_JSON",
            GatewayError::Validation(_) | GatewayError::InvalidQuery { .. } => "VALIDATION_ERROR",
            GatewayError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            GatewayError::Queue(_) => "QUEUE_ERROR",
            GatewayError::Database(_) => "DATABASE_ERROR",
            GatewayError::Serialization(_) | GatewayError::Server(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        let field = match self {
            GatewayError::Validation(err) => err.field(),
            GatewayError::InvalidQuery { field, .. } => Some(*field),
            _ => None,
        };
        field.map(|field| serde_json::json!({ "field": field }))
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.code(), self.to_string(), self.details())
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    pub timestamp: String,
}

/// Error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            error: ErrorDetail { code: code.to_string(), message: message.into(), details },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Turn any rejection into a JSON error body
pub async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let (status, body) = if let Some(e) = err.find::<GatewayError>() {
        (e.status(), e.to_response())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, ErrorResponse::new("NOT_FOUND", "Not found", None))
    } else if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, ErrorResponse::new("PAYLOAD_TOO_LARGE", e.to_string(), None))
    } else if let Some(e) = err.find::<warp::reject::LengthRequired>() {
        (StatusCode::LENGTH_REQUIRED, ErrorResponse::new("LENGTH_REQUIRED", e.to_string(), None))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse::new("VALIDATION_ERROR", e.to_string(), None),
        )
    } else if let Some(e) = err.find::<warp::reject::MethodNotAllowed>() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorResponse::new("METHOD_NOT_ALLOWED", e.to_string(), None),
        )
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("INTERNAL_ERROR", "Internal server error", None),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

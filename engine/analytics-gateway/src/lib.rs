//! AnalyticsGateway - HTTP front door of the analytics pipeline
//!
//! Two independent services share this crate:
//! - ingestion: `POST /event` validates an event and enqueues it; it never
//!   touches the database.
//! - reporting: `GET /stats` aggregates stored events for one site and day.
//!
//! Both also answer `GET /health`. Errors use the JSON body described by
//! [`ErrorResponse`].

pub mod config;
pub mod error;
pub mod ingestion;
pub mod reporting;
pub mod server;

pub use config::{GatewayConfig, ServerConfig};
pub use error::{handle_rejection, ErrorDetail, ErrorResponse, GatewayError};
pub use ingestion::ingestion_routes;
pub use reporting::reporting_routes;
pub use server::{health_route, spawn_ingestion, spawn_reporting};

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

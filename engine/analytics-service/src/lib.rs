//! Site Analytics Production Service Library
//!
//! Configuration loading, logging, metrics export, component wiring and
//! graceful shutdown for the `analytics-service` binary.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod service;
pub mod signals;
pub mod telemetry;

pub use config::ServiceConfig;
pub use logging::initialize_logging_with_config;
pub use service::{Role, ServiceState};
pub use signals::setup_signal_handlers;
pub use telemetry::install_metrics_exporter;

/// Load configuration from defaults, an optional TOML file and the environment
pub fn load_configuration(file: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(file).context("Failed to load service configuration")
}

//! Service configuration management
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. a TOML file (`--config`, or the path in `ANALYTICS_CONFIG`)
//! 3. `ANALYTICS__<SECTION>__<KEY>` environment variables
//! 4. `DATABASE_URL` and `REDIS_URL`

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use analytics_gateway::GatewayConfig;
use event_processor::ProcessorConfig;
use event_queue::QueueConfig;
use event_store::StoreConfig;

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "ANALYTICS_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Event queue (Redis) configuration
    pub queue: QueueConfig,

    /// Analytics store (PostgreSQL) configuration
    pub store: StoreConfig,

    /// Dispatcher and task runner configuration
    pub processor: ProcessorConfig,

    /// HTTP ingestion and reporting configuration
    pub gateway: GatewayConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Run schema bootstrap and migrations before serving
    pub run_migrations: bool,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose a Prometheus scrape endpoint
    pub enabled: bool,

    /// Host to bind the exporter to
    pub host: String,

    /// Metrics export port
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { run_migrations: true, shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, host: "0.0.0.0".to_string(), port: 9090 }
    }
}

impl ServiceSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl MetricsConfig {
    pub fn addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid metrics address {}:{}", self.host, self.port))
    }
}

impl ServiceConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.queue.validate().map_err(|e| anyhow!("queue: {e}"))?;
        self.store.validate().map_err(|e| anyhow!("store: {e}"))?;
        self.processor.validate().map_err(|e| anyhow!("processor: {e}"))?;
        self.gateway.validate().map_err(|e| anyhow!("gateway: {e}"))?;

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow!("Invalid log level: {}", self.logging.level)),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            _ => return Err(anyhow!("Invalid log format: {}", self.logging.format)),
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("Invalid metrics port: {}", self.metrics.port));
            }
            self.metrics.addr()?;
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// The configuration file in effect: the given path, else `$ANALYTICS_CONFIG`
pub fn config_file(file: Option<&Path>) -> Option<PathBuf> {
    file.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from))
}

/// Load configuration from the process environment
pub fn load_config(file: Option<&Path>) -> Result<ServiceConfig> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    load_from(config_file(file).as_deref(), vars)
}

/// Load configuration from an optional file and an explicit set of variables
pub fn load_from(file: Option<&Path>, vars: HashMap<String, String>) -> Result<ServiceConfig> {
    let database_url = vars.get("DATABASE_URL").cloned();
    let redis_url = vars.get("REDIS_URL").cloned();

    let mut builder = Config::builder()
        .add_source(Config::try_from(&ServiceConfig::default()).context("Invalid default configuration")?);

    if let Some(path) = file {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    let config: ServiceConfig = builder
        .add_source(
            Environment::with_prefix("ANALYTICS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars.into_iter().collect())),
        )
        .set_override_option("store.url", database_url)?
        .set_override_option("queue.url", redis_url)?
        .build()
        .context("Failed to build configuration")?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    config.validate()?;
    Ok(config)
}

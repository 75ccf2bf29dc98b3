//! Configuration for the HTTP services

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Listener settings for one HTTP service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

impl ServerConfig {
    fn with_port(port: u16) -> Self {
        Self { host: "0.0.0.0".to_string(), port }
    }

    /// Socket address to bind
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Configuration for the ingestion and reporting services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub ingestion: ServerConfig,
    pub reporting: ServerConfig,

    /// Largest accepted `POST /event` body, in bytes
    pub max_body_bytes: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ingestion: ServerConfig::with_port(8000),
            reporting: ServerConfig::with_port(8001),
            max_body_bytes: 16 * 1024,
        }
    }
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.ingestion.addr().map_err(|e| format!("invalid ingestion address: {e}"))?;
        self.reporting.addr().map_err(|e| format!("invalid reporting address: {e}"))?;

        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        let config = GatewayConfig::default();
        assert_eq!(config.ingestion.addr().unwrap().port(), 8000);
        assert_eq!(config.reporting.addr().unwrap().port(), 8001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_host() {
        let mut config = GatewayConfig::default();
        config.reporting.host = "not a host".to_string();
        assert!(config.validate().unwrap_err().contains("reporting"));
    }
}

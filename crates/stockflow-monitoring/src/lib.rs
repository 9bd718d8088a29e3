//! Monitoring module for Stockflow.
//!
//! Holds the logging configuration shared by every Stockflow binary and the
//! subscriber setup in [`logging`].

use serde::{Deserialize, Serialize};

pub mod logging;

pub use logging::{init_logging, LoggingGuard};

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,stockflow_core=debug")
    pub log_filter: String,
    /// Emit JSON instead of human-readable logs on stdout
    pub enable_json_logging: bool,
    /// Optional log file, rotated daily
    pub log_file: Option<String>,
    /// Environment (dev, staging, prod)
    pub environment: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "stockflow".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
            log_file: None,
            environment: "dev".to_string(),
        }
    }
}

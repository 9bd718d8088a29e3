//! Configuration for the Stockflow service
//!
//! Defaults, then an optional YAML file named by `STOCKFLOW_CONFIG`, then
//! environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use stockflow_monitoring::MonitoringConfig;
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};

/// Service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging setup
    #[serde(default)]
    pub logging: MonitoringConfig,

    /// YAML catalog of workflow definitions to register at startup
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn load() -> ConfigResult<Self> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Load configuration, reading variables through `var`
    pub fn load_with<F>(var: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match var("STOCKFLOW_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(level) = var("STOCKFLOW_LOG_LEVEL") {
            config.logging.log_filter = level;
        }

        if let Some(json) = var("STOCKFLOW_JSON_LOGS") {
            match json.to_lowercase().as_str() {
                "true" | "1" | "yes" => config.logging.enable_json_logging = true,
                "false" | "0" | "no" => config.logging.enable_json_logging = false,
                _ => warn!("Invalid STOCKFLOW_JSON_LOGS value: {}", json),
            }
        }

        if let Some(file) = var("STOCKFLOW_LOG_FILE") {
            config.logging.log_file = Some(file).filter(|f| !f.trim().is_empty());
        }

        if let Some(path) = var("STOCKFLOW_DEFINITIONS") {
            config.definitions_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.logging.service_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.service_name must not be empty".to_string(),
            ));
        }
        if self.logging.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.log_filter must not be empty".to_string(),
            ));
        }
        if let Some(path) = &self.definitions_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "definitions_path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

//! Errors raised while starting the service

use std::path::PathBuf;
use thiserror::Error;

/// Startup error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid YAML for the expected shape
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },

    /// Values are well-formed but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for startup
pub type ConfigResult<T> = Result<T, ConfigError>;

//! Error types for the patcher façade

use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has the wrong shape
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Patcher errors
#[derive(Debug, Error)]
pub enum PatcherError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Device or patch model failure
    #[error("Device error: {0}")]
    Device(#[from] tbpatch_core::Error),

    /// The batch stopped on a transport failure
    #[error("Batch aborted: {0}")]
    Aborted(#[source] tbpatch_core::Error),

    /// Some regions were not brought to the target content
    #[error("{unfinished} of {total} region(s) not patched")]
    Incomplete { unfinished: usize, total: usize },
}

/// Result type for patcher operations
pub type Result<T> = std::result::Result<T, PatcherError>;

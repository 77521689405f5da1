//! Common error types for VQP

use thiserror::Error;

/// Common result type for VQP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the VQP crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cue point position string failed to parse
    #[error("Invalid cue point: {0}")]
    InvalidCuePoint(String),

    /// JSON (de)serialization error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

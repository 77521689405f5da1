//! Error types for vqp-player

use thiserror::Error;

/// Result type for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the player crate
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the shared common crate
    #[error(transparent)]
    Common(#[from] vqp_common::Error),

    /// Queue management errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Catalog lookup errors (delivered as values, never thrown across
    /// the coordinator boundary)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Operation attempted in an invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

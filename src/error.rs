//! Error types for nova-ingest

use thiserror::Error;

/// Main error type for ingestion operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Invalid manifest format: {reason}")]
    InvalidManifest { reason: String },

    #[error("Invalid volume serial: {input}")]
    InvalidSerial { input: String },
}

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

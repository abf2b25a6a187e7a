//! Common error types for composer

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for composer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the composer crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input data (bad organization key, unparsable timestamp, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Markup document could not be converted to a canonical record
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// Remote object could not be retrieved
    #[error("Remote storage error: {0}")]
    Storage(String),

    /// A pipeline stage expected a file written by an earlier stage
    #[error("Missing intermediate file: {}", .0.display())]
    MissingIntermediateFile(PathBuf),

    /// A worker pool finished with at least one failed task; carries the first failure
    #[error("Batch failure in {stage}: {source}")]
    BatchFailure {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an error as the first failure of a pool stage
    pub fn batch_failure(stage: impl Into<String>, source: Error) -> Self {
        Error::BatchFailure {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// True for the per-item failures that pipelines log and skip
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Conversion(_) | Error::Storage(_) | Error::MissingIntermediateFile(_)
        )
    }
}

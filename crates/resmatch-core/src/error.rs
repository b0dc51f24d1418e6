//! Error types for resmatch.

use thiserror::Error;
use uuid::Uuid;

use crate::models::JobStatus;

/// Result type alias using resmatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for resmatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Job id is unknown (never existed, already swept, or consumed)
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Invalid input; the job is never created
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Job already reached completed, error, or cancelled
    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },

    /// Job is still queued or processing
    #[error("Job {0} is still processing")]
    StillProcessing(Uuid),

    /// Job finished without producing a result (error or cancelled)
    #[error("Job {id} has no result (status: {status})")]
    NoResult { id: Uuid, status: JobStatus },

    /// Artifact could not be stored, read, or decoded
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Matching engine failed
    #[error("Matching error: {0}")]
    Matching(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

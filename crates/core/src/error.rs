// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Queue error: {0}")]
    Domain(#[from] crate::domain::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True if this error is a rejection by a closed queue
    pub fn is_closed(&self) -> bool {
        matches!(self, AppError::Domain(crate::domain::QueueError::Closed(_)))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

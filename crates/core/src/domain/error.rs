// Domain Error Types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue closed: {0}")]
    Closed(String),

    #[error("Queue name already registered: {0}")]
    DuplicateName(String),

    #[error("Invalid queue name: {0:?}")]
    InvalidName(String),

    #[error("Delay out of range: {0:?}")]
    DelayOutOfRange(Duration),
}

pub type Result<T> = std::result::Result<T, QueueError>;

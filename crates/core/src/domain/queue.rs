// Queue Domain Model

use serde::Serialize;

/// Queue identifier (registry key)
pub type QueueId = String;

/// Queue configuration
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Explicit name; `None` asks the registry to generate one
    pub name: Option<QueueId>,
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Point-in-time snapshot of a queue's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: QueueId,
    /// Items currently waiting
    pub pending: usize,
    pub closed: bool,
    /// Items accepted by post since creation
    pub posted: u64,
    /// Items taken off the queue and started
    pub executed: u64,
    /// Items refused because the queue was closed
    pub rejected: u64,
}

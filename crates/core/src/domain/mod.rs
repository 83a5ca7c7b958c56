// Domain Layer - Queue model, work items, dispatch outcomes

pub mod dispatch;
pub mod error;
pub mod queue;
pub mod work;

// Re-exports
pub use dispatch::DispatchResult;
pub use error::{QueueError, Result};
pub use queue::{QueueConfig, QueueId, QueueStats};
pub use work::Work;

// Workqueue Core - Domain, Ports & Application
// NO subscriber installation, NO global configuration

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{
    DispatchHandle, FailurePolicy, WeakWorkQueue, WorkQueue, WorkerThread,
};
pub use domain::{DispatchResult, QueueConfig, QueueError, QueueStats, Work};
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

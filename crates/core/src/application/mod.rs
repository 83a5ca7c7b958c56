// Application Layer - Queue core and the capabilities built on it

pub mod constants;
pub mod dispatch;
pub mod periodic;
pub mod registry;
pub mod timer;
pub mod work_queue;
pub mod worker;

// Re-exports
pub use dispatch::DispatchHandle;
pub use registry::Registry;
pub use timer::Timer;
pub use work_queue::{WeakWorkQueue, WorkQueue};
pub use worker::{execute_guarded, CaughtPanic, FailurePolicy, PanicGuardResult, WorkerThread};

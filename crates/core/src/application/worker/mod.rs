// Worker - dedicated consumer thread for one queue

mod panic_guard;

pub use panic_guard::{execute_guarded, CaughtPanic, PanicGuardResult};
pub(crate) use panic_guard::panic_message;

use crate::application::work_queue::WorkQueue;
use crate::error::{AppError, Result};
use std::panic::AssertUnwindSafe;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{error, info, warn};

/// What the worker thread does when a work item panics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the panic end the thread; `close_and_join` reports it
    #[default]
    Propagate,
    /// Log the panic and keep draining the queue
    CatchAndContinue,
}

/// Owns an OS thread that is the single consumer of a queue
///
/// The thread is named after the queue and runs until the queue is closed
/// and drained. If the thread ends early (a panic under `Propagate`), the
/// queue is closed so later posts are rejected instead of stranded.
/// Dropping the worker closes the queue and joins the thread.
pub struct WorkerThread {
    queue: WorkQueue,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Start consuming `queue` on a new thread
    ///
    /// # Errors
    /// - `AppError::Io` if the OS refuses to spawn the thread
    pub fn spawn(queue: WorkQueue, policy: FailurePolicy) -> Result<Self> {
        let consumer = queue.clone();
        let handle = thread::Builder::new()
            .name(queue.key().to_string())
            .spawn(move || run(consumer, policy))?;

        Ok(Self {
            queue,
            handle: Some(handle),
        })
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Id of the consumer thread (until joined)
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|handle| handle.thread().id())
    }

    /// Close the queue, let the thread drain it, and wait for it to exit
    ///
    /// # Errors
    /// - `AppError::WorkerPanicked` if an item panicked under `FailurePolicy::Propagate`
    /// - `AppError::Internal` if called from the worker thread itself
    pub fn close_and_join(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.queue.close();
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if handle.thread().id() == thread::current().id() {
            return Err(AppError::Internal(format!(
                "worker {} cannot join itself",
                self.queue.key()
            )));
        }
        handle
            .join()
            .map_err(|payload| AppError::WorkerPanicked(panic_message(payload.as_ref())))
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(queue = %self.queue.key(), error = %e, "Worker ended abnormally");
        }
    }
}

/// Closes the queue when the consumer loop exits, including by unwinding,
/// so posts to a queue nobody drains any more are rejected
struct CloseOnExit<'a>(&'a WorkQueue);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(
                queue = %self.0.key(),
                pending = self.0.len(),
                "Worker unwinding, closing queue"
            );
        }
        self.0.close();
    }
}

fn run(queue: WorkQueue, policy: FailurePolicy) {
    let _close = CloseOnExit(&queue);
    info!(queue = %queue.key(), policy = ?policy, "Worker started");
    match policy {
        FailurePolicy::Propagate => queue.run_until_close(),
        FailurePolicy::CatchAndContinue => loop {
            match execute_guarded(AssertUnwindSafe(|| queue.run_one())) {
                PanicGuardResult::Success(true) => {}
                PanicGuardResult::Success(false) => break,
                PanicGuardResult::Panicked(panic) => {
                    error!(
                        queue = %queue.key(),
                        panic_msg = %panic.message(),
                        "Work item panicked, continuing"
                    );
                }
            }
        },
    }
    info!(queue = %queue.key(), "Worker stopped");
}

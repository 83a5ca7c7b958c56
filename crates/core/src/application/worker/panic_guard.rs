// Panic isolation for work items
use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, UnwindSafe};

/// A panic caught by `execute_guarded`, kept so it can be reported or re-raised
pub struct CaughtPanic {
    message: String,
    payload: Box<dyn Any + Send + 'static>,
}

impl CaughtPanic {
    /// Human-readable panic message ("Unknown panic" for non-string payloads)
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Re-raise the original panic on the current thread
    pub fn resume(self) -> ! {
        resume_unwind(self.payload)
    }
}

impl std::fmt::Debug for CaughtPanic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaughtPanic")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed successfully
    Success(T),
    /// Execution panicked
    Panicked(CaughtPanic),
}

/// Execute a closure with panic isolation
///
/// If the closure panics, the panic is caught and returned as
/// `PanicGuardResult::Panicked`; nothing is logged here, the caller decides.
///
/// # Example
/// ```text
/// let result = execute_guarded(|| {
///     // This panic will be caught
///     panic!("test panic");
/// });
///
/// match result {
///     PanicGuardResult::Panicked(panic) => {
///         println!("Caught panic: {}", panic.message());
///     }
///     _ => {}
/// }
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(payload) => PanicGuardResult::Panicked(CaughtPanic {
            message: panic_message(payload.as_ref()),
            payload,
        }),
    }
}

/// Extract the message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

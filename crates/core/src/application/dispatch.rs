//! Cross-queue dispatch
//!
//! `post_to` runs a computation on another queue's consumer and delivers the
//! result back to this queue's consumer as a callback. The target's wrapper
//! holds only a weak reference to the origin, so two queues posting to each
//! other never keep each other alive; if either end disappears mid-flight
//! the remaining step is skipped.
//!
//! `post_for_result` is the joining variant: it returns a `DispatchHandle`
//! to wait on (or `.await`) instead of taking a callback.

use crate::application::work_queue::WorkQueue;
use crate::application::worker::{execute_guarded, PanicGuardResult};
use crate::domain::{DispatchResult, Result};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

impl WorkQueue {
    /// Run `work` on `target`'s consumer, then `callback(value)` on this queue's consumer
    ///
    /// Returns as soon as the work is queued on `target`. If `work` panics,
    /// the panic is re-raised on this queue's consumer in place of the
    /// callback.
    ///
    /// # Errors
    /// - `QueueError::Closed` if `target` is already closed; nothing runs
    pub fn post_to<T, W, C>(&self, target: &WorkQueue, work: W, callback: C) -> Result<()>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let origin = self.downgrade();
        target.post(move || {
            let outcome = execute_guarded(AssertUnwindSafe(work));

            let Some(origin) = origin.upgrade() else {
                match outcome {
                    PanicGuardResult::Success(_) => {
                        debug!("Dispatch abandoned: origin queue gone")
                    }
                    PanicGuardResult::Panicked(panic) => error!(
                        panic_msg = %panic.message(),
                        "Dispatched work panicked and origin queue is gone"
                    ),
                }
                return;
            };

            let delivered = match outcome {
                PanicGuardResult::Success(value) => origin.post_if_open(move || callback(value)),
                PanicGuardResult::Panicked(panic) => origin.post_if_open(move || panic.resume()),
            };
            if !delivered {
                debug!(queue = %origin.key(), "Dispatch abandoned: origin queue closed");
            }
        })
    }

    /// Run `work` on this queue's consumer and return a handle to its outcome
    ///
    /// A panic in `work` is caught and reported as `DispatchResult::Failed`.
    /// Closing the queue afterwards does not cancel `work`: accepted items
    /// still run. The handle resolves to `DispatchResult::NoResult` only if
    /// the queue is dropped with `work` still pending.
    ///
    /// # Errors
    /// - `QueueError::Closed` if this queue is already closed
    pub fn post_for_result<T, W>(&self, work: W) -> Result<DispatchHandle<T>>
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            let result = match execute_guarded(AssertUnwindSafe(work)) {
                PanicGuardResult::Success(value) => DispatchResult::Completed(value),
                PanicGuardResult::Panicked(panic) => {
                    warn!(panic_msg = %panic.message(), "Work posted for result panicked");
                    DispatchResult::Failed(panic.message().to_string())
                }
            };
            // Receiver may have been dropped; nobody wants the result then
            let _ = tx.send(result);
        })?;
        Ok(DispatchHandle { rx })
    }
}

/// Single-use handle to the outcome of `post_for_result`
///
/// Implements `Future`, so async callers can `.await` it.
#[must_use = "the outcome is lost if the handle is dropped"]
pub struct DispatchHandle<T> {
    rx: oneshot::Receiver<DispatchResult<T>>,
}

impl<T> DispatchHandle<T> {
    /// Block the calling thread until the outcome is known
    ///
    /// Do not call from inside an async runtime (`.await` the handle
    /// instead), and not from the consumer of the queue the work was posted
    /// to: that consumer would wait on itself.
    pub fn wait(self) -> DispatchResult<T> {
        self.rx.blocking_recv().unwrap_or(DispatchResult::NoResult)
    }

    /// Non-blocking check: `None` while the work is still pending
    ///
    /// Once an outcome has been returned, later calls report `NoResult`.
    pub fn try_result(&mut self) -> Option<DispatchResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(DispatchResult::NoResult),
        }
    }
}

impl<T> Future for DispatchHandle<T> {
    type Output = DispatchResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(DispatchResult::NoResult))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::{FailurePolicy, WorkerThread};
    use crate::domain::QueueError;
    use std::panic::catch_unwind;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;

    #[test]
    fn test_post_to_int_and_string() {
        let queue = WorkQueue::with_name("dispatch-unit-target").unwrap();
        let main = WorkQueue::with_name("dispatch-unit-main").unwrap();
        let qptr = WorkQueue::get_instance("dispatch-unit-target").unwrap();

        let result = Arc::new(AtomicI32::new(0));
        let sink = result.clone();
        main.post_to(&qptr, || 17, move |i| sink.store(i, Ordering::SeqCst))
            .unwrap();
        // this should post the callback to main
        assert!(qptr.run_one());
        assert_eq!(result.load(Ordering::SeqCst), 0, "callback ran on target");
        // this should run the callback
        assert!(main.run_one());
        assert_eq!(result.load(Ordering::SeqCst), 17);

        let alpha = Arc::new(Mutex::new(String::new()));
        let sink = alpha.clone();
        main.post_to(
            &qptr,
            || "abc".to_string(),
            move |s: String| *sink.lock().unwrap() = s,
        )
        .unwrap();
        qptr.run_pending();
        main.run_pending();
        assert_eq!(*alpha.lock().unwrap(), "abc");
        drop(queue);
    }

    #[test]
    fn test_callback_runs_on_origin_thread() {
        let worker = WorkerThread::spawn(WorkQueue::new(), FailurePolicy::Propagate).unwrap();
        let main = WorkQueue::new();
        let (tx, rx) = mpsc::channel();
        let work_tx = tx.clone();
        main.post_to(
            worker.queue(),
            move || {
                work_tx.send(("work", thread::current().id())).unwrap();
                5
            },
            move |_| tx.send(("callback", thread::current().id())).unwrap(),
        )
        .unwrap();

        let (label, work_thread) = rx.recv().unwrap();
        assert_eq!(label, "work");
        assert_eq!(Some(work_thread), worker.thread_id());

        assert!(main.run_one());
        let (label, callback_thread) = rx.recv().unwrap();
        assert_eq!(label, "callback");
        assert_eq!(callback_thread, thread::current().id());
        worker.close_and_join().unwrap();
    }

    #[test]
    fn test_closed_target_rejects() {
        let target = WorkQueue::new();
        let main = WorkQueue::new();
        target.close();
        let err = main.post_to(&target, || 1, |_| {}).unwrap_err();
        assert_eq!(err, QueueError::Closed(target.key().to_string()));
    }

    #[test]
    fn test_origin_closed_skips_callback() {
        let target = WorkQueue::new();
        let main = WorkQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        main.post_to(&target, || 1, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        main.close();
        assert!(target.run_one());
        main.run_until_close();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_origin_dropped_skips_callback() {
        let target = WorkQueue::new();
        let main = WorkQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        main.post_to(&target, || 1, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        drop(main);
        assert!(target.run_one());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_target_dropped_before_work_runs() {
        let target = WorkQueue::new();
        let main = WorkQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let work_ran = ran.clone();
        let callback_ran = ran.clone();
        main.post_to(
            &target,
            move || {
                work_ran.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                callback_ran.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        drop(target);
        assert_eq!(main.run_pending(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_work_panic_resurfaces_on_origin() {
        let target = WorkQueue::new();
        let main = WorkQueue::new();
        main.post_to(&target, || -> i32 { panic!("remote failure") }, |_| {})
            .unwrap();
        assert!(target.run_one(), "target consumer must not see the panic");

        let payload = catch_unwind(AssertUnwindSafe(|| main.run_one())).unwrap_err();
        assert_eq!(
            crate::application::worker::panic_message(payload.as_ref()),
            "remote failure"
        );
    }

    #[test]
    fn test_post_for_result_outcomes() {
        let queue = WorkQueue::new();
        let handle = queue.post_for_result(|| 17).unwrap();
        let failing = queue.post_for_result(|| -> i32 { panic!("bad script") }).unwrap();
        let never = queue.post_for_result(|| 3).unwrap();

        queue.run_one();
        queue.run_one();
        drop(queue);

        assert_eq!(handle.wait().into_parts(), (1, Some(17), None));
        let (count, value, diagnostic) = failing.wait().into_parts();
        assert!(count < 0);
        assert_eq!(value, None);
        assert_eq!(diagnostic.as_deref(), Some("bad script"));
        assert_eq!(never.wait(), DispatchResult::NoResult);
    }

    #[test]
    fn test_post_for_result_survives_close() {
        let queue = WorkQueue::new();
        let handle = queue.post_for_result(|| 5).unwrap();
        queue.close();
        queue.run_until_close();
        assert_eq!(handle.wait(), DispatchResult::Completed(5));
    }

    #[test]
    fn test_try_result_pending_then_ready() {
        let queue = WorkQueue::new();
        let mut handle = queue.post_for_result(|| "done").unwrap();
        assert!(handle.try_result().is_none());
        queue.run_one();
        assert_eq!(handle.try_result(), Some(DispatchResult::Completed("done")));
    }

    #[test]
    fn test_handle_is_a_future() {
        let worker = WorkerThread::spawn(WorkQueue::new(), FailurePolicy::Propagate).unwrap();
        let handle = worker.queue().post_for_result(|| 6 * 7).unwrap();
        let result = tokio_test::block_on(handle);
        assert_eq!(result, DispatchResult::Completed(42));
    }
}

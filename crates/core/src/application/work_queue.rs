//! Queue Core - named, closable, cross-thread FIFO of deferred work
//!
//! Any number of producers may `post`; exactly one consumer at a time drains
//! the queue through one of the `run_*` methods. Items execute outside the
//! lock, in the order they were appended, never concurrently with each other.
//!
//! Closing is the only cancellation primitive: once closed, a queue refuses
//! new items but still runs the ones already accepted.

use crate::application::constants::DEFAULT_NAME_PREFIX;
use crate::application::registry::Registry;
use crate::domain::{QueueConfig, QueueError, QueueStats, Result, Work};
use crate::port::{Clock, SystemClock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

/// Process-wide table of live queues
fn registry() -> &'static Registry<QueueCore> {
    static QUEUES: OnceLock<Registry<QueueCore>> = OnceLock::new();
    QUEUES.get_or_init(Registry::new)
}

struct QueueState {
    items: VecDeque<Work>,
    closed: bool,
    posted: u64,
    rejected: u64,
}

pub(crate) struct QueueCore {
    name: String,
    state: Mutex<QueueState>,
    available: Condvar,
    executed: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl QueueCore {
    fn new(name: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                posted: 0,
                rejected: 0,
            }),
            available: Condvar::new(),
            executed: AtomicU64::new(0),
            clock,
        }
    }

    // Items run outside the lock, so poisoning can only come from our own
    // bookkeeping; the state is still consistent in that case.
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of one bounded attempt to run an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Ran,
    Drained,
    TimedOut,
}

/// Owning handle to a named work queue
///
/// Cloning yields another owning handle to the same queue. The queue is
/// destroyed, along with any items still pending, when the last owning
/// handle is dropped.
#[derive(Clone)]
pub struct WorkQueue {
    core: Arc<QueueCore>,
}

/// Non-owning reference to a work queue
///
/// Never keeps the queue alive; `upgrade` returns `None` once it is gone.
#[derive(Clone)]
pub struct WeakWorkQueue {
    core: Weak<QueueCore>,
}

impl WorkQueue {
    /// Create a queue with a generated name (`WorkQueue<n>`) on the system clock
    pub fn new() -> Self {
        let core = registry().insert_generated(DEFAULT_NAME_PREFIX, |name| {
            QueueCore::new(name, Arc::new(SystemClock))
        });
        debug!(queue = %core.name, "Queue created");
        Self { core }
    }

    /// Create a queue registered under `name`
    ///
    /// # Errors
    /// - `QueueError::DuplicateName` if a live queue already has this name
    /// - `QueueError::InvalidName` if the name is empty or contains NUL
    pub fn with_name(name: impl Into<String>) -> Result<Self> {
        Self::with_config(QueueConfig::named(name), Arc::new(SystemClock))
    }

    /// Create a queue from explicit configuration and time source
    ///
    /// `clock` measures the deadlines of `run_for` and `run_until`. Timed
    /// posts always run on the real monotonic clock of the timer thread.
    pub fn with_config(config: QueueConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let core = match config.name {
            Some(name) => registry().insert_named(&name, |name| QueueCore::new(name, clock))?,
            None => registry()
                .insert_generated(DEFAULT_NAME_PREFIX, |name| QueueCore::new(name, clock)),
        };
        debug!(queue = %core.name, "Queue created");
        Ok(Self { core })
    }

    /// Look up a live queue by name from any thread
    pub fn get_instance(name: &str) -> Option<WorkQueue> {
        registry().get(name).map(|core| WorkQueue { core })
    }

    /// Names of all live queues, sorted
    pub fn live_names() -> Vec<String> {
        registry().live_names()
    }

    /// The queue's registry key
    pub fn key(&self) -> &str {
        &self.core.name
    }

    pub fn downgrade(&self) -> WeakWorkQueue {
        WeakWorkQueue {
            core: Arc::downgrade(&self.core),
        }
    }

    /// True if both handles refer to the same queue
    pub fn ptr_eq(&self, other: &WorkQueue) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    // ------------------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------------------

    /// Append a work item at the tail and wake the consumer
    ///
    /// Never blocks beyond the append itself.
    ///
    /// # Errors
    /// - `QueueError::Closed` if the queue has been closed; the item is
    ///   dropped without running
    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_boxed(Box::new(work))
    }

    /// Like `post`, but reports rejection as `false` instead of an error
    pub fn post_if_open<F>(&self, work: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post(work).is_ok()
    }

    pub(crate) fn post_boxed(&self, work: Work) -> Result<()> {
        let mut state = self.core.state();
        if state.closed {
            state.rejected += 1;
            drop(state);
            debug!(queue = %self.core.name, "Post rejected: queue closed");
            return Err(QueueError::Closed(self.core.name.clone()));
        }
        state.items.push_back(work);
        state.posted += 1;
        drop(state);

        self.core.available.notify_one();
        Ok(())
    }

    /// Refuse further posts and wake every waiting consumer (idempotent)
    pub fn close(&self) {
        let mut state = self.core.state();
        if state.closed {
            return;
        }
        state.closed = true;
        let pending = state.items.len();
        drop(state);

        self.core.available.notify_all();
        debug!(queue = %self.core.name, pending = pending, "Queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.core.state().closed
    }

    /// Closed and empty: nothing will ever run here again
    pub fn is_done(&self) -> bool {
        let state = self.core.state();
        state.closed && state.items.is_empty()
    }

    /// Number of items waiting
    pub fn len(&self) -> usize {
        self.core.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.state().items.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.core.state();
        QueueStats {
            name: self.core.name.clone(),
            pending: state.items.len(),
            closed: state.closed,
            posted: state.posted,
            executed: self.core.executed.load(Ordering::Relaxed),
            rejected: state.rejected,
        }
    }

    // ------------------------------------------------------------------------
    // Consumer
    // ------------------------------------------------------------------------
    //
    // A panicking item unwinds out of whichever run method executed it. The
    // queue stays usable; the caller decides whether to keep draining.

    /// Block until an item is available or the queue is closed, then run one
    ///
    /// Returns `false` only when the queue is closed and empty.
    pub fn run_one(&self) -> bool {
        let mut state = self.core.state();
        loop {
            if let Some(work) = state.items.pop_front() {
                drop(state);
                self.execute(work);
                return true;
            }
            if state.closed {
                return false;
            }
            state = self
                .core
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Run everything queued right now, in order, without waiting
    ///
    /// Items posted while the batch runs wait for the next call. Returns the
    /// number of items run.
    pub fn run_pending(&self) -> usize {
        let batch = std::mem::take(&mut self.core.state().items);
        let count = batch.len();
        for work in batch {
            self.execute(work);
        }
        count
    }

    /// Run items until the queue is closed and drained
    pub fn run_until_close(&self) {
        while self.run_one() {}
    }

    /// Run items for at most `duration`
    ///
    /// Returns `true` if the queue closed and drained first, `false` if the
    /// time ran out. A duration too large to form a deadline (such as
    /// `Duration::MAX`) runs until close.
    pub fn run_for(&self, duration: Duration) -> bool {
        match self.core.clock.now().checked_add(duration) {
            Some(deadline) => self.run_until(deadline),
            None => {
                self.run_until_close();
                true
            }
        }
    }

    /// Run items until `deadline` (on the queue's clock) or until the queue
    /// is closed and drained
    pub fn run_until(&self, deadline: Instant) -> bool {
        loop {
            match self.run_one_until(deadline) {
                Step::Ran => {}
                Step::Drained => return true,
                Step::TimedOut => return false,
            }
        }
    }

    fn run_one_until(&self, deadline: Instant) -> Step {
        let mut state = self.core.state();
        loop {
            if state.closed && state.items.is_empty() {
                return Step::Drained;
            }
            let now = self.core.clock.now();
            if now >= deadline {
                return Step::TimedOut;
            }
            if let Some(work) = state.items.pop_front() {
                drop(state);
                self.execute(work);
                return Step::Ran;
            }
            let (guard, _) = self
                .core
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn execute(&self, work: Work) {
        self.core.executed.fetch_add(1, Ordering::Relaxed);
        work();
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for WorkQueue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for WorkQueue {}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.core.name)
            .finish_non_exhaustive()
    }
}

impl WeakWorkQueue {
    /// Promote to an owning handle if the queue still exists
    pub fn upgrade(&self) -> Option<WorkQueue> {
        self.core.upgrade().map(|core| WorkQueue { core })
    }
}

impl From<&WorkQueue> for WeakWorkQueue {
    fn from(queue: &WorkQueue) -> Self {
        queue.downgrade()
    }
}

impl fmt::Debug for WeakWorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(queue) => f.debug_tuple("WeakWorkQueue").field(&queue.key()).finish(),
            None => f.write_str("WeakWorkQueue(<dropped>)"),
        }
    }
}

//! Timer - runs callbacks no earlier than a deadline, on a dedicated thread
//!
//! Backs timed and periodic posting. Queue consumers never sleep waiting for
//! an interval; all waiting happens here, and a due callback only ever
//! `post`s to its queue.

use crate::application::constants::TIMER_THREAD_NAME;
use crate::error::Result;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Instant;
use tracing::debug;

type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Scheduled callback entry for the priority queue.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first); the
/// sequence number keeps equal deadlines in scheduling order.
struct Entry {
    deadline: Instant,
    seq: u64,
    callback: TimerCallback,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TimerState {
    entries: BinaryHeap<Entry>,
    next_seq: u64,
    started: bool,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

impl TimerShared {
    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deadline-ordered callback scheduler with one lazily started thread
pub struct Timer {
    shared: Arc<TimerShared>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TimerShared::default()),
        }
    }

    /// The process-wide timer used by `post_at`, `post_after` and `post_every`
    pub fn global() -> &'static Timer {
        static TIMER: OnceLock<Timer> = OnceLock::new();
        TIMER.get_or_init(Timer::new)
    }

    /// Run `callback` on the timer thread once `deadline` has passed
    ///
    /// The callback must be short; it delays every later deadline.
    ///
    /// # Errors
    /// - `AppError::Io` if the timer thread cannot be started
    pub fn schedule<F>(&self, deadline: Instant, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state();
        if !state.started {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name(TIMER_THREAD_NAME.to_string())
                .spawn(move || run(shared))?;
            state.started = true;
            debug!("Timer thread started");
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push(Entry {
            deadline,
            seq,
            callback: Box::new(callback),
        });
        drop(state);

        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Number of callbacks not yet run
    pub fn pending(&self) -> usize {
        self.shared.state().entries.len()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shared.state().shutdown = true;
        self.shared.wakeup.notify_all();
    }
}

fn run(shared: Arc<TimerShared>) {
    let mut state = shared.state();
    loop {
        if state.shutdown {
            debug!(dropped = state.entries.len(), "Timer thread stopping");
            return;
        }

        let now = Instant::now();
        let next_deadline = state.entries.peek().map(|entry| entry.deadline);
        match next_deadline {
            Some(deadline) if deadline <= now => {
                if let Some(entry) = state.entries.pop() {
                    drop(state);
                    (entry.callback)();
                    state = shared.state();
                }
            }
            Some(deadline) => {
                let (guard, _) = shared
                    .wakeup
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
            }
            None => {
                state = shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

// Timed and periodic posting
//
// Both go through the process-wide Timer, which holds only a weak reference
// to the queue: a pending timer never keeps a queue alive. Deadlines are real
// monotonic instants, independent of the queue's injected Clock.

use crate::application::timer::Timer;
use crate::application::work_queue::{WeakWorkQueue, WorkQueue};
use crate::domain::{QueueError, Result as QueueResult};
use crate::error::Result;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

impl WorkQueue {
    /// Post `work` no earlier than `at`
    ///
    /// If the queue is dropped or closed by the time `at` arrives, the item is
    /// discarded without running.
    ///
    /// # Errors
    /// - `QueueError::Closed` (as `AppError::Domain`) if the queue is already closed
    /// - `AppError::Io` if the timer thread cannot be started
    pub fn post_at<F>(&self, at: Instant, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            return Err(QueueError::Closed(self.key().to_string()).into());
        }
        let target = self.downgrade();
        Timer::global().schedule(at, move || deliver(&target, work))
    }

    /// Post `work` once `delay` has elapsed
    ///
    /// # Errors
    /// - `QueueError::DelayOutOfRange` if `delay` cannot be added to the current instant
    /// - as for `post_at`
    pub fn post_after<F>(&self, delay: Duration, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let at = Instant::now()
            .checked_add(delay)
            .ok_or(QueueError::DelayOutOfRange(delay))?;
        self.post_at(at, work)
    }

    /// Run `body` now and then every `interval` until it returns `false`
    ///
    /// The first run is posted immediately and anchors the schedule. Each
    /// later run is scheduled at the previous *scheduled* instant plus
    /// `interval`, so execution latency does not accumulate as drift; after a
    /// late firing the next gap is shorter (see `PERIODIC_JITTER_BUDGET`).
    /// The chain also stops once the queue is closed or dropped, or when the
    /// next firing would fall outside the range of `Instant`.
    ///
    /// # Errors
    /// - `QueueError::Closed` if the queue is already closed
    pub fn post_every<F>(&self, interval: Duration, body: F) -> QueueResult<()>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let task = PeriodicTask {
            queue: self.downgrade(),
            interval,
            scheduled: None,
            fired: 0,
            body,
        };
        self.post(move || task.fire())
    }
}

fn deliver<F>(target: &WeakWorkQueue, work: F)
where
    F: FnOnce() + Send + 'static,
{
    match target.upgrade() {
        Some(queue) => {
            if !queue.post_if_open(work) {
                debug!(queue = %queue.key(), "Timed post dropped: queue closed");
            }
        }
        None => debug!("Timed post dropped: queue gone"),
    }
}

/// State of one periodic chain, moved from each firing into the next
struct PeriodicTask<F> {
    queue: WeakWorkQueue,
    interval: Duration,
    /// Instant this firing was due; `None` until the first firing runs
    scheduled: Option<Instant>,
    fired: u64,
    body: F,
}

impl<F> PeriodicTask<F>
where
    F: FnMut() -> bool + Send + 'static,
{
    fn fire(mut self) {
        let Some(queue) = self.queue.upgrade() else {
            return;
        };
        let scheduled = *self.scheduled.get_or_insert_with(Instant::now);

        self.fired += 1;
        if !(self.body)() {
            debug!(queue = %queue.key(), fired = self.fired, "Periodic task finished");
            return;
        }
        if queue.is_closed() {
            debug!(queue = %queue.key(), fired = self.fired, "Periodic task stopped: queue closed");
            return;
        }

        let Some(next) = scheduled.checked_add(self.interval) else {
            warn!(
                queue = %queue.key(),
                interval = ?self.interval,
                "Periodic task stopped: next firing out of range"
            );
            return;
        };
        self.scheduled = Some(next);
        if let Err(e) = queue.post_at(next, move || self.fire()) {
            warn!(queue = %queue.key(), error = %e, "Periodic task could not be rescheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::constants::PERIODIC_JITTER_BUDGET;
    use crate::domain::QueueConfig;
    use crate::error::AppError;
    use crate::port::clock::mocks::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_post_every_timing() {
        let queue = WorkQueue::new();
        let runs = Arc::new(Mutex::new(Vec::new()));
        let record = runs.clone();
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let mut count = 0;
        queue
            .post_every(interval, move || {
                record.lock().unwrap().push(Instant::now());
                count += 1;
                count < 3
            })
            .unwrap();

        queue.run_for(interval * 10);

        let result = runs.lock().unwrap().clone();
        assert_eq!(result.len(), 3, "called wrong number of times");
        let late = interval.mul_f64(PERIODIC_JITTER_BUDGET);
        assert!(result[0] - start < late - interval, "first call not immediate");
        for i in 1..result.len() {
            // Firings are anchored on the first one, so "never early" holds
            // against the anchor even when an earlier firing ran late.
            let since_anchor = result[i] - result[0];
            assert!(since_anchor >= interval * i as u32, "call {} too soon", i);
            let diff = result[i] - result[i - 1];
            assert!(diff < late, "call {} too late: {:?}", i, diff);
        }
        assert!(result[1] - result[0] >= interval);
    }

    #[test]
    fn test_post_every_stops_when_queue_closed() {
        let queue = WorkQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        queue
            .post_every(Duration::from_millis(20), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();

        assert!(queue.run_one());
        queue.close();
        std::thread::sleep(Duration::from_millis(60));
        assert!(queue.run_for(Duration::from_millis(100)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_every_on_closed_queue_rejected() {
        let queue = WorkQueue::new();
        queue.close();
        assert!(queue.post_every(Duration::from_millis(10), || true).is_err());
    }

    #[test]
    fn test_post_after_waits() {
        let queue = WorkQueue::new();
        let start = Instant::now();
        let delay = Duration::from_millis(60);
        let closer = queue.clone();
        queue.post_after(delay, move || closer.close()).unwrap();
        queue.run_until_close();
        assert!(start.elapsed() >= delay);
    }

    #[test]
    fn test_post_at_dropped_queue_is_harmless() {
        let queue = WorkQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        queue
            .post_after(Duration::from_millis(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        drop(queue);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_post_at_on_closed_queue_rejected() {
        let queue = WorkQueue::new();
        queue.close();
        let err = queue.post_after(Duration::ZERO, || {}).unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn test_late_firing_catches_up_to_anchor() {
        let queue = WorkQueue::new();
        let runs = Arc::new(Mutex::new(Vec::new()));
        let record = runs.clone();
        let interval = Duration::from_millis(100);
        let mut count = 0;
        queue
            .post_every(interval, move || {
                record.lock().unwrap().push(Instant::now());
                count += 1;
                if count == 1 {
                    std::thread::sleep(Duration::from_millis(170));
                }
                count < 3
            })
            .unwrap();

        queue.run_for(interval * 10);

        let result = runs.lock().unwrap().clone();
        assert_eq!(result.len(), 3);
        assert!(result[1] - result[0] >= interval);
        assert!(result[2] - result[0] >= interval * 2, "third firing before its slot");
        assert!(
            result[2] - result[1] < interval,
            "late firing should be followed by a shorter gap"
        );
    }

    #[test]
    fn test_post_every_out_of_range_interval_stops_after_first() {
        let queue = WorkQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        queue
            .post_every(Duration::MAX, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .unwrap();

        assert!(queue.run_one());
        queue.close();
        assert!(queue.run_for(Duration::from_millis(100)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_after_out_of_range_rejected() {
        let queue = WorkQueue::new();
        let err = queue.post_after(Duration::MAX, || {}).unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(QueueError::DelayOutOfRange(d)) if d == Duration::MAX
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_post_after_waits_real_time_with_manual_clock() {
        let clock = Arc::new(ManualClock::new());
        let queue = WorkQueue::with_config(QueueConfig::new(), clock.clone()).unwrap();
        let delay = Duration::from_millis(100);
        let start = Instant::now();
        let closer = queue.clone();
        queue.post_after(delay, move || closer.close()).unwrap();

        queue.run_until_close();
        assert!(start.elapsed() >= delay, "fired before the delay elapsed");
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}

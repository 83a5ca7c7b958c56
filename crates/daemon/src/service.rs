//! Demonstration service: a main queue dispatching work to worker threads
//!
//! The main queue runs a heartbeat via `post_every`. Each beat hands a small
//! computation to the next worker (round-robin) with `post_to`; the result is
//! delivered back and logged on the main queue's consumer.

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{info, warn};
use workqueue_core::{FailurePolicy, WeakWorkQueue, WorkQueue, WorkerThread};

pub const MAIN_QUEUE: &str = "main";

pub struct DemoService {
    main: WorkQueue,
    workers: Vec<WorkerThread>,
}

impl DemoService {
    /// Create the queues, start worker threads and the heartbeat
    ///
    /// The main queue still needs a consumer: drive `main_queue()` with one
    /// of its `run_*` methods.
    pub fn start(workers: usize, heartbeat: Duration) -> Result<Self> {
        if workers == 0 {
            bail!("at least one worker queue is required");
        }
        let main = WorkQueue::with_name(MAIN_QUEUE)?;
        let workers = (0..workers)
            .map(|i| {
                let queue = WorkQueue::with_name(format!("worker-{i}"))?;
                Ok(WorkerThread::spawn(queue, FailurePolicy::CatchAndContinue)?)
            })
            .collect::<Result<Vec<_>>>()?;

        let targets: Vec<WeakWorkQueue> =
            workers.iter().map(|w| w.queue().downgrade()).collect();
        let origin = main.downgrade();
        let mut beat: u64 = 0;
        main.post_every(heartbeat, move || {
            let Some(main) = origin.upgrade() else {
                return false;
            };
            beat += 1;
            let Some(target) = targets[beat as usize % targets.len()].upgrade() else {
                warn!(beat = beat, "Worker queue gone, stopping heartbeat");
                return false;
            };

            let n = beat;
            let dispatched = main.post_to(
                &target,
                move || sum_of_squares(n),
                move |value| info!(beat = n, value = value, "Dispatch result delivered"),
            );
            if let Err(e) = dispatched {
                warn!(error = %e, "Dispatch rejected, stopping heartbeat");
                return false;
            }

            let stats = serde_json::to_string(&main.stats()).unwrap_or_default();
            info!(beat = beat, stats = %stats, "Heartbeat");
            true
        })?;

        info!(
            workers = workers.len(),
            heartbeat_ms = heartbeat.as_millis() as u64,
            "Demo service started"
        );
        Ok(Self { main, workers })
    }

    pub fn main_queue(&self) -> &WorkQueue {
        &self.main
    }

    /// Close every queue and join the worker threads
    pub fn shutdown(self) -> Result<()> {
        self.main.close();
        for worker in self.workers {
            worker.close_and_join()?;
        }
        info!("Demo service stopped");
        Ok(())
    }
}

fn sum_of_squares(n: u64) -> u64 {
    (1..=n).map(|k| k * k).sum()
}

//! Timed and periodic posting against real time

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use workqueue_core::{FailurePolicy, WorkQueue, WorkerThread};

#[test]
fn test_post_every_three_runs() {
    let queue = WorkQueue::new();
    let runs = Arc::new(Mutex::new(Vec::new()));
    let record = runs.clone();
    let interval = Duration::from_millis(100);
    let start = Instant::now();
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
    assert!(result[0] - start < interval / 2, "first call not immediate");
    // Slots are anchored on the first firing; a late firing shortens the
    // gap after it, so "never early" is checked against the anchor.
    for i in 1..result.len() {
        assert!(
            result[i] - result[0] >= interval * i as u32,
            "call {} too soon",
            i
        );
        let diff = result[i] - result[i - 1];
        assert!(diff < interval.mul_f64(1.5), "call {} too late: {:?}", i, diff);
    }
}

#[test]
fn test_post_every_on_worker_thread_until_close() {
    let worker = WorkerThread::spawn(WorkQueue::new(), FailurePolicy::Propagate).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    worker
        .queue()
        .post_every(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();

    thread::sleep(Duration::from_millis(150));
    worker.close_and_join().unwrap();
    let seen = calls.load(Ordering::SeqCst);
    assert!(seen >= 2, "expected several firings, saw {}", seen);

    thread::sleep(Duration::from_millis(60));
    assert_eq!(calls.load(Ordering::SeqCst), seen, "fired after close");
}

#[test]
fn test_post_after_orders_by_deadline() {
    let queue = WorkQueue::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for (delay, label) in [(60, "late"), (20, "early")] {
        let order = order.clone();
        queue
            .post_after(Duration::from_millis(delay), move || {
                order.lock().unwrap().push(label)
            })
            .unwrap();
    }
    let closer = queue.clone();
    queue
        .post_after(Duration::from_millis(100), move || closer.close())
        .unwrap();

    assert!(queue.run_for(Duration::from_secs(5)));
    assert_eq!(*order.lock().unwrap(), vec!["early", "late"]);
}

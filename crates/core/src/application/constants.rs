// Queue constants (ADR: No magic values)

/// Name prefix for queues constructed without an explicit name
pub const DEFAULT_NAME_PREFIX: &str = "WorkQueue";

/// Thread name of the process-wide timer behind timed and periodic posts
pub const TIMER_THREAD_NAME: &str = "workqueue-timer";

/// Scheduling-quality target for `post_every`: consecutive firings should land
/// within `[interval, interval * PERIODIC_JITTER_BUDGET)`. Documented, not enforced.
///
/// The lower bound holds only while firings are on time. Each firing is due at
/// the previous *scheduled* instant plus the interval, so after a late firing
/// the next one catches up and that single gap can be shorter than the
/// interval (e.g. 170ms then 30ms at 100ms). What always holds is that firing
/// `k` never runs before `anchor + k * interval`.
pub const PERIODIC_JITTER_BUDGET: f64 = 1.5;

// Clock Port (for testability)

use std::time::Instant;

/// Monotonic time source (allows deterministic clocks in tests)
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;
}

/// System monotonic clock (production)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    /// Clock that only moves when told to
    ///
    /// Instants are offsets from a real base instant, so they stay comparable
    /// with `Instant::now()` taken elsewhere.
    pub struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
        }

        pub fn elapsed(&self) -> Duration {
            *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

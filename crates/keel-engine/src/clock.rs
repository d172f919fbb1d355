//! Time source for the waiter.
//!
//! The waiter never calls `tokio::time` directly; it goes through a [`Clock`]
//! so tests can drive polling deterministically with a [`ManualClock`].

use std::time::{Duration, Instant};

use async_trait::async_trait;

/// A monotonic clock that can also sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The runtime clock, backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-utils"))]
mod manual {
    use super::{async_trait, Clock, Duration, Instant};
    use parking_lot::Mutex;

    /// A clock that only moves when something sleeps on it.
    ///
    /// Every sleep is recorded and advances the clock by exactly the
    /// requested duration, so a whole wait runs instantly.
    #[derive(Debug)]
    pub struct ManualClock {
        start: Instant,
        elapsed: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ManualClock {
        /// Create a clock at time zero.
        #[must_use]
        pub fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }
        }

        /// Move the clock forward without recording a sleep.
        pub fn advance(&self, duration: Duration) {
            *self.elapsed.lock() += duration;
        }

        /// Total time elapsed since creation.
        #[must_use]
        pub fn elapsed(&self) -> Duration {
            *self.elapsed.lock()
        }

        /// Every sleep requested so far, in order.
        #[must_use]
        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().clone()
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.start + *self.elapsed.lock()
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
            *self.elapsed.lock() += duration;
            tokio::task::yield_now().await;
        }
    }
}

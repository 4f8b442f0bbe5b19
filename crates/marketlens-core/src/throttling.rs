use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide spacing between upstream calls.
///
/// One cell per `min_interval`, burst of one: the first call passes at once,
/// every later call waits until the interval since the previous one elapsed.
/// Clones share the same limiter.
#[derive(Clone)]
pub struct RequestThrottle {
    limiter: Arc<DirectRateLimiter>,
    min_interval: Duration,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        let period = min_interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            min_interval: period,
        }
    }

    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next upstream call is allowed.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take the next slot, waiting for it if needed. Returns the delay that
    /// was reported when the slot was not free.
    pub async fn acquire(&self) -> Option<Duration> {
        match self.try_acquire() {
            Ok(()) => None,
            Err(delay) => {
                self.wait().await;
                Some(delay)
            }
        }
    }

    /// Take the next slot if it is free, otherwise report how long until it is.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}

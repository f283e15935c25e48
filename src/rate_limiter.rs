//! Request rate limiting using a token bucket
//!
//! A single [`RateLimiter`] is shared by every worker and exporter of a run.
//! It is acquired right before each network call on the export-link fallback
//! path, keeping the aggregate call rate under the service's quota.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Shared permit-per-second limiter
///
/// Tokens are request permits. They refill at `per_second` and the bucket
/// holds at most one second's worth, so a quiet period allows a short burst.
/// All state lives in atomics; clones share the same bucket.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// Permits per second (0 = unlimited)
    per_second: Arc<AtomicU64>,
    /// Permits available right now
    tokens: Arc<AtomicU64>,
    /// Refill clock (nanoseconds since an arbitrary process-wide epoch)
    last_refill: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a limiter allowing `per_second` requests per second (None = unlimited)
    ///
    /// ```
    /// use drive_mirror::rate_limiter::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(Some(10));
    /// assert_eq!(limiter.get_limit(), Some(10));
    /// ```
    #[must_use]
    pub fn new(per_second: Option<u64>) -> Self {
        let limit = per_second.unwrap_or(0);
        Self {
            per_second: Arc::new(AtomicU64::new(limit)),
            tokens: Arc::new(AtomicU64::new(limit)),
            last_refill: Arc::new(AtomicU64::new(Self::now_nanos())),
        }
    }

    /// Change the limit; takes effect for waiters on their next check
    pub fn set_limit(&self, per_second: Option<u64>) {
        let new_limit = per_second.unwrap_or(0);
        let old_limit = self.per_second.swap(new_limit, Ordering::SeqCst);
        if new_limit > old_limit {
            self.tokens
                .fetch_add(new_limit - old_limit, Ordering::SeqCst);
        }
    }

    /// Current limit (None = unlimited)
    pub fn get_limit(&self) -> Option<u64> {
        match self.per_second.load(Ordering::Relaxed) {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Wait for one request permit
    pub async fn acquire(&self) {
        self.acquire_many(1).await
    }

    /// Wait until `permits` request permits have been taken
    pub async fn acquire_many(&self, permits: u64) {
        let mut remaining = permits;

        while remaining > 0 {
            let limit = self.per_second.load(Ordering::Relaxed);
            if limit == 0 {
                return;
            }

            self.refill();

            let available = self.tokens.load(Ordering::SeqCst);
            let take = remaining.min(available);
            if take > 0 {
                if self
                    .tokens
                    .compare_exchange(
                        available,
                        available - take,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    remaining -= take;
                }
                continue;
            }

            // Sleep roughly one permit interval, re-checking at least every 100ms
            // so limit changes are picked up.
            let wait_ms = 1000 / limit;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    /// Add the permits earned since the last refill
    ///
    /// The clock only advances by the time the granted permits account for,
    /// so sub-permit remainders are not lost at low rates.
    fn refill(&self) {
        let limit = self.per_second.load(Ordering::Relaxed);
        if limit == 0 {
            return;
        }

        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);
        let elapsed = now.saturating_sub(last);
        let earned = (elapsed as u128 * limit as u128 / NANOS_PER_SEC as u128) as u64;
        if earned == 0 {
            return;
        }

        let current = self.tokens.load(Ordering::SeqCst);
        let next_clock = if current + earned >= limit {
            // Bucket full: nothing carries over
            now
        } else {
            last + earned * NANOS_PER_SEC / limit
        };

        if self
            .last_refill
            .compare_exchange(last, next_clock, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |tokens| {
                    Some((tokens + earned).min(limit))
                });
        }
    }

    /// Monotonic nanoseconds since the first call in this process
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

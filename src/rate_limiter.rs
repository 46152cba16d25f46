//! Request pacing using an interval gate
//!
//! The RateLimiter provides a global request-rate ceiling across all
//! concurrent lookup workers using an efficient lock-free slot reservation
//! scheme.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global rate limiter shared across all lookup workers
///
/// Every worker acquires a permit before touching the carrier site. Permits
/// are slots on a single shared timeline, so the ceiling holds across the
/// whole process no matter how many workers run concurrently.
///
/// # Algorithm
///
/// - Slots sit `1 / rate` seconds apart on a shared timeline
/// - Each acquire reserves the next free slot and sleeps until it arrives
/// - The first caller after an idle stretch passes through immediately
/// - In any window of `T` seconds at most `rate * T + 1` permits are granted
///
/// # Implementation
///
/// Uses AtomicU64 for lock-free slot reservation:
/// - `interval_nanos`: nanoseconds between slots (0 = unlimited)
/// - `next_permit`: timestamp of the next free slot (nanoseconds since an
///   arbitrary epoch)
#[derive(Clone)]
pub struct RateLimiter {
    /// Nanoseconds between permit slots (0 = unlimited)
    interval_nanos: u64,
    /// Timestamp of the next free slot (nanoseconds since arbitrary epoch)
    next_permit: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a new RateLimiter with the specified ceiling
    ///
    /// # Arguments
    ///
    /// * `requests_per_second` - Permit rate; fractional rates are supported
    ///   and `0.0` disables pacing entirely
    ///
    /// # Examples
    ///
    /// ```
    /// use parcel_sync::rate_limiter::RateLimiter;
    ///
    /// // At most 0.8 lookups per second across all workers
    /// let limiter = RateLimiter::new(0.8);
    ///
    /// // Unlimited
    /// let unpaced = RateLimiter::new(0.0);
    /// ```
    #[must_use]
    pub fn new(requests_per_second: f64) -> Self {
        let interval_nanos = if requests_per_second > 0.0 {
            (1_000_000_000.0 / requests_per_second) as u64
        } else {
            0
        };

        Self {
            interval_nanos,
            next_permit: Arc::new(AtomicU64::new(Self::now_nanos())),
        }
    }

    /// Acquire a permit for one carrier lookup
    ///
    /// Reserves the next free slot on the shared timeline and sleeps until
    /// that slot arrives. For an unlimited limiter this returns immediately.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use parcel_sync::rate_limiter::RateLimiter;
    ///
    /// # async fn example() {
    /// let limiter = RateLimiter::new(0.8);
    ///
    /// // Before each page navigation
    /// limiter.acquire().await;
    /// // ... perform lookup ...
    /// # }
    /// ```
    pub async fn acquire(&self) {
        // Fast path: unlimited rate
        if self.interval_nanos == 0 {
            return;
        }

        loop {
            let now = Self::now_nanos();
            let next = self.next_permit.load(Ordering::SeqCst);

            // An idle timeline never owes permits from the past
            let scheduled = next.max(now);

            if self
                .next_permit
                .compare_exchange(
                    next,
                    scheduled + self.interval_nanos,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                if scheduled > now {
                    tokio::time::sleep(Duration::from_nanos(scheduled - now)).await;
                }
                return;
            }

            // Another worker took this slot — reserve the next one
            tokio::task::yield_now().await;
        }
    }

    /// Get current monotonic time in nanoseconds
    ///
    /// Uses a monotonic clock that is not affected by system time changes.
    /// The epoch is arbitrary but consistent within a process lifetime.
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

//! Retry logic for lookups that come back without a status
//!
//! Carrier pages frequently render without a status on the first visit, so a
//! bounded number of re-attempts recovers a large share of rows. There is no
//! backoff delay between attempts: the shared rate limiter already spaces
//! every navigation, and an extra sleep would only stretch the run.
//!
//! # Example
//!
//! ```no_run
//! use parcel_sync::retry::RetryPolicy;
//! use parcel_sync::types::FetchOutcome;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(1);
//! let outcome = policy
//!     .run("240012345678", || async {
//!         // Your lookup here
//!         FetchOutcome::Status("EN TRANSITO".to_string())
//!     })
//!     .await;
//! assert!(outcome.is_status());
//! # }
//! ```

use crate::types::FetchOutcome;
use std::future::Future;

/// Bounded retry policy for a single row lookup
///
/// An outcome is worth retrying when the page rendered without a status or
/// the failure was transient (timeout, navigation error). Anything else
/// passes straight through, including cancellation, which is reported as a
/// failure that is not transient.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Extra attempts after the first; total attempts = `retries + 1`
    retries: u32,
}

impl RetryPolicy {
    /// Create a policy granting `retries` extra attempts per row.
    #[must_use]
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    /// Run `operation` until it produces an outcome not worth retrying or the
    /// attempt budget runs out.
    ///
    /// Returns the last outcome either way, so a row that stays empty through
    /// every attempt reports as empty, not as an error.
    pub async fn run<F, Fut>(&self, tracking: &str, mut operation: F) -> FetchOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let mut attempt = 0_u32;

        loop {
            let outcome = operation().await;
            attempt += 1;

            if !outcome.is_retryable() || attempt > self.retries {
                if attempt > 1 && outcome.is_status() {
                    tracing::info!(tracking, attempts = attempt, "Lookup succeeded after retry");
                }
                return outcome;
            }

            tracing::warn!(
                tracking,
                outcome = outcome.kind(),
                attempt,
                max_attempts = self.retries + 1,
                "Lookup produced no status, retrying"
            );
        }
    }
}

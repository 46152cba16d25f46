//! Bounded concurrent lookups for one slice of rows
//!
//! One pool instance serves a whole run: its rate limiter clones share one
//! timeline, so pacing holds across batches and across the second pass
//! instead of resetting whenever the browser is recycled.

use std::sync::Arc;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::browser::StatusSession;
use crate::config::RunConfig;
use crate::error::FetchError;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::types::{FetchOutcome, Row};

/// Runs row lookups through one browser session under shared ceilings
///
/// Concurrency is capped with a buffered stream and request spacing with the
/// shared rate limiter; empty and transiently failed lookups get bounded
/// re-attempts. Rows with no usable tracking number never reach the carrier:
/// they resolve to [`FetchOutcome::Empty`] without consuming a permit.
pub struct WorkerPool {
    max_concurrency: usize,
    limiter: RateLimiter,
    policy: RetryPolicy,
    tracking_pattern: Option<regex::Regex>,
}

impl WorkerPool {
    /// Build a pool from a run snapshot.
    #[must_use]
    pub fn new(run: &RunConfig) -> Self {
        Self {
            max_concurrency: run.max_concurrency,
            limiter: RateLimiter::new(run.requests_per_second),
            policy: RetryPolicy::new(run.retries),
            tracking_pattern: run.tracking_pattern.clone(),
        }
    }

    /// Whether a row's tracking number is worth sending to the carrier.
    ///
    /// Blank cells and values that fail the configured shape check are not.
    #[must_use]
    pub fn is_fetchable(&self, row: &Row) -> bool {
        let tracking = row.tracking_number.trim();
        if tracking.is_empty() {
            return false;
        }
        self.tracking_pattern
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(tracking))
    }

    /// Look up every row in `rows` and return their outcomes in row order.
    ///
    /// The returned vector is aligned with the input slice. Rows that fail
    /// [`WorkerPool::is_fetchable`] come back as [`FetchOutcome::Empty`]
    /// without a navigation; everything else goes through the session with
    /// at most `max_concurrency` lookups in flight.
    ///
    /// Cancellation resolves pending rows as
    /// [`FetchError::Cancelled`] rather than dropping them, so callers can
    /// still tell which rows finished.
    pub async fn run(
        &self,
        session: &Arc<dyn StatusSession>,
        rows: &[Row],
        cancel: &CancellationToken,
    ) -> Vec<FetchOutcome> {
        self.fan_out(session, rows, cancel, self.policy).await
    }

    /// Like [`WorkerPool::run`], but every row gets exactly one attempt.
    ///
    /// Used for the in-batch second sweep over rows that stayed empty: those
    /// rows already spent their retry budget, so the sweep grants a single
    /// extra fetch, still paced by the shared limiter.
    pub async fn sweep(
        &self,
        session: &Arc<dyn StatusSession>,
        rows: &[Row],
        cancel: &CancellationToken,
    ) -> Vec<FetchOutcome> {
        self.fan_out(session, rows, cancel, RetryPolicy::new(0)).await
    }

    async fn fan_out(
        &self,
        session: &Arc<dyn StatusSession>,
        rows: &[Row],
        cancel: &CancellationToken,
        policy: RetryPolicy,
    ) -> Vec<FetchOutcome> {
        let mut outcomes = vec![FetchOutcome::Empty; rows.len()];
        let mut fetchable = Vec::with_capacity(rows.len());

        for (slot, row) in rows.iter().enumerate() {
            if self.is_fetchable(row) {
                fetchable.push((slot, row));
            } else if row.has_tracking() {
                tracing::debug!(
                    row = row.index.get(),
                    tracking = row.tracking_number.trim(),
                    "Tracking number failed the shape check, skipping lookup"
                );
            }
        }

        let fetched: Vec<(usize, FetchOutcome)> = stream::iter(fetchable)
            .map(|(slot, row)| {
                let session = Arc::clone(session);
                let limiter = self.limiter.clone();
                let cancel = cancel.clone();
                let tracking = row.tracking_number.trim().to_string();

                async move {
                    let outcome = policy
                        .run(&tracking, || {
                            attempt(
                                Arc::clone(&session),
                                limiter.clone(),
                                cancel.clone(),
                                tracking.clone(),
                            )
                        })
                        .await;
                    (slot, outcome)
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (slot, outcome) in fetched {
            if let FetchOutcome::Failed(error) = &outcome
                && !matches!(error, FetchError::Cancelled)
            {
                tracing::warn!(
                    row = rows[slot].index.get(),
                    tracking = rows[slot].tracking_number.trim(),
                    error = %error,
                    "Lookup failed"
                );
            }
            outcomes[slot] = outcome;
        }

        outcomes
    }
}

/// One attempt: wait for a permit, then ask the session, bailing out the
/// moment cancellation lands.
async fn attempt(
    session: Arc<dyn StatusSession>,
    limiter: RateLimiter,
    cancel: CancellationToken,
    tracking: String,
) -> FetchOutcome {
    if cancel.is_cancelled() {
        return FetchOutcome::Failed(FetchError::Cancelled);
    }

    tokio::select! {
        _ = cancel.cancelled() => FetchOutcome::Failed(FetchError::Cancelled),
        _ = limiter.acquire() => {
            tokio::select! {
                _ = cancel.cancelled() => FetchOutcome::Failed(FetchError::Cancelled),
                outcome = session.fetch_status(&tracking) => outcome,
            }
        }
    }
}

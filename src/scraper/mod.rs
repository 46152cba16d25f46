//! Batch-by-batch scrape engine
//!
//! [`BatchScheduler`] carves the selected rows into fixed-size batches, opens
//! a fresh browser session for each, fans the batch out through the
//! [`WorkerPool`], and hands the merged results to a [`BatchSink`] before the
//! inter-batch pause. Recycling the browser at batch boundaries keeps its
//! memory bounded over runs of tens of thousands of rows.

pub mod worker_pool;

pub use worker_pool::WorkerPool;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::browser::SessionFactory;
use crate::config::RunConfig;
use crate::error::{FetchError, Result};
use crate::types::{FetchOutcome, Row, ScrapedRow};

/// Receives each batch's merged results as soon as the batch completes
///
/// The scrape operation persists updates through this seam before the
/// inter-batch sleep, which is what lets batches that finished before an
/// abort survive it.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Persist one batch's rows.
    ///
    /// # Arguments
    /// * `batch` - Batch number, starting at 1
    /// * `rows` - Every row of the batch, paired with its final outcome
    ///
    /// # Errors
    /// An error stops the run; later batches are not fetched.
    async fn on_batch(&self, batch: usize, rows: &[ScrapedRow]) -> Result<()>;
}

/// What one full pass over the selected rows produced
#[derive(Clone, Debug, Default)]
pub struct PassOutcome {
    /// Every processed row with its final outcome, in row order
    pub rows: Vec<ScrapedRow>,
    /// Batches handed to the sink
    pub batches: usize,
    /// Rows resolved as empty without a lookup (blank or malformed tracking)
    pub short_circuited: usize,
    /// Rows whose status only arrived on the in-batch second sweep
    pub second_pass_recovered: usize,
    /// True when cancellation stopped the run before the last batch finished
    pub aborted: bool,
}

/// Drives a scrape run batch by batch
///
/// Each batch gets a fresh browser session from the factory and is closed on
/// every exit path. The worker pool, and with it the rate limiter's timeline,
/// spans the whole run, so recycling the browser never resets the pacing.
pub struct BatchScheduler {
    run: RunConfig,
    pool: WorkerPool,
    sessions: Arc<dyn SessionFactory>,
}

impl BatchScheduler {
    /// Build a scheduler for one run.
    #[must_use]
    pub fn new(run: RunConfig, sessions: Arc<dyn SessionFactory>) -> Self {
        let pool = WorkerPool::new(&run);
        Self {
            run,
            pool,
            sessions,
        }
    }

    /// Process `rows` in consecutive batches of `batch_size`.
    ///
    /// Sleeps `sleep_between_batches` after every batch except the last. A
    /// cancellation observed mid-batch still hands that batch's partial
    /// results to the sink, then stops; batches already persisted are
    /// untouched.
    ///
    /// # Errors
    /// Fails when a browser session cannot be opened or the sink rejects a
    /// batch. Per-row lookup failures are data, not errors.
    pub async fn run(
        &self,
        rows: &[Row],
        sink: &dyn BatchSink,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome> {
        let total = rows.len().div_ceil(self.run.batch_size);
        let mut outcome = PassOutcome::default();

        for (position, chunk) in rows.chunks(self.run.batch_size).enumerate() {
            let batch = position + 1;
            if cancel.is_cancelled() {
                outcome.aborted = true;
                break;
            }

            let (outcomes, recovered) = self.fetch_batch(batch, chunk, cancel).await?;

            let (ok, empty, failed) = tally(&outcomes);
            tracing::info!(
                batch,
                of = total,
                total = chunk.len(),
                ok,
                empty,
                failed,
                recovered,
                "Batch finished"
            );

            let scraped: Vec<ScrapedRow> = chunk
                .iter()
                .cloned()
                .zip(outcomes)
                .map(|(row, fetched)| ScrapedRow::new(row, fetched))
                .collect();
            sink.on_batch(batch, &scraped).await?;

            outcome.rows.extend(scraped);
            outcome.batches += 1;
            outcome.short_circuited += chunk
                .iter()
                .filter(|row| !self.pool.is_fetchable(row))
                .count();
            outcome.second_pass_recovered += recovered;

            if cancel.is_cancelled() {
                outcome.aborted = true;
                break;
            }

            if batch < total && !self.run.sleep_between_batches.is_zero() {
                tracing::debug!(
                    batch,
                    seconds = self.run.sleep_between_batches.as_secs_f64(),
                    "Sleeping before the next batch"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        outcome.aborted = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.run.sleep_between_batches) => {}
                }
            }
        }

        Ok(outcome)
    }

    /// Fetch one batch through a fresh session, second sweep included.
    ///
    /// The session is closed before returning, whatever happened.
    async fn fetch_batch(
        &self,
        batch: usize,
        chunk: &[Row],
        cancel: &CancellationToken,
    ) -> Result<(Vec<FetchOutcome>, usize)> {
        let session = self.sessions.open().await?;

        let mut outcomes = self.pool.run(&session, chunk, cancel).await;
        let mut recovered = 0;

        if self.run.second_pass && !cancel.is_cancelled() {
            let pending: Vec<usize> = outcomes
                .iter()
                .enumerate()
                .filter(|(slot, fetched)| {
                    fetched.is_retryable() && self.pool.is_fetchable(&chunk[*slot])
                })
                .map(|(slot, _)| slot)
                .collect();

            if !pending.is_empty() {
                tracing::debug!(
                    batch,
                    rows = pending.len(),
                    "Second pass over rows still missing a status"
                );
                let retry_rows: Vec<Row> =
                    pending.iter().map(|&slot| chunk[slot].clone()).collect();
                let swept = self.pool.sweep(&session, &retry_rows, cancel).await;
                for (&slot, fetched) in pending.iter().zip(swept) {
                    // A sweep cut short by shutdown must not overwrite what
                    // the first pass saw.
                    if matches!(fetched, FetchOutcome::Failed(FetchError::Cancelled)) {
                        continue;
                    }
                    if fetched.is_status() {
                        recovered += 1;
                    }
                    outcomes[slot] = fetched;
                }
            }
        }

        if let Err(error) = session.close().await {
            tracing::warn!(batch, error = %error, "Browser session did not close cleanly");
        }

        Ok((outcomes, recovered))
    }
}

fn tally(outcomes: &[FetchOutcome]) -> (usize, usize, usize) {
    let mut ok = 0;
    let mut empty = 0;
    let mut failed = 0;
    for outcome in outcomes {
        match outcome {
            FetchOutcome::Status(_) => ok += 1,
            FetchOutcome::Empty => empty += 1,
            FetchOutcome::Failed(_) => failed += 1,
        }
    }
    (ok, empty, failed)
}

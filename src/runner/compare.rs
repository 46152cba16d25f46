//! The compare operation: classify recorded against scraped statuses.

use std::time::Instant;

use crate::config::CompareOptions;
use crate::error::Result;
use crate::lock::RunLock;
use crate::reconcile::{Comparison, Reconciler};
use crate::types::{CompareSummary, RunOutcome};

use super::ParcelSync;

impl ParcelSync {
    /// Run the compare operation: classify every selected row and return the
    /// records without writing a report artifact.
    ///
    /// The sheet writer's comparison hook receives every classification, so a
    /// backend keeping a comparison column sees matches too; the returned
    /// summary honors the only-mismatches filter.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, an unreadable sheet, or a writer that
    /// rejects the comparison.
    pub async fn compare(&self, options: CompareOptions) -> Result<CompareSummary> {
        let run = self.config.compare_run(&options)?;
        let Some(_lock) = RunLock::try_acquire(&self.config.runtime.lock_dir, "compare")? else {
            tracing::info!("Another compare is already running, nothing to do");
            return Ok(CompareSummary::lock_held());
        };

        let started = Instant::now();
        tracing::info!(
            start_row = run.start_row,
            end_row = run.end_row,
            only_mismatches = run.only_mismatches,
            "Compare run starting"
        );

        let rows = self.read_range(run.start_row, run.end_row).await?;
        let comparison = Reconciler::new(false).compare(&rows);
        self.sheet_writer
            .write_comparison(&comparison.records)
            .await?;

        let Comparison {
            records,
            rows_compared,
            matches,
            mismatches,
            newly_observed,
            unconfirmed,
        } = comparison;
        let records = if run.only_mismatches {
            records
                .into_iter()
                .filter(|record| !record.kind.is_match())
                .collect()
        } else {
            records
        };

        let summary = CompareSummary {
            outcome: RunOutcome::Completed,
            rows_compared,
            matches,
            mismatches,
            newly_observed,
            unconfirmed,
            records,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            rows = summary.rows_compared,
            matches = summary.matches,
            mismatches = summary.mismatches,
            newly_observed = summary.newly_observed,
            unconfirmed = summary.unconfirmed,
            "Compare run finished"
        );
        Ok(summary)
    }
}

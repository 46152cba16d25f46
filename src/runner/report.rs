//! The report operation: classify and write the dated report artifact.

use std::time::Instant;

use chrono::Utc;

use crate::config::{CompareRun, ReportOptions};
use crate::error::Result;
use crate::lock::RunLock;
use crate::reconcile::Reconciler;
use crate::types::{ReportSummary, RunOutcome};

use super::ParcelSync;

impl ParcelSync {
    /// Run the report operation: classify the selected rows and write the
    /// resulting records through the report sink.
    ///
    /// With the only-mismatches filter on, matching rows count toward the
    /// totals but stay out of the artifact. A comparison that produced zero
    /// records still writes one; an empty report documents that the run
    /// happened.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, an unreadable sheet, or an artifact that
    /// cannot be written.
    pub async fn report(&self, options: ReportOptions) -> Result<ReportSummary> {
        let run = self.config.report_run(&options)?;
        let Some(_lock) = RunLock::try_acquire(&self.config.runtime.lock_dir, "report")? else {
            tracing::info!("Another report is already running, nothing to do");
            return Ok(ReportSummary::lock_held());
        };
        self.report_locked(run).await
    }

    /// Report body, entered with the lock already held.
    ///
    /// Split out so the `all` operation can hold both of its locks itself.
    pub(crate) async fn report_locked(&self, run: CompareRun) -> Result<ReportSummary> {
        let started = Instant::now();
        tracing::info!(
            start_row = run.start_row,
            end_row = run.end_row,
            only_mismatches = run.only_mismatches,
            prefix = run.prefix,
            "Report run starting"
        );

        let rows = self.read_range(run.start_row, run.end_row).await?;
        let comparison = Reconciler::new(run.only_mismatches).compare(&rows);
        let artifact = self
            .report_sink
            .write(Utc::now(), &run.prefix, &comparison.records)
            .await?;

        let summary = ReportSummary {
            outcome: RunOutcome::Completed,
            rows_compared: comparison.rows_compared,
            records_written: comparison.records.len(),
            mismatches: comparison.mismatches,
            newly_observed: comparison.newly_observed,
            unconfirmed: comparison.unconfirmed,
            artifact: Some(artifact),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            artifact = summary.artifact.as_deref().unwrap_or_default(),
            rows = summary.rows_compared,
            records = summary.records_written,
            mismatches = summary.mismatches,
            "Report run finished"
        );
        Ok(summary)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::ReportOptions;
    use crate::lock::RunLock;
    use crate::runner::test_support::{delivered_factory, engine, temp_config};
    use crate::sheet::MemorySheet;
    use crate::types::{Row, RunOutcome};

    fn mismatched_rows() -> Vec<Row> {
        vec![
            Row::new(2, "G1", "Entregado").with_scraped("Entregado"),
            Row::new(3, "G2", "En tránsito").with_scraped("Entregado"),
        ]
    }

    #[tokio::test]
    async fn report_writes_a_dated_artifact_into_the_configured_dir() {
        let (_dir, config) = temp_config();
        let report_dir = config.runtime.report_dir.clone();
        let sheet = Arc::new(MemorySheet::new(mismatched_rows()));
        let sync = engine(config, sheet, delivered_factory());

        let summary = sync.report(ReportOptions::default()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.rows_compared, 2);
        assert_eq!(summary.mismatches, 1);
        assert_eq!(summary.records_written, 1, "the matching row is filtered");

        let artifact = summary.artifact.unwrap();
        assert!(std::path::Path::new(&artifact).exists());
        assert!(artifact.starts_with(report_dir.to_string_lossy().as_ref()));

        let body = std::fs::read_to_string(&artifact).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc["records"][0]["tracking_number"], "G2");
    }

    #[tokio::test]
    async fn prefix_override_names_the_artifact() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(mismatched_rows()));
        let sync = engine(config, sheet, delivered_factory());

        let summary = sync
            .report(ReportOptions {
                prefix: Some("Auditoria_".to_string()),
                ..ReportOptions::default()
            })
            .await
            .unwrap();

        let artifact = summary.artifact.unwrap();
        let name = std::path::Path::new(&artifact)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with("Auditoria_"), "got {name}");
        assert!(name.ends_with(".json"));
    }

    #[tokio::test]
    async fn clean_comparison_still_writes_an_empty_artifact() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![
            Row::new(2, "G1", "Entregado").with_scraped("entregado"),
        ]));
        let sync = engine(config, sheet, delivered_factory());

        let summary = sync.report(ReportOptions::default()).await.unwrap();

        assert_eq!(summary.records_written, 0);
        let artifact = summary.artifact.unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&artifact).unwrap()).unwrap();
        assert_eq!(doc["total_records"], 0);
    }

    #[tokio::test]
    async fn unfiltered_report_includes_matches() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(mismatched_rows()));
        let sync = engine(config, sheet, delivered_factory());

        let summary = sync
            .report(ReportOptions {
                only_mismatches: Some(false),
                ..ReportOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.records_written, 2);
    }

    #[tokio::test]
    async fn held_lock_short_circuits_the_run() {
        let (_dir, config) = temp_config();
        let report_dir = config.runtime.report_dir.clone();
        let sheet = Arc::new(MemorySheet::new(mismatched_rows()));
        let sync = engine(config.clone(), sheet, delivered_factory());

        let _held = RunLock::try_acquire(&config.runtime.lock_dir, "report")
            .unwrap()
            .unwrap();
        let summary = sync.report(ReportOptions::default()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::LockHeld);
        assert!(summary.artifact.is_none());
        assert!(!report_dir.exists(), "no artifact directory may be created");
    }
}

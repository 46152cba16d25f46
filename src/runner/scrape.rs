//! The scrape operation: batched carrier lookups with per-batch write-back.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::config::{RunConfig, ScrapeOptions};
use crate::error::Result;
use crate::lock::RunLock;
use crate::scraper::{BatchScheduler, BatchSink};
use crate::sheet::SheetWriter;
use crate::status_map::StatusMap;
use crate::types::{FetchOutcome, RunOutcome, ScrapeSummary, ScrapedRow, StatusUpdate};

use super::ParcelSync;

/// Turns each finished batch into status updates and hands them to the sheet
/// writer before the inter-batch sleep.
///
/// Only rows that came back with a status produce an update; empty and failed
/// rows leave the sheet untouched. The update carries the raw text, its
/// canonical code, and the alert flag for rows whose canonical status moved
/// away from what the sheet recorded.
struct UpdateSink {
    writer: Arc<dyn SheetWriter>,
    status_map: StatusMap,
}

#[async_trait]
impl BatchSink for UpdateSink {
    async fn on_batch(&self, batch: usize, rows: &[ScrapedRow]) -> Result<()> {
        let updates: Vec<StatusUpdate> = rows
            .iter()
            .filter_map(|scraped| {
                let FetchOutcome::Status(text) = &scraped.outcome else {
                    return None;
                };
                Some(StatusUpdate {
                    row_index: scraped.row.index,
                    status: text.clone(),
                    canonical: self.status_map.canonicalize(text),
                    alert: self
                        .status_map
                        .should_alert(&scraped.row.recorded_status, text),
                })
            })
            .collect();

        if updates.is_empty() {
            tracing::debug!(batch, "Batch produced no statuses to persist");
            return Ok(());
        }
        self.writer.write_updates(&updates).await?;
        tracing::debug!(batch, updates = updates.len(), "Batch persisted");
        Ok(())
    }
}

impl ParcelSync {
    /// Run the scrape operation: look up every selected row's status and
    /// persist the answers batch by batch.
    ///
    /// Row selection starts from the configured range, then drops rows with a
    /// recorded status when `only_empty` is set. An empty selection completes
    /// immediately with zero batches.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, an unreadable sheet, a browser that cannot
    /// be launched, or a writer that rejects a batch. Per-row lookup failures
    /// are data in the summary, not errors.
    pub async fn scrape(&self, options: ScrapeOptions) -> Result<ScrapeSummary> {
        let run = self.config.scrape_run(&options)?;
        let Some(_lock) = RunLock::try_acquire(&self.config.runtime.lock_dir, "scrape")? else {
            tracing::info!("Another scrape is already running, nothing to do");
            return Ok(ScrapeSummary::lock_held());
        };
        self.scrape_locked(run).await
    }

    /// Scrape body, entered with the lock already held.
    ///
    /// Split out so the `all` operation can hold both of its locks itself.
    pub(crate) async fn scrape_locked(&self, run: RunConfig) -> Result<ScrapeSummary> {
        let started = Instant::now();
        let cancel = self.shutdown.child_token();

        let mut rows = self.read_range(run.start_row, run.end_row).await?;
        if run.only_empty {
            rows.retain(|row| row.recorded_status.trim().is_empty());
        }

        tracing::info!(
            rows = rows.len(),
            start_row = run.start_row,
            end_row = run.end_row,
            only_empty = run.only_empty,
            batch_size = run.batch_size,
            max_concurrency = run.max_concurrency,
            "Scrape run starting"
        );

        let sink = UpdateSink {
            writer: Arc::clone(&self.sheet_writer),
            status_map: self.status_map.clone(),
        };
        let sessions = self.session_factory(run.fetch_timeout);
        let scheduler = BatchScheduler::new(run, sessions);
        let pass = scheduler.run(&rows, &sink, &cancel).await?;

        let mut succeeded = 0;
        let mut empty = 0;
        let mut failed = 0;
        for scraped in &pass.rows {
            match &scraped.outcome {
                FetchOutcome::Status(_) => succeeded += 1,
                FetchOutcome::Empty => empty += 1,
                FetchOutcome::Failed(_) => failed += 1,
            }
        }

        let summary = ScrapeSummary {
            outcome: if pass.aborted {
                RunOutcome::Aborted
            } else {
                RunOutcome::Completed
            },
            rows_selected: rows.len(),
            short_circuited: pass.short_circuited,
            succeeded,
            empty,
            failed,
            batches: pass.batches,
            second_pass_recovered: pass.second_pass_recovered,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            outcome = ?summary.outcome,
            rows = summary.rows_selected,
            ok = summary.succeeded,
            empty = summary.empty,
            failed = summary.failed,
            short_circuited = summary.short_circuited,
            recovered = summary.second_pass_recovered,
            batches = summary.batches,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Scrape run finished"
        );
        Ok(summary)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::browser::scripted::ScriptedFactory;
    use crate::config::ScrapeOptions;
    use crate::lock::RunLock;
    use crate::runner::test_support::{delivered_factory, engine, temp_config, tracked_rows};
    use crate::sheet::MemorySheet;
    use crate::status_map::CanonicalStatus;
    use crate::types::{FetchOutcome, Row, RunOutcome};

    #[tokio::test]
    async fn scrape_persists_canonical_statuses_with_alert_flags() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![
            Row::new(2, "2400000001", "EN TRANSITO"),
            Row::new(3, "2400000002", ""),
        ]));
        let factory = Arc::new(
            ScriptedFactory::new(FetchOutcome::Status("Tu envío está en camino".into())).script(
                "2400000001",
                vec![FetchOutcome::Status("Entregado al destinatario".into())],
            ),
        );
        let sync = engine(config, sheet.clone(), factory);

        let summary = sync.scrape(ScrapeOptions::default()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.rows_selected, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.batches, 1);

        let updates = sheet.updates().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].canonical, CanonicalStatus::Entregado);
        assert!(
            updates[0].alert,
            "EN TRANSITO moving to ENTREGADO must raise the alert"
        );
        assert_eq!(updates[1].canonical, CanonicalStatus::EnTransito);
        assert!(!updates[1].alert, "blank recorded status never alerts");

        let rows = sheet.rows().await;
        assert_eq!(rows[0].scraped_status.as_deref(), Some("ENTREGADO"));
        assert_eq!(rows[1].scraped_status.as_deref(), Some("EN_TRANSITO"));
    }

    #[tokio::test]
    async fn only_empty_skips_rows_with_a_recorded_status() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![
            Row::new(2, "2400000001", "ENTREGADO"),
            Row::new(3, "2400000002", ""),
            Row::new(4, "2400000003", "  "),
        ]));
        let factory = delivered_factory();
        let sync = engine(config, sheet.clone(), factory.clone());

        let summary = sync
            .scrape(ScrapeOptions {
                only_empty: Some(true),
                ..ScrapeOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.rows_selected, 2, "blank-ish statuses count as empty");
        assert_eq!(factory.fetches(), 2);
        let touched: Vec<u32> = sheet
            .updates()
            .await
            .iter()
            .map(|update| update.row_index.get())
            .collect();
        assert_eq!(touched, vec![3, 4]);
    }

    #[tokio::test]
    async fn held_lock_short_circuits_the_run() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(tracked_rows(3)));
        let factory = delivered_factory();
        let sync = engine(config.clone(), sheet.clone(), factory.clone());

        let _held = RunLock::try_acquire(&config.runtime.lock_dir, "scrape")
            .unwrap()
            .unwrap();
        let summary = sync.scrape(ScrapeOptions::default()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::LockHeld);
        assert_eq!(summary.rows_selected, 0);
        assert_eq!(factory.opens(), 0, "a held lock must not launch a browser");
        assert!(sheet.updates().await.is_empty());
    }

    #[tokio::test]
    async fn lock_is_released_when_the_run_finishes() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(tracked_rows(1)));
        let sync = engine(config, sheet, delivered_factory());

        let first = sync.scrape(ScrapeOptions::default()).await.unwrap();
        assert_eq!(first.outcome, RunOutcome::Completed);

        let second = sync.scrape(ScrapeOptions::default()).await.unwrap();
        assert_eq!(second.outcome, RunOutcome::Completed, "lock must be free again");
    }

    #[tokio::test]
    async fn cancelled_shutdown_token_aborts_before_any_batch() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(tracked_rows(3)));
        let factory = delivered_factory();
        let sync = engine(config, sheet.clone(), factory.clone());

        sync.shutdown_token().cancel();
        let summary = sync.scrape(ScrapeOptions::default()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Aborted);
        assert_eq!(summary.rows_selected, 3);
        assert_eq!(summary.rows_processed(), 0);
        assert_eq!(summary.batches, 0);
        assert_eq!(factory.opens(), 0);
        assert!(sheet.updates().await.is_empty());
    }

    #[tokio::test]
    async fn empty_selection_completes_with_zero_batches() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![Row::new(2, "", ""), Row::new(3, "", "")]));
        let factory = delivered_factory();
        let sync = engine(config, sheet, factory.clone());

        let summary = sync.scrape(ScrapeOptions::default()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.rows_selected, 0);
        assert_eq!(summary.batches, 0);
        assert_eq!(factory.opens(), 0);
    }

    #[tokio::test]
    async fn empty_and_failed_rows_produce_no_updates() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![
            Row::new(2, "2400000001", ""),
            Row::new(3, "2400000002", ""),
            Row::new(4, "2400000003", ""),
        ]));
        let factory = Arc::new(
            ScriptedFactory::new(FetchOutcome::Status("Entregado".into()))
                .script("2400000001", vec![FetchOutcome::Empty, FetchOutcome::Empty])
                .script(
                    "2400000002",
                    vec![
                        FetchOutcome::Failed(crate::error::FetchError::Timeout),
                        FetchOutcome::Failed(crate::error::FetchError::Timeout),
                    ],
                ),
        );
        let sync = engine(config, sheet.clone(), factory);

        let summary = sync.scrape(ScrapeOptions::default()).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.rows_processed(), summary.rows_selected);

        let updates = sheet.updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].row_index, 4u32);
    }

    #[tokio::test]
    async fn malformed_tracking_numbers_short_circuit() {
        let (_dir, mut config) = temp_config();
        config.carrier.tracking_pattern = Some(r"^\d{10}$".to_string());
        let sheet = Arc::new(MemorySheet::new(vec![
            Row::new(2, "2400000001", ""),
            Row::new(3, "OLD-FORMAT", ""),
        ]));
        let factory = delivered_factory();
        let sync = engine(config, sheet, factory.clone());

        let summary = sync.scrape(ScrapeOptions::default()).await.unwrap();

        assert_eq!(summary.short_circuited, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.empty, 1);
        assert_eq!(factory.fetches(), 1, "the malformed row must not be fetched");
    }

    #[tokio::test]
    async fn second_sweep_recoveries_reach_the_summary() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(tracked_rows(1)));
        let factory = Arc::new(ScriptedFactory::new(FetchOutcome::Empty).script(
            "240000000000",
            vec![
                FetchOutcome::Empty,
                FetchOutcome::Status("En agencia".into()),
            ],
        ));
        let sync = engine(config, sheet.clone(), factory);

        let summary = sync.scrape(ScrapeOptions::default()).await.unwrap();

        assert_eq!(summary.second_pass_recovered, 1);
        assert_eq!(summary.succeeded, 1);
        let rows = sheet.rows().await;
        assert_eq!(rows[0].scraped_status.as_deref(), Some("EN_AGENCIA"));
    }
}

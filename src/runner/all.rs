//! The combined operation: scrape, then report, as one invocation.

use crate::config::AllOptions;
use crate::error::Result;
use crate::lock::RunLock;
use crate::types::{AllSummary, ScrapeSummary};

use super::ParcelSync;

impl ParcelSync {
    /// Run scrape, then report, under one pair of locks.
    ///
    /// Both run shapes are resolved and both locks taken before the first
    /// leg, so the pair either runs as a unit or not at all. The report leg
    /// re-reads the sheet and therefore classifies exactly the statuses the
    /// scrape leg just persisted. A scrape cut short by shutdown keeps its
    /// persisted batches but skips the report leg; reporting on a half-fresh
    /// sheet would blur which mismatches are real.
    ///
    /// # Errors
    ///
    /// Fails for the same reasons as [`ParcelSync::scrape`] and
    /// [`ParcelSync::report`].
    pub async fn run_all(&self, options: AllOptions) -> Result<AllSummary> {
        let scrape_run = self.config.scrape_run(&options.scrape)?;
        let report_run = self.config.report_run(&options.report)?;

        let lock_dir = &self.config.runtime.lock_dir;
        let Some(_scrape_lock) = RunLock::try_acquire(lock_dir, "scrape")? else {
            tracing::info!("Another scrape is already running, nothing to do");
            return Ok(AllSummary {
                scrape: ScrapeSummary::lock_held(),
                report: None,
            });
        };
        let Some(_report_lock) = RunLock::try_acquire(lock_dir, "report")? else {
            tracing::info!("Another report is already running, nothing to do");
            return Ok(AllSummary {
                scrape: ScrapeSummary::lock_held(),
                report: None,
            });
        };

        let scrape = self.scrape_locked(scrape_run).await?;
        if !scrape.outcome.is_completed() {
            tracing::info!("Scrape leg did not complete, skipping the report leg");
            return Ok(AllSummary {
                scrape,
                report: None,
            });
        }

        let report = self.report_locked(report_run).await?;
        Ok(AllSummary {
            scrape,
            report: Some(report),
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::browser::scripted::ScriptedFactory;
    use crate::config::AllOptions;
    use crate::lock::RunLock;
    use crate::runner::test_support::{delivered_factory, engine, temp_config};
    use crate::sheet::MemorySheet;
    use crate::types::{FetchOutcome, Row, RunOutcome};

    #[tokio::test]
    async fn report_leg_sees_the_freshly_scraped_statuses() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![
            Row::new(2, "G1", "EN TRANSITO"),
            Row::new(3, "G2", "ENTREGADO"),
        ]));
        let factory = Arc::new(
            ScriptedFactory::new(FetchOutcome::Status("Entregado".into())).script(
                "G1",
                vec![FetchOutcome::Status("Entregado al destinatario".into())],
            ),
        );
        let sync = engine(config, sheet, factory);

        let all = sync.run_all(AllOptions::default()).await.unwrap();

        assert_eq!(all.scrape.outcome, RunOutcome::Completed);
        assert_eq!(all.scrape.succeeded, 2);

        let report = all.report.unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        // G1: recorded EN TRANSITO vs freshly scraped ENTREGADO. G2 matches.
        assert_eq!(report.mismatches, 1);
        assert_eq!(report.records_written, 1);

        let artifact = report.artifact.unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&artifact).unwrap()).unwrap();
        assert_eq!(doc["records"][0]["tracking_number"], "G1");
        assert_eq!(doc["records"][0]["scraped"], "ENTREGADO");
    }

    #[tokio::test]
    async fn held_scrape_lock_stops_both_legs() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![Row::new(2, "G1", "")]));
        let factory = delivered_factory();
        let sync = engine(config.clone(), sheet, factory.clone());

        let _held = RunLock::try_acquire(&config.runtime.lock_dir, "scrape")
            .unwrap()
            .unwrap();
        let all = sync.run_all(AllOptions::default()).await.unwrap();

        assert_eq!(all.scrape.outcome, RunOutcome::LockHeld);
        assert!(all.report.is_none());
        assert_eq!(factory.opens(), 0);
    }

    #[tokio::test]
    async fn held_report_lock_stops_both_legs() {
        let (_dir, config) = temp_config();
        let report_dir = config.runtime.report_dir.clone();
        let sheet = Arc::new(MemorySheet::new(vec![Row::new(2, "G1", "")]));
        let factory = delivered_factory();
        let sync = engine(config.clone(), sheet.clone(), factory.clone());

        let _held = RunLock::try_acquire(&config.runtime.lock_dir, "report")
            .unwrap()
            .unwrap();
        let all = sync.run_all(AllOptions::default()).await.unwrap();

        assert_eq!(all.scrape.outcome, RunOutcome::LockHeld);
        assert!(all.report.is_none());
        assert_eq!(factory.opens(), 0, "the scrape leg must not run either");
        assert!(sheet.updates().await.is_empty());
        assert!(!report_dir.exists());
    }

    #[tokio::test]
    async fn aborted_scrape_skips_the_report_leg() {
        let (_dir, config) = temp_config();
        let report_dir = config.runtime.report_dir.clone();
        let sheet = Arc::new(MemorySheet::new(vec![Row::new(2, "G1", "")]));
        let sync = engine(config, sheet, delivered_factory());

        sync.shutdown_token().cancel();
        let all = sync.run_all(AllOptions::default()).await.unwrap();

        assert_eq!(all.scrape.outcome, RunOutcome::Aborted);
        assert!(all.report.is_none());
        assert!(!report_dir.exists(), "no artifact may be written");
    }

    #[tokio::test]
    async fn locks_are_free_again_after_a_full_run() {
        let (_dir, config) = temp_config();
        let sheet = Arc::new(MemorySheet::new(vec![Row::new(2, "G1", "")]));
        let sync = engine(config.clone(), sheet, delivered_factory());

        sync.run_all(AllOptions::default()).await.unwrap();

        let scrape = RunLock::try_acquire(&config.runtime.lock_dir, "scrape").unwrap();
        let report = RunLock::try_acquire(&config.runtime.lock_dir, "report").unwrap();
        assert!(scrape.is_some());
        assert!(report.is_some());
    }
}

//! Shared fixtures for the operation tests.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::browser::scripted::ScriptedFactory;
use crate::config::Config;
use crate::sheet::MemorySheet;
use crate::types::{FetchOutcome, Row};

use super::ParcelSync;

/// Config with lock and report directories inside a fresh temp dir and all
/// pacing turned off. The directory guard must outlive the test.
pub(crate) fn temp_config() -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.runtime.lock_dir = dir.path().join("locks");
    config.runtime.report_dir = dir.path().join("reports");
    config.scrape.requests_per_second = 0.0;
    config.scrape.retries = 0;
    config.scrape.sleep_between_batches = Duration::ZERO;
    (dir, config)
}

/// Engine over a shared in-memory sheet and a scripted browser.
pub(crate) fn engine(
    config: Config,
    sheet: Arc<MemorySheet>,
    factory: Arc<ScriptedFactory>,
) -> ParcelSync {
    ParcelSync::new(config, sheet.clone(), sheet)
        .unwrap()
        .with_session_factory(factory)
}

/// Factory answering every lookup with a delivered status.
pub(crate) fn delivered_factory() -> Arc<ScriptedFactory> {
    Arc::new(ScriptedFactory::new(FetchOutcome::Status(
        "Entregado".into(),
    )))
}

/// `n` rows with tracking numbers and blank recorded statuses, from row 2.
pub(crate) fn tracked_rows(n: u32) -> Vec<Row> {
    (0..n)
        .map(|i| Row::new(2 + i, format!("24000000{i:04}"), ""))
        .collect()
}

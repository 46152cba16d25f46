//! Sheet rows and configuration shared by the integration tests

use std::path::Path;
use std::time::Duration;

use parcel_sync::Config;
use parcel_sync::types::Row;

/// Config with lock and report directories under `root` and all pacing
/// turned off, so tests run fast and never collide on shared directories.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.runtime.lock_dir = root.join("locks");
    config.runtime.report_dir = root.join("reports");
    config.scrape.requests_per_second = 0.0;
    config.scrape.retries = 0;
    config.scrape.sleep_between_batches = Duration::ZERO;
    config
}

/// `n` consecutive rows with tracking numbers and blank recorded statuses,
/// starting at sheet row 2 (row 1 is the header).
pub fn tracked_rows(n: u32) -> Vec<Row> {
    (0..n)
        .map(|i| Row::new(2 + i, format!("24000000{i:04}"), ""))
        .collect()
}

/// A single row with the given index, tracking number, and both status
/// columns filled in.
pub fn row_with_statuses(index: u32, tracking: &str, recorded: &str, scraped: &str) -> Row {
    Row::new(index, tracking, recorded).with_scraped(scraped)
}

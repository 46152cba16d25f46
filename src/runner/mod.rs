//! Operation entry points built on the engine's building blocks.
//!
//! The [`ParcelSync`] struct and its operations are organized by submodule:
//! - `scrape` - batched lookups with per-batch write-back
//! - `compare` - recorded-versus-scraped classification
//! - `report` - dated mismatch report artifacts
//! - `all` - the scrape-then-report combination
//!
//! Every operation resolves its run shape from configuration plus overrides,
//! then takes the single-instance lock named after it. A held lock is not an
//! error: the operation returns a summary whose outcome is
//! [`RunOutcome::LockHeld`](crate::types::RunOutcome::LockHeld) and touches
//! nothing.

mod all;
mod compare;
mod report;
mod scrape;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser::{ChromiumFactory, SessionFactory};
use crate::config::Config;
use crate::error::Result;
use crate::report::{JsonReportSink, ReportSink};
use crate::sheet::{SheetReader, SheetWriter};
use crate::status_map::StatusMap;
use crate::types::Row;

/// Main reconciliation engine (cloneable - collaborator handles are shared)
///
/// Owns the validated configuration and the seams the operations run through:
/// a sheet to read rows from and write results to, a report sink, and a
/// browser session factory. By default sessions come from a fresh
/// [`ChromiumFactory`] per run; tests and embedders can inject their own
/// factory instead.
#[derive(Clone)]
pub struct ParcelSync {
    /// Validated configuration
    pub(crate) config: Config,
    /// Compiled status vocabulary, extension files merged in
    pub(crate) status_map: StatusMap,
    /// Row source
    pub(crate) sheet_reader: Arc<dyn SheetReader>,
    /// Destination for scraped statuses and comparison results
    pub(crate) sheet_writer: Arc<dyn SheetWriter>,
    /// Destination for report artifacts
    pub(crate) report_sink: Arc<dyn ReportSink>,
    /// Session factory override; `None` launches Chromium per run
    pub(crate) sessions: Option<Arc<dyn SessionFactory>>,
    /// Root shutdown token; each run watches a child of it
    pub(crate) shutdown: CancellationToken,
}

impl ParcelSync {
    /// Create an engine over the given sheet backend.
    ///
    /// Validates the configuration, compiles the status vocabulary, and wires
    /// a [`JsonReportSink`] writing into the configured report directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::error::Error::Config) when the
    /// configuration or one of its status map extension files is invalid.
    pub fn new(
        config: Config,
        sheet_reader: Arc<dyn SheetReader>,
        sheet_writer: Arc<dyn SheetWriter>,
    ) -> Result<Self> {
        config.validate()?;
        let status_map = StatusMap::from_config(&config.status_map)?;
        let report_sink = Arc::new(JsonReportSink::new(config.runtime.report_dir.clone()));
        Ok(Self {
            config,
            status_map,
            sheet_reader,
            sheet_writer,
            report_sink,
            sessions: None,
            shutdown: CancellationToken::new(),
        })
    }

    /// Replace the report sink, for backends other than dated JSON files.
    #[must_use]
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = sink;
        self
    }

    /// Inject a session factory instead of launching Chromium.
    #[must_use]
    pub fn with_session_factory(mut self, sessions: Arc<dyn SessionFactory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that stops every running operation when cancelled.
    ///
    /// Cancellation is graceful: the in-flight batch finishes and is
    /// persisted, later batches are not started.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The session factory for one run: the injected override, or a Chromium
    /// launcher configured for the carrier.
    pub(crate) fn session_factory(&self, fetch_timeout: Duration) -> Arc<dyn SessionFactory> {
        match &self.sessions {
            Some(factory) => Arc::clone(factory),
            None => Arc::new(ChromiumFactory::new(
                self.config.carrier.clone(),
                fetch_timeout,
            )),
        }
    }

    /// Read the selected row range, sorted by index.
    ///
    /// With no explicit end row the range runs to the end of the sheet minus
    /// the trailing padding rows that carry no tracking number.
    pub(crate) async fn read_range(
        &self,
        start_row: u32,
        end_row: Option<u32>,
    ) -> Result<Vec<Row>> {
        let mut rows = self.sheet_reader.read_rows(start_row, end_row).await?;
        rows.sort_by_key(|row| row.index.get());
        if end_row.is_none() {
            trim_trailing_padding(&mut rows);
        }
        Ok(rows)
    }
}

/// Drop rows after the last one carrying a tracking number.
///
/// Sheets are usually padded with pre-formatted blank rows below the data; an
/// open-ended range must not process them.
fn trim_trailing_padding(rows: &mut Vec<Row>) {
    let keep = rows
        .iter()
        .rposition(Row::has_tracking)
        .map_or(0, |last| last + 1);
    rows.truncate(keep);
}

//! Core types for parcel-sync

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::status_map::CanonicalStatus;

/// 1-based sheet row index
///
/// Row 1 is conventionally the header row, so runs usually start at row 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowIndex(pub u32);

impl RowIndex {
    /// Create a new RowIndex
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the inner u32 value
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for RowIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl From<RowIndex> for u32 {
    fn from(index: RowIndex) -> Self {
        index.0
    }
}

impl PartialEq<u32> for RowIndex {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl PartialEq<RowIndex> for u32 {
    fn eq(&self, other: &RowIndex) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for RowIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RowIndex {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// One tracking record read from the sheet collaborator
///
/// The reader fills every field it has on hand, including the carrier status a
/// previous run persisted, so `compare` and `report` can work without fetching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Sheet row this record came from
    pub index: RowIndex,
    /// Carrier tracking number; blank for rows that have none assigned yet
    pub tracking_number: String,
    /// Status recorded by operators in the sheet; possibly blank
    pub recorded_status: String,
    /// Carrier status persisted by an earlier run, if any
    #[serde(default)]
    pub scraped_status: Option<String>,
}

impl Row {
    /// Create a row without a previously scraped status.
    pub fn new(
        index: impl Into<RowIndex>,
        tracking_number: impl Into<String>,
        recorded_status: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            tracking_number: tracking_number.into(),
            recorded_status: recorded_status.into(),
            scraped_status: None,
        }
    }

    /// Attach a previously scraped carrier status.
    pub fn with_scraped(mut self, scraped: impl Into<String>) -> Self {
        self.scraped_status = Some(scraped.into());
        self
    }

    /// Whether this row has a non-blank tracking number.
    pub fn has_tracking(&self) -> bool {
        !self.tracking_number.trim().is_empty()
    }
}

/// Outcome of one row's carrier lookup
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// Status text extracted from the carrier page
    Status(String),
    /// The page rendered but carried no status for this tracking number
    Empty,
    /// The lookup failed before a status could be read
    Failed(FetchError),
}

impl FetchOutcome {
    /// Whether the lookup produced a usable status.
    pub fn is_status(&self) -> bool {
        matches!(self, FetchOutcome::Status(_))
    }

    /// Whether another attempt may produce a better result.
    ///
    /// Empty pages and transient faults qualify; a definitive status and
    /// cancellation do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchOutcome::Status(_) => false,
            FetchOutcome::Empty => true,
            FetchOutcome::Failed(e) => e.is_transient(),
        }
    }

    /// Short tag for logging and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchOutcome::Status(_) => "status",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Failed(_) => "failed",
        }
    }
}

/// A row paired with the final outcome of its lookup in a run
#[derive(Clone, Debug, PartialEq)]
pub struct ScrapedRow {
    /// The row as it was read from the sheet
    pub row: Row,
    /// What the lookup produced for it
    pub outcome: FetchOutcome,
}

impl ScrapedRow {
    /// Pair a row with its lookup outcome.
    pub fn new(row: Row, outcome: FetchOutcome) -> Self {
        Self { row, outcome }
    }
}

/// One write the sheet collaborator receives after a successful lookup
///
/// The canonical code is what belongs in the sheet's carrier-status cell; the
/// raw text rides along for sheets that keep a raw column next to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Row the update targets
    pub row_index: RowIndex,
    /// Raw status text as scraped from the carrier page
    pub status: String,
    /// Canonical status code derived from the raw text
    pub canonical: CanonicalStatus,
    /// Raised when the canonical recorded and scraped codes disagree
    pub alert: bool,
}

/// Classification of one compared row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Recorded and scraped statuses agree under normalization
    Match,
    /// Both statuses present and they disagree
    Mismatch,
    /// A scraped status exists but the recorded cell is blank
    NewlyObserved,
    /// A recorded status exists but no scraped status was obtained
    Unconfirmed,
}

impl MatchKind {
    /// Whether this row agreed across both columns.
    pub fn is_match(&self) -> bool {
        matches!(self, MatchKind::Match)
    }

    /// Stable lowercase label used in reports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Match => "match",
            MatchKind::Mismatch => "mismatch",
            MatchKind::NewlyObserved => "newly observed",
            MatchKind::Unconfirmed => "unconfirmed",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One compared row, as emitted by the reconciler and written into reports
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MismatchRecord {
    /// Row the comparison refers to
    pub row_index: RowIndex,
    /// Tracking number of the row
    pub tracking_number: String,
    /// Recorded status as read from the sheet, trimmed; empty for newly observed rows
    pub recorded: String,
    /// Scraped status, trimmed; `None` for unconfirmed rows
    pub scraped: Option<String>,
    /// How the two columns relate
    pub kind: MatchKind,
    /// When the comparison was made
    pub checked_at: DateTime<Utc>,
}

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every selected batch ran to completion
    Completed,
    /// Cancelled mid-run; batches persisted before the cancellation were kept
    Aborted,
    /// Another instance held this operation's lock; nothing ran
    LockHeld,
}

impl RunOutcome {
    /// Whether the run processed everything it selected.
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Accounting for one scrape run
#[derive(Clone, Debug)]
pub struct ScrapeSummary {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Rows selected after range resolution and the only-empty filter
    pub rows_selected: usize,
    /// Rows resolved without a lookup because the tracking number was blank or malformed
    pub short_circuited: usize,
    /// Rows that came back with a status text
    pub succeeded: usize,
    /// Rows that stayed empty through retries and the second sweep, short-circuited rows included
    pub empty: usize,
    /// Rows whose last attempt failed
    pub failed: usize,
    /// Batches handed to the sheet writer
    pub batches: usize,
    /// Rows the in-batch second sweep recovered to a status
    pub second_pass_recovered: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl ScrapeSummary {
    /// Summary for a run that never started because another instance held the lock.
    pub(crate) fn lock_held() -> Self {
        Self {
            outcome: RunOutcome::LockHeld,
            rows_selected: 0,
            short_circuited: 0,
            succeeded: 0,
            empty: 0,
            failed: 0,
            batches: 0,
            second_pass_recovered: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Rows that reached a terminal outcome. Equals `rows_selected` unless the
    /// run was aborted.
    pub fn rows_processed(&self) -> usize {
        self.succeeded + self.empty + self.failed
    }
}

/// Accounting for one compare run
#[derive(Clone, Debug)]
pub struct CompareSummary {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Rows with a tracking number that were classified
    pub rows_compared: usize,
    /// Rows whose recorded and scraped statuses agree
    pub matches: usize,
    /// Rows whose statuses disagree
    pub mismatches: usize,
    /// Rows with a scraped status but no recorded one
    pub newly_observed: usize,
    /// Rows with a recorded status but no scraped one
    pub unconfirmed: usize,
    /// Emitted records in row order; honors the only-mismatches filter
    pub records: Vec<MismatchRecord>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl CompareSummary {
    pub(crate) fn lock_held() -> Self {
        Self {
            outcome: RunOutcome::LockHeld,
            rows_compared: 0,
            matches: 0,
            mismatches: 0,
            newly_observed: 0,
            unconfirmed: 0,
            records: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Accounting for one report run
#[derive(Clone, Debug)]
pub struct ReportSummary {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Rows with a tracking number that were classified
    pub rows_compared: usize,
    /// Records written into the artifact
    pub records_written: usize,
    /// Rows whose statuses disagree
    pub mismatches: usize,
    /// Rows with a scraped status but no recorded one
    pub newly_observed: usize,
    /// Rows with a recorded status but no scraped one
    pub unconfirmed: usize,
    /// Path of the written artifact; `None` when nothing ran
    pub artifact: Option<String>,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl ReportSummary {
    pub(crate) fn lock_held() -> Self {
        Self {
            outcome: RunOutcome::LockHeld,
            rows_compared: 0,
            records_written: 0,
            mismatches: 0,
            newly_observed: 0,
            unconfirmed: 0,
            artifact: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// Combined accounting for the scrape-then-report operation
#[derive(Clone, Debug)]
pub struct AllSummary {
    /// The scrape leg
    pub scrape: ScrapeSummary,
    /// The report leg; `None` when it did not run because a lock was held or
    /// the scrape leg was aborted
    pub report: Option<ReportSummary>,
}

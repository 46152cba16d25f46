//! Reconciliation of recorded statuses against freshly scraped ones
//!
//! Comparison is lexical: both sides are trimmed and case-folded before the
//! equality check, so `"Entregado"` and `" entregado "` agree. Rows missing
//! one side are still classified rather than dropped: a scrape with no
//! recorded counterpart is newly observed, and a recorded status the carrier
//! did not confirm this run is unconfirmed.

use chrono::Utc;
use serde::Serialize;

use crate::status_map::normalize;
use crate::types::{MatchKind, MismatchRecord, Row};

/// Classify one row's recorded/scraped status pair
///
/// Blank strings count as absent on either side.
///
/// # Examples
///
/// ```
/// use parcel_sync::reconcile::classify;
/// use parcel_sync::types::MatchKind;
///
/// assert_eq!(classify("Entregado", Some(" entregado ")), MatchKind::Match);
/// assert_eq!(classify("Entregado", Some("En tránsito")), MatchKind::Mismatch);
/// assert_eq!(classify("", Some("EN AGENCIA")), MatchKind::NewlyObserved);
/// assert_eq!(classify("Entregado", None), MatchKind::Unconfirmed);
/// ```
#[must_use]
pub fn classify(recorded: &str, scraped: Option<&str>) -> MatchKind {
    let scraped_norm = scraped.map(normalize).unwrap_or_default();
    if scraped_norm.is_empty() {
        return MatchKind::Unconfirmed;
    }

    let recorded_norm = normalize(recorded);
    if recorded_norm.is_empty() {
        MatchKind::NewlyObserved
    } else if recorded_norm == scraped_norm {
        MatchKind::Match
    } else {
        MatchKind::Mismatch
    }
}

/// Outcome of one comparison pass
///
/// Counts cover every compared row; `records` honors the `only_mismatches`
/// filter, so with the filter on it holds only the disagreeing rows while the
/// counts still describe the whole range.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Comparison {
    /// Emitted records, in row order
    pub records: Vec<MismatchRecord>,
    /// Rows that carried a tracking number and were classified
    pub rows_compared: usize,
    /// Rows where both sides agree
    pub matches: usize,
    /// Rows where both sides disagree
    pub mismatches: usize,
    /// Rows with a scrape but no recorded status
    pub newly_observed: usize,
    /// Rows the carrier did not confirm this run
    pub unconfirmed: usize,
}

/// Compares recorded statuses against scraped ones row by row
pub struct Reconciler {
    only_mismatches: bool,
}

impl Reconciler {
    /// Create a reconciler; with `only_mismatches` set, matching rows count
    /// but produce no record.
    #[must_use]
    pub fn new(only_mismatches: bool) -> Self {
        Self { only_mismatches }
    }

    /// Compare every row carrying a tracking number.
    ///
    /// Rows with a blank tracking number are padding and are skipped. All
    /// emitted records share one timestamp taken at the start of the pass.
    pub fn compare(&self, rows: &[Row]) -> Comparison {
        let checked_at = Utc::now();
        let mut comparison = Comparison::default();

        for row in rows {
            if !row.has_tracking() {
                continue;
            }

            let kind = classify(&row.recorded_status, row.scraped_status.as_deref());
            comparison.rows_compared += 1;
            match kind {
                MatchKind::Match => comparison.matches += 1,
                MatchKind::Mismatch => comparison.mismatches += 1,
                MatchKind::NewlyObserved => comparison.newly_observed += 1,
                MatchKind::Unconfirmed => comparison.unconfirmed += 1,
            }

            if self.only_mismatches && kind.is_match() {
                continue;
            }

            comparison.records.push(MismatchRecord {
                row_index: row.index,
                tracking_number: row.tracking_number.clone(),
                recorded: row.recorded_status.trim().to_string(),
                scraped: row
                    .scraped_status
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                kind,
                checked_at,
            });
        }

        tracing::debug!(
            rows = comparison.rows_compared,
            matches = comparison.matches,
            mismatches = comparison.mismatches,
            newly_observed = comparison.newly_observed,
            unconfirmed = comparison.unconfirmed,
            "Comparison pass finished"
        );

        comparison
    }
}

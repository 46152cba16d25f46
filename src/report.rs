//! Mismatch report artifacts
//!
//! Reports leave the engine through the [`ReportSink`] seam so storage stays
//! swappable. The shipped [`JsonReportSink`] writes one dated JSON document
//! per run into a configured directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::{MatchKind, MismatchRecord};

/// Destination for comparison records
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist one report and return the artifact's name.
    ///
    /// A run that produced zero records still writes an artifact: an empty
    /// report documents that the comparison ran and found nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be written.
    async fn write(
        &self,
        generated_at: DateTime<Utc>,
        prefix: &str,
        records: &[MismatchRecord],
    ) -> Result<String>;
}

/// Shape of the document [`JsonReportSink`] writes
#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: DateTime<Utc>,
    total_records: usize,
    matches: usize,
    mismatches: usize,
    newly_observed: usize,
    unconfirmed: usize,
    records: &'a [MismatchRecord],
}

/// Writes reports as pretty-printed JSON files
///
/// The artifact is named `<prefix><YYYY-MM-DD>.json` from the report's
/// timestamp; the prefix carries its own separator. A second run on the same
/// day overwrites the first, keeping one report per day per prefix.
pub struct JsonReportSink {
    dir: PathBuf,
}

impl JsonReportSink {
    /// Create a sink writing into `dir`; the directory is created on first
    /// write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn write(
        &self,
        generated_at: DateTime<Utc>,
        prefix: &str,
        records: &[MismatchRecord],
    ) -> Result<String> {
        let name = format!("{prefix}{}.json", generated_at.format("%Y-%m-%d"));
        let path = self.dir.join(&name);

        let mut document = ReportDocument {
            generated_at,
            total_records: records.len(),
            matches: 0,
            mismatches: 0,
            newly_observed: 0,
            unconfirmed: 0,
            records,
        };
        for record in records {
            match record.kind {
                MatchKind::Match => document.matches += 1,
                MatchKind::Mismatch => document.mismatches += 1,
                MatchKind::NewlyObserved => document.newly_observed += 1,
                MatchKind::Unconfirmed => document.unconfirmed += 1,
            }
        }

        let body = serde_json::to_vec_pretty(&document)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::Report(format!(
                "failed to create report directory {}: {e}",
                self.dir.display()
            ))
        })?;
        tokio::fs::write(&path, body).await.map_err(|e| {
            Error::Report(format!("failed to write report {}: {e}", path.display()))
        })?;

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            "Report written"
        );

        Ok(path.display().to_string())
    }
}

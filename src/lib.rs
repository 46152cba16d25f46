//! # parcel-sync
//!
//! Backend library for reconciling a parcel tracking sheet against the
//! carrier's public lookup page.
//!
//! ## Design Philosophy
//!
//! parcel-sync is designed to be:
//! - **Backend-agnostic** - rows come and go through traits, no spreadsheet
//!   SDK baked in
//! - **Polite by construction** - one request ceiling paces every worker, and
//!   browser sessions are recycled at batch boundaries
//! - **Crash-friendly** - every batch is persisted as soon as it finishes, so
//!   an abort keeps the work already done
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use parcel_sync::{Config, MemorySheet, ParcelSync, ScrapeOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!
//!     // Any keyed-by-row store can sit behind the engine; the in-memory
//!     // sheet is handy for trials.
//!     let sheet = Arc::new(MemorySheet::new(vec![]));
//!     let sync = ParcelSync::new(config, sheet.clone(), sheet)?;
//!
//!     let summary = sync.scrape(ScrapeOptions::default()).await?;
//!     println!(
//!         "{} of {} rows answered",
//!         summary.succeeded, summary.rows_selected
//!     );
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Browser automation behind a narrow session contract
pub mod browser;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Single-instance run locks
pub mod lock;
/// Global request pacing shared by all workers
pub mod rate_limiter;
/// Recorded-versus-scraped status classification
pub mod reconcile;
/// Mismatch report artifacts
pub mod report;
/// Retry logic for lookups that come back without a status
pub mod retry;
/// Operation entry points (scrape, compare, report, all)
pub mod runner;
/// Batch-by-batch scrape engine
pub mod scraper;
/// Sheet collaborator contracts
pub mod sheet;
/// Canonical status vocabulary and normalization
pub mod status_map;
/// Core types
pub mod types;

// Re-export commonly used types
pub use browser::{ChromiumFactory, SessionFactory, StatusSession};
pub use config::{
    AllOptions, CarrierConfig, CompareOptions, Config, ReportOptions, ResourceClass,
    ScrapeOptions,
};
pub use error::{Error, FetchError, Result};
pub use report::{JsonReportSink, ReportSink};
pub use runner::ParcelSync;
pub use sheet::{MemorySheet, SheetReader, SheetWriter};
pub use status_map::{CanonicalStatus, StatusMap};
pub use types::{
    AllSummary, CompareSummary, FetchOutcome, MatchKind, MismatchRecord, ReportSummary, Row,
    RowIndex, RunOutcome, ScrapeSummary, ScrapedRow, StatusUpdate,
};

/// Helper function to stop running operations on a termination signal.
///
/// Waits for a termination signal and then cancels `token`; every operation
/// watching it finishes its in-flight batch, persists it, and stops.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use parcel_sync::{cancel_on_signal, Config, MemorySheet, ParcelSync, ScrapeOptions};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let sheet = Arc::new(MemorySheet::new(vec![]));
///     let sync = ParcelSync::new(Config::default(), sheet.clone(), sheet)?;
///
///     // Let SIGTERM/SIGINT stop the run after the in-flight batch
///     tokio::spawn(cancel_on_signal(sync.shutdown_token()));
///
///     sync.scrape(ScrapeOptions::default()).await?;
///     Ok(())
/// }
/// ```
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    token.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

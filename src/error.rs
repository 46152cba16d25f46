//! Error types for parcel-sync
//!
//! Two layers of failure live here:
//! - [`Error`] is the crate-level error returned by operations and collaborator
//!   seams. Anything that surfaces as an `Err` aborts the operation that raised it.
//! - [`FetchError`] describes a single failed carrier lookup. It never propagates
//!   as an `Err`; it rides inside `FetchOutcome::Failed` so one bad row cannot
//!   abort a batch.

use thiserror::Error;

/// Result type alias for parcel-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for parcel-sync
///
/// Each variant includes enough context to diagnose the failure without digging
/// through logs. Collaborator implementations (sheet, report) should wrap their
/// transport failures in [`Error::Sheet`] / [`Error::Report`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "scrape.batch_size")
        key: Option<String>,
    },

    /// Browser launch or protocol fault outside the scope of a single lookup
    #[error("browser error: {0}")]
    Browser(String),

    /// Sheet collaborator failure (read or write)
    #[error("sheet error: {0}")]
    Sheet(String),

    /// Report sink failure
    #[error("report error: {0}")]
    Report(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error attributed to a specific key.
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Failure of one carrier lookup, carried inside `FetchOutcome::Failed`.
///
/// Lookups fail routinely against a flaky remote site, so these are data, not
/// `Err`s: the worker pool records them per row and the batch keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The page did not settle within the configured fetch deadline
    #[error("carrier page timed out")]
    Timeout,

    /// Network, DNS, or browser protocol fault while driving the page
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The run was cancelled while the lookup was in flight
    #[error("lookup cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether a prompt re-fetch has a reasonable chance of succeeding.
    ///
    /// Timeouts and navigation faults come and go with the remote site;
    /// cancellation is an instruction to stop, never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Navigation(_))
    }
}

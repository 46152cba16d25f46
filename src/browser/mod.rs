//! Browser automation behind a narrow session contract
//!
//! The engine treats the browser as an opaque capability: open a session,
//! ask it for the status of one tracking number, close it. [`ChromiumFactory`]
//! is the real implementation; tests substitute scripted sessions.

pub mod chromium;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ResourceClass;
use crate::error::Result;
use crate::types::FetchOutcome;

pub use chromium::ChromiumFactory;

/// One live browser-context lifecycle
///
/// A session serves many lookups, sequential or concurrent, within one
/// batch. It is torn down and replaced at batch boundaries to bound memory
/// growth from long-lived browser state.
#[async_trait]
pub trait StatusSession: Send + Sync {
    /// Look up the carrier status for one tracking number.
    ///
    /// Never fails outright: timeouts and navigation faults come back as
    /// failed outcomes so one bad row cannot sink its batch.
    async fn fetch_status(&self, tracking: &str) -> FetchOutcome;

    /// Tear the session down, releasing the underlying browser.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser refuses to shut down cleanly.
    async fn close(&self) -> Result<()>;
}

/// Opens a fresh [`StatusSession`] at each batch boundary
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser cannot be launched.
    async fn open(&self) -> Result<Arc<dyn StatusSession>>;
}

/// Expand a lookup URL template for one tracking number.
///
/// The tracking number is percent-encoded before substitution.
///
/// # Examples
///
/// ```
/// use parcel_sync::browser::lookup_url;
///
/// let url = lookup_url("https://example.com/track?guia={tracking}", "240 01");
/// assert_eq!(url, "https://example.com/track?guia=240%2001");
/// ```
#[must_use]
pub fn lookup_url(template: &str, tracking: &str) -> String {
    template.replace("{tracking}", &urlencoding::encode(tracking))
}

/// URL patterns a session should abort for the given resource classes.
///
/// Patterns use the wildcard syntax browser network interception expects,
/// one per blocked file extension.
#[must_use]
pub fn blocked_url_patterns(classes: &[ResourceClass]) -> Vec<String> {
    let mut patterns = Vec::new();
    for class in classes {
        let extensions: &[&str] = match class {
            ResourceClass::Image => &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico"],
            ResourceClass::Media => &["mp4", "webm", "ogg", "mp3", "avi"],
            ResourceClass::Font => &["woff", "woff2", "ttf", "otf", "eot"],
            ResourceClass::Stylesheet => &["css"],
        };
        patterns.extend(extensions.iter().map(|ext| format!("*.{ext}")));
    }
    patterns
}

//! Chromium-backed status sessions
//!
//! Each session owns one headless Chromium process. Lookups open a fresh tab,
//! install resource blocks, navigate to the carrier's tracking page, and poll
//! the configured selectors until one yields text or the wait window closes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::CarrierConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::FetchOutcome;

use super::{SessionFactory, StatusSession, blocked_url_patterns, lookup_url};

/// How often the selectors are re-polled while waiting for the page to
/// render its status
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches one headless Chromium per session
pub struct ChromiumFactory {
    carrier: CarrierConfig,
    fetch_timeout: Duration,
}

impl ChromiumFactory {
    /// Create a factory for the given carrier, timing out each lookup after
    /// `fetch_timeout`.
    #[must_use]
    pub fn new(carrier: CarrierConfig, fetch_timeout: Duration) -> Self {
        Self {
            carrier,
            fetch_timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn open(&self) -> Result<Arc<dyn StatusSession>> {
        let config = BrowserConfig::builder()
            .new_headless_mode()
            .args(self.carrier.browser_args.clone())
            .build()
            .map_err(Error::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(format!("failed to launch browser: {e}")))?;

        // The handler stream must keep being polled for the session's whole
        // lifetime or every CDP call stalls
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::debug!("Browser session launched");

        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(browser),
            events,
            carrier: self.carrier.clone(),
            fetch_timeout: self.fetch_timeout,
        }))
    }
}

/// One live Chromium process serving concurrent lookups
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    events: JoinHandle<()>,
    carrier: CarrierConfig,
    fetch_timeout: Duration,
}

impl ChromiumSession {
    async fn lookup_on_page(&self, page: &Page, tracking: &str) -> FetchOutcome {
        if let Err(e) = page.execute(EnableParams::default()).await {
            return FetchOutcome::Failed(FetchError::Navigation(e.to_string()));
        }

        let patterns = blocked_url_patterns(&self.carrier.blocked_resources);
        if !patterns.is_empty()
            && let Err(e) = page.execute(SetBlockedUrLsParams::new(patterns)).await
        {
            tracing::debug!(tracking, error = %e, "Failed to install resource blocks");
        }

        let url = lookup_url(&self.carrier.lookup_url, tracking);
        if let Err(e) = page.goto(url.as_str()).await {
            return FetchOutcome::Failed(FetchError::Navigation(e.to_string()));
        }
        if let Err(e) = page.wait_for_navigation().await {
            return FetchOutcome::Failed(FetchError::Navigation(e.to_string()));
        }

        self.extract_status(page, tracking).await
    }

    /// Poll the configured selectors in order until one yields non-blank
    /// text or the wait window closes.
    async fn extract_status(&self, page: &Page, tracking: &str) -> FetchOutcome {
        let deadline = tokio::time::Instant::now() + self.carrier.selector_wait;

        loop {
            for selector in &self.carrier.status_selectors {
                let Ok(element) = page.find_element(selector.as_str()).await else {
                    // Not rendered yet; try the next selector
                    continue;
                };
                match element.inner_text().await {
                    Ok(Some(text)) => {
                        let text = text.trim();
                        if !text.is_empty() {
                            tracing::debug!(
                                tracking,
                                selector = %selector,
                                status = text,
                                "Status extracted"
                            );
                            return FetchOutcome::Status(text.to_string());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(
                            tracking,
                            selector = %selector,
                            error = %e,
                            "Failed to read element text"
                        );
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return FetchOutcome::Empty;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl StatusSession for ChromiumSession {
    async fn fetch_status(&self, tracking: &str) -> FetchOutcome {
        let page = {
            let browser = self.browser.lock().await;
            match browser.new_page("about:blank").await {
                Ok(page) => page,
                Err(e) => return FetchOutcome::Failed(FetchError::Navigation(e.to_string())),
            }
        };

        let outcome =
            match tokio::time::timeout(self.fetch_timeout, self.lookup_on_page(&page, tracking))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => FetchOutcome::Failed(FetchError::Timeout),
            };

        // Tabs accumulate fast at this volume; close before reporting
        if let Err(e) = page.close().await {
            tracing::debug!(tracking, error = %e, "Failed to close page");
        }

        outcome
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| Error::Browser(format!("failed to close browser: {e}")))?;
        let _ = browser.wait().await;
        self.events.abort();
        tracing::debug!("Browser session closed");
        Ok(())
    }
}

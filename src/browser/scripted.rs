//! Scripted session fakes shared by the engine's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{SessionFactory, StatusSession};
use crate::error::{Error, Result};
use crate::types::FetchOutcome;

/// Factory handing out sessions that replay a per-tracking outcome script.
///
/// Every session from one factory shares the script and the counters, so a
/// test can assert on fetch totals across batch recycling. Tracking numbers
/// without a script entry, or with an exhausted one, get the fallback.
pub(crate) struct ScriptedFactory {
    script: Arc<Mutex<HashMap<String, VecDeque<FetchOutcome>>>>,
    fallback: FetchOutcome,
    delay: Duration,
    fail_open: bool,
    opens: AtomicU32,
    fetches: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
    in_flight: Arc<AtomicU32>,
    peak_in_flight: Arc<AtomicU32>,
}

impl ScriptedFactory {
    pub(crate) fn new(fallback: FetchOutcome) -> Self {
        Self {
            script: Arc::new(Mutex::new(HashMap::new())),
            fallback,
            delay: Duration::ZERO,
            fail_open: false,
            opens: AtomicU32::new(0),
            fetches: Arc::new(AtomicU32::new(0)),
            closes: Arc::new(AtomicU32::new(0)),
            in_flight: Arc::new(AtomicU32::new(0)),
            peak_in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Make every lookup take `delay` before resolving.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue outcomes for one tracking number, consumed in order.
    pub(crate) fn script(self, tracking: &str, outcomes: Vec<FetchOutcome>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(tracking.to_string(), outcomes.into());
        self
    }

    /// Make `open` fail, for exercising launch-failure paths.
    pub(crate) fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub(crate) fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_in_flight(&self) -> u32 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self) -> Result<Arc<dyn StatusSession>> {
        if self.fail_open {
            return Err(Error::Browser("scripted launch failure".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSession {
            script: Arc::clone(&self.script),
            fallback: self.fallback.clone(),
            delay: self.delay,
            fetches: Arc::clone(&self.fetches),
            closes: Arc::clone(&self.closes),
            in_flight: Arc::clone(&self.in_flight),
            peak_in_flight: Arc::clone(&self.peak_in_flight),
        }))
    }
}

/// One session handed out by [`ScriptedFactory`].
pub(crate) struct ScriptedSession {
    script: Arc<Mutex<HashMap<String, VecDeque<FetchOutcome>>>>,
    fallback: FetchOutcome,
    delay: Duration,
    fetches: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
    in_flight: Arc<AtomicU32>,
    peak_in_flight: Arc<AtomicU32>,
}

#[async_trait]
impl StatusSession for ScriptedSession {
    async fn fetch_status(&self, tracking: &str) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(tracking)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

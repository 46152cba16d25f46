//! Scripted browser sessions for driving the engine without Chromium

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use parcel_sync::types::FetchOutcome;
use parcel_sync::{Result, SessionFactory, StatusSession};

#[derive(Default)]
struct Counters {
    opens: AtomicU32,
    fetches: AtomicU32,
    closes: AtomicU32,
}

/// Session factory answering lookups from a fixed per-tracking table.
///
/// Tracking numbers without an entry get the fallback outcome. The counters
/// record how often sessions were opened, fetched from, and closed, across
/// every session the factory produced.
pub struct StubFactory {
    fallback: FetchOutcome,
    table: Mutex<HashMap<String, FetchOutcome>>,
    counters: Arc<Counters>,
}

impl StubFactory {
    /// Factory whose sessions answer every unknown tracking number with
    /// `fallback`.
    pub fn new(fallback: FetchOutcome) -> Self {
        Self {
            fallback,
            table: Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Fix the outcome for one tracking number.
    pub fn answer(self, tracking: &str, outcome: FetchOutcome) -> Self {
        self.table
            .lock()
            .unwrap()
            .insert(tracking.to_string(), outcome);
        self
    }

    /// Sessions opened so far.
    pub fn opens(&self) -> u32 {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Lookups served so far, across all sessions.
    pub fn fetches(&self) -> u32 {
        self.counters.fetches.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn closes(&self) -> u32 {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for StubFactory {
    async fn open(&self) -> Result<Arc<dyn StatusSession>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubSession {
            fallback: self.fallback.clone(),
            table: self.table.lock().unwrap().clone(),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct StubSession {
    fallback: FetchOutcome,
    table: HashMap<String, FetchOutcome>,
    counters: Arc<Counters>,
}

#[async_trait]
impl StatusSession for StubSession {
    async fn fetch_status(&self, tracking: &str) -> FetchOutcome {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        self.table
            .get(tracking)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn close(&self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

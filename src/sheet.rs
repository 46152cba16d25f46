//! Sheet collaborator contracts and an in-memory backend
//!
//! The engine never talks to a spreadsheet product directly. It reads rows
//! through [`SheetReader`] and persists results through [`SheetWriter`], so
//! any keyed-by-row store can sit behind the run. [`MemorySheet`] implements
//! both and backs the integration tests.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::types::{MismatchRecord, Row, StatusUpdate};

/// Source of tracking rows
#[async_trait]
pub trait SheetReader: Send + Sync {
    /// Read rows in the inclusive 1-based range `start_row..=end_row`.
    ///
    /// `end_row` of `None` means to the end of the sheet; callers trim
    /// trailing padding themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be reached or the range
    /// cannot be materialized.
    async fn read_rows(&self, start_row: u32, end_row: Option<u32>) -> Result<Vec<Row>>;
}

/// Destination for scraped statuses and comparison results
#[async_trait]
pub trait SheetWriter: Send + Sync {
    /// Persist one batch of status updates.
    ///
    /// Updates arrive in row order, once per batch. A failure here aborts the
    /// run: losing the writes would silently discard scraped work.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the writes.
    async fn write_updates(&self, updates: &[StatusUpdate]) -> Result<()>;

    /// Persist classification results next to the rows they describe.
    ///
    /// Backends that keep a comparison column can override this; the default
    /// does nothing, which suits read-only comparison runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the writes.
    async fn write_comparison(&self, _records: &[MismatchRecord]) -> Result<()> {
        Ok(())
    }
}

/// In-memory sheet for tests and dry runs
///
/// Rows live behind a mutex; every write is also appended to a log so tests
/// can assert on exactly what the engine persisted and in what order.
///
/// # Examples
///
/// ```
/// use parcel_sync::sheet::{MemorySheet, SheetReader};
/// use parcel_sync::types::Row;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sheet = MemorySheet::new(vec![
///     Row::new(2, "240012345678", "EN TRANSITO"),
///     Row::new(3, "240012345679", ""),
/// ]);
///
/// let rows = sheet.read_rows(2, Some(2)).await?;
/// assert_eq!(rows.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemorySheet {
    rows: Mutex<Vec<Row>>,
    updates: Mutex<Vec<StatusUpdate>>,
    comparisons: Mutex<Vec<MismatchRecord>>,
}

impl MemorySheet {
    /// Create a sheet holding `rows`, kept sorted by row index.
    #[must_use]
    pub fn new(mut rows: Vec<Row>) -> Self {
        rows.sort_by_key(|row| row.index.get());
        Self {
            rows: Mutex::new(rows),
            updates: Mutex::new(Vec::new()),
            comparisons: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot the current rows.
    pub async fn rows(&self) -> Vec<Row> {
        self.rows.lock().await.clone()
    }

    /// Every update ever written, in arrival order.
    pub async fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().await.clone()
    }

    /// Every comparison record ever written, in arrival order.
    pub async fn comparisons(&self) -> Vec<MismatchRecord> {
        self.comparisons.lock().await.clone()
    }
}

#[async_trait]
impl SheetReader for MemorySheet {
    async fn read_rows(&self, start_row: u32, end_row: Option<u32>) -> Result<Vec<Row>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| {
                let index = row.index.get();
                index >= start_row && end_row.is_none_or(|end| index <= end)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SheetWriter for MemorySheet {
    async fn write_updates(&self, updates: &[StatusUpdate]) -> Result<()> {
        let mut rows = self.rows.lock().await;
        for update in updates {
            let row = rows
                .iter_mut()
                .find(|row| row.index == update.row_index)
                .ok_or_else(|| {
                    Error::Sheet(format!("row {} not present in sheet", update.row_index))
                })?;
            row.scraped_status = Some(update.canonical.as_str().to_string());
        }
        self.updates.lock().await.extend_from_slice(updates);
        Ok(())
    }

    async fn write_comparison(&self, records: &[MismatchRecord]) -> Result<()> {
        self.comparisons.lock().await.extend_from_slice(records);
        Ok(())
    }
}

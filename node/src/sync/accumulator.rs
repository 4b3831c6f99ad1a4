//! Hash-keyed row buffer flushed to the store in batches.

use crate::storage::{BlockRow, DeployRow, Store};
use eyre::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// A row that can be buffered and persisted in batches.
pub trait AccumulatedRow: Clone + Send + Sync + 'static {
    const LABEL: &'static str;

    fn key(&self) -> &str;

    fn persist(store: &dyn Store, rows: &[Self]) -> Result<()>;
}

impl AccumulatedRow for BlockRow {
    const LABEL: &'static str = "block";

    fn key(&self) -> &str {
        &self.hash
    }

    fn persist(store: &dyn Store, rows: &[Self]) -> Result<()> {
        store.upsert_blocks(rows)
    }
}

impl AccumulatedRow for DeployRow {
    const LABEL: &'static str = "deploy";

    fn key(&self) -> &str {
        &self.hash
    }

    fn persist(store: &dyn Store, rows: &[Self]) -> Result<()> {
        store.upsert_deploys(rows)
    }
}

/// Last-write-wins buffer keyed by row hash.
#[derive(Debug)]
pub struct RowAccumulator<T> {
    rows: Mutex<HashMap<String, T>>,
}

impl<T: AccumulatedRow> Default for RowAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: AccumulatedRow> RowAccumulator<T> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Buffers `row`, replacing any pending row with the same key.
    pub fn insert(&self, row: T) {
        self.rows.lock().insert(row.key().to_string(), row);
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<T> {
        self.rows.lock().get(key).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Swaps the buffer out, leaving it empty.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.rows.lock()).into_values().collect()
    }

    /// Upserts every buffered row in one batch and returns how many were written.
    ///
    /// On failure the taken rows go back into the buffer, except where a newer write for the
    /// same key arrived in the meantime.
    pub fn flush(&self, store: &dyn Store) -> Result<usize> {
        let rows = self.take();
        if rows.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        match T::persist(store, &rows) {
            Ok(()) => {
                debug!(
                    kind = T::LABEL,
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "flushed rows"
                );
                Ok(rows.len())
            }
            Err(err) => {
                let count = rows.len();
                let mut buffer = self.rows.lock();
                for row in rows {
                    buffer.entry(row.key().to_string()).or_insert(row);
                }
                Err(err.wrap_err(format!("failed to flush {count} {} rows", T::LABEL)))
            }
        }
    }
}

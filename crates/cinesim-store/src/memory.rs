//! In-memory movie table.

use std::collections::HashSet;
use std::sync::RwLock;

use cinesim_core::{RawRow, RowSource};

use crate::jsonl::{Result, StoreError, UpsertStats};
use crate::record::MovieRecord;

/// Movie table held in memory. Rows may carry any raw embedding, valid or not.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<RawRow>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `rows` as-is.
    pub fn with_rows(rows: Vec<RawRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Insert records, replacing existing rows with the same id.
    pub fn upsert(&self, records: &[MovieRecord]) -> Result<UpsertStats> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire write lock: {}", e)))?;

        // Repeated ids within the batch count once; the last one wins
        let mut seen = HashSet::new();
        let mut stats = UpsertStats::default();
        for record in records {
            let row = record.to_raw_row();
            let first_in_batch = seen.insert(record.id);
            match rows.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => {
                    *existing = row;
                    if first_in_batch {
                        stats.replaced += 1;
                    }
                }
                None => {
                    rows.push(row);
                    stats.inserted += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RowSource for MemoryStore {
    type Error = StoreError;

    fn fetch_rows(&mut self) -> Result<Vec<RawRow>> {
        let rows = self
            .rows
            .read()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire read lock: {}", e)))?;
        Ok(rows.clone())
    }
}

//! Movie table persisted as a JSON-lines file.
//!
//! One row per line. The file is opened for the duration of a single read or
//! upsert and closed again; nothing holds it open between calls. Upserts
//! rewrite the file through a temporary sibling and a rename, so readers see
//! either the old table or the new one.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use cinesim_core::{RawRow, RowSource};
use tracing::{debug, info, warn};

use crate::record::{MovieRecord, RowId};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of an upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertStats {
    /// Records whose id was not in the table.
    pub inserted: usize,
    /// Records that replaced an existing row with the same id.
    pub replaced: usize,
}

/// Table statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Lines that parse as rows.
    pub rows: usize,
    /// Non-empty lines that don't.
    pub malformed: usize,
}

/// A movie table backed by a JSON-lines file.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    /// Point a store at `path`. The file doesn't need to exist until read.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every well-formed row. Malformed lines are skipped with a warning.
    pub fn read_rows(&self) -> Result<Vec<RawRow>> {
        let (rows, malformed) = self.scan()?;
        if malformed > 0 {
            warn!(
                "Skipped {} malformed lines in {}",
                malformed,
                self.path.display()
            );
        }
        info!("Read {} rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    /// Count rows and malformed lines.
    pub fn stats(&self) -> Result<StoreStats> {
        let (rows, malformed) = self.scan()?;
        Ok(StoreStats {
            rows: rows.len(),
            malformed,
        })
    }

    /// Insert records, replacing any existing row with the same id.
    ///
    /// Existing rows keep their place in the file; new ids are appended in
    /// the order given. If `records` repeats an id, the last one wins.
    pub fn upsert(&self, records: &[MovieRecord]) -> Result<UpsertStats> {
        let mut pending: HashMap<i64, &MovieRecord> = HashMap::new();
        let mut order = Vec::new();
        for record in records {
            if pending.insert(record.id, record).is_none() {
                order.push(record.id);
            }
        }

        let existing = match File::open(&self.path) {
            Ok(file) => BufReader::new(file)
                .lines()
                .collect::<std::io::Result<Vec<String>>>()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut stats = UpsertStats::default();
        let mut lines = Vec::with_capacity(existing.len() + order.len());

        for line in existing {
            let id = serde_json::from_str::<RowId>(&line).ok().map(|r| r.id);
            match id {
                Some(id) if pending.contains_key(&id) => {
                    // Replace the first row with this id, drop any later duplicates
                    if let Some(record) = pending.remove(&id) {
                        lines.push(serde_json::to_string(record)?);
                        stats.replaced += 1;
                    }
                }
                Some(id) if order.contains(&id) => {
                    debug!("Dropping duplicate row for id {}", id);
                }
                _ => lines.push(line),
            }
        }

        for id in order {
            if let Some(record) = pending.remove(&id) {
                lines.push(serde_json::to_string(record)?);
                stats.inserted += 1;
            }
        }

        self.write_atomic(&lines)?;
        info!(
            "Upserted into {}: {} inserted, {} replaced",
            self.path.display(),
            stats.inserted,
            stats.replaced
        );
        Ok(stats)
    }

    fn scan(&self) -> Result<(Vec<RawRow>, usize)> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut rows = Vec::new();
        let mut malformed = 0;

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRow>(&line) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    debug!("Line {} of {}: {}", number + 1, self.path.display(), e);
                    malformed += 1;
                }
            }
        }

        Ok((rows, malformed))
    }

    fn write_atomic(&self, lines: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.temp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for line in lines {
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

impl RowSource for JsonlStore {
    type Error = StoreError;

    fn fetch_rows(&mut self) -> Result<Vec<RawRow>> {
        self.read_rows()
    }
}

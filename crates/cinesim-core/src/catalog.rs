//! The in-memory catalog of validated embeddings.
//!
//! A catalog is built once from a batch of raw rows and is read-only from then
//! on. Rebuilding produces a new catalog which is swapped into a
//! [`CatalogHandle`]; queries already holding the old snapshot keep it.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use tracing::{debug, info};

use crate::codec::VectorCodec;
use crate::error::{CatalogError, Result};
use crate::types::{CatalogEntry, RawRow};

/// A supplier of raw rows, e.g. a database table or a file.
///
/// Implementations acquire whatever connection they need inside
/// `fetch_rows` and release it before returning.
pub trait RowSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read every row.
    fn fetch_rows(&mut self) -> std::result::Result<Vec<RawRow>, Self::Error>;
}

/// Statistics from a catalog build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Rows handed to the builder.
    pub rows_read: usize,
    /// Rows that became catalog entries.
    pub accepted: usize,
    /// Rows dropped for an invalid embedding.
    pub rejected: usize,
    /// Dimensionality of every entry.
    pub dimension: usize,
    /// Time spent building in milliseconds.
    pub build_time_ms: u64,
}

/// Validated `(id, title, vector)` entries sharing one dimensionality.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    codec: VectorCodec,
}

impl Catalog {
    /// Dimensionality of every entry.
    pub fn dimension(&self) -> usize {
        self.codec.dimension()
    }

    /// The codec entries were validated with; query-time parsing uses it too.
    pub fn codec(&self) -> &VectorCodec {
        &self.codec
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in build order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry at a catalog position.
    pub fn get(&self, position: usize) -> Option<&CatalogEntry> {
        self.entries.get(position)
    }

    /// Position of the first entry with this id.
    pub fn position_of(&self, id: i64) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Case-insensitive title search, returning `(position, entry)` pairs.
    pub fn find_titles(&self, needle: &str) -> Vec<(usize, &CatalogEntry)> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.title.to_lowercase().contains(&needle))
            .collect()
    }
}

/// Builds catalogs from raw rows.
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    codec: VectorCodec,
}

impl CatalogBuilder {
    /// Create a builder validating against `codec`'s dimension.
    pub fn new(codec: VectorCodec) -> Self {
        Self { codec }
    }

    /// Build a catalog from a batch of rows.
    ///
    /// Rows with an invalid embedding are dropped. Fails with
    /// [`CatalogError::EmptyCatalog`] if no row survives.
    pub fn build<I>(&self, rows: I) -> Result<(Catalog, BuildStats)>
    where
        I: IntoIterator<Item = RawRow>,
    {
        let start = Instant::now();
        let mut stats = BuildStats {
            dimension: self.codec.dimension(),
            ..Default::default()
        };
        let mut entries = Vec::new();

        for row in rows {
            stats.rows_read += 1;
            match self.codec.parse(&row.embedding) {
                Ok(vector) => entries.push(CatalogEntry {
                    id: row.id,
                    title: row.title,
                    vector,
                }),
                Err(e) => {
                    debug!("Dropping row {} ({}): {}", row.id, row.title, e);
                    stats.rejected += 1;
                }
            }
        }

        stats.accepted = entries.len();
        stats.build_time_ms = start.elapsed().as_millis() as u64;

        if entries.is_empty() {
            return Err(CatalogError::EmptyCatalog {
                rows_read: stats.rows_read,
            });
        }

        info!(
            "Built catalog: {} entries ({} rejected) of dimension {} in {}ms",
            stats.accepted, stats.rejected, stats.dimension, stats.build_time_ms
        );

        Ok((
            Catalog {
                entries,
                codec: self.codec,
            },
            stats,
        ))
    }

    /// Read all rows from `source` and build a catalog from them.
    pub fn build_from<S: RowSource>(&self, source: &mut S) -> Result<(Catalog, BuildStats)> {
        let rows = source
            .fetch_rows()
            .map_err(|e| CatalogError::Source(Box::new(e)))?;
        self.build(rows)
    }

    /// The codec rows are validated with.
    pub fn codec(&self) -> &VectorCodec {
        &self.codec
    }
}

/// A swappable pointer to the current catalog snapshot.
#[derive(Debug)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    /// Wrap an initial catalog.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Create a shared handle.
    pub fn shared(catalog: Catalog) -> Arc<Self> {
        Arc::new(Self::new(catalog))
    }

    /// The current snapshot. It stays valid across later swaps.
    pub fn snapshot(&self) -> Arc<Catalog> {
        // The lock only guards a pointer copy, so a poisoned lock still holds a
        // complete catalog.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn swap(&self, catalog: Catalog) -> Arc<Catalog> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }
}

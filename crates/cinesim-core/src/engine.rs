//! Cosine similarity ranking over a catalog.
//!
//! [`SimilarityEngine`] is the seam for ranking backends. [`ExactEngine`]
//! scans every entry (O(N·D) per query) and keeps the best `top_k` in a
//! bounded min-heap. Ranking is deterministic: higher score first, equal scores
//! in catalog order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::catalog::Catalog;
use crate::error::QueryError;
use crate::types::{EmbeddingVector, SimilarityResult};

/// Entries left out of a ranking, typically the query's own source entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    /// Skip the entry at this catalog position.
    Position(usize),
    /// Skip every entry with this id.
    Id(i64),
}

impl Exclusion {
    fn excludes(&self, position: usize, id: i64) -> bool {
        match *self {
            Exclusion::Position(p) => p == position,
            Exclusion::Id(i) => i == id,
        }
    }
}

/// Ranks catalog entries against a query vector.
pub trait SimilarityEngine: Send + Sync {
    /// Return up to `top_k` entries most similar to `vector`, best first.
    ///
    /// An empty catalog (or one whose only entry is excluded) yields an empty
    /// list rather than an error.
    fn query(
        &self,
        catalog: &Catalog,
        vector: &EmbeddingVector,
        top_k: usize,
        exclude: Option<Exclusion>,
    ) -> Result<Vec<SimilarityResult>, QueryError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Cosine similarity of two equal-length vectors.
///
/// Accumulates in f64 and clamps to `[-1, 1]`. Returns 0 when either vector
/// has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "cosine of mismatched lengths");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Heap slot ordered so the *worst* candidate is the heap maximum.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    position: usize,
}

impl Candidate {
    /// Ranking order: `Less` means `self` ranks ahead of `other`.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.position.cmp(&other.position))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Exhaustive cosine ranking.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactEngine;

impl ExactEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SimilarityEngine for ExactEngine {
    fn query(
        &self,
        catalog: &Catalog,
        vector: &EmbeddingVector,
        top_k: usize,
        exclude: Option<Exclusion>,
    ) -> Result<Vec<SimilarityResult>, QueryError> {
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }
        if vector.len() != catalog.dimension() {
            return Err(QueryError::DimensionMismatch {
                expected: catalog.dimension(),
                actual: vector.len(),
            });
        }

        let query = vector.as_slice();
        let mut heap: BinaryHeap<Candidate> =
            BinaryHeap::with_capacity(top_k.min(catalog.len()).saturating_add(1));

        for (position, entry) in catalog.entries().iter().enumerate() {
            if exclude.is_some_and(|ex| ex.excludes(position, entry.id)) {
                continue;
            }

            heap.push(Candidate {
                score: cosine_similarity(query, entry.vector.as_slice()),
                position,
            });

            // Drop the worst once we hold more than top_k
            if heap.len() > top_k {
                heap.pop();
            }
        }

        // Ascending by Ord is best-first
        let ranked = heap.into_sorted_vec();

        Ok(ranked
            .into_iter()
            .filter_map(|c| {
                catalog.get(c.position).map(|entry| SimilarityResult {
                    title: entry.title.clone(),
                    score: c.score,
                    id: entry.id,
                    position: c.position,
                })
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

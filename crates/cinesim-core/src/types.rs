//! Data types shared by the codec, catalog, and similarity engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated, fixed-length embedding.
///
/// Only the codec constructs these from raw input, so every instance has
/// finite components. The buffer is never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub(crate) fn from_validated(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the vector has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean norm, accumulated in f64.
    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt()
    }
}

impl AsRef<[f32]> for EmbeddingVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// A raw embedding as handed over by the storage layer.
///
/// Stores disagree on how they return vectors: some as a JSON/Python style
/// list literal, some as a PostgreSQL array string, some as a native array.
/// Anything else lands in `Other` and is rejected by the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEmbedding {
    /// Textual form, e.g. `"[0.1, 0.2]"`, `"{0.1,0.2}"` or `"0.1, 0.2"`.
    Text(String),
    /// An already-numeric sequence.
    Numbers(Vec<f64>),
    /// Any other value (null, nested arrays, objects, ...).
    Other(serde_json::Value),
}

impl Default for RawEmbedding {
    fn default() -> Self {
        RawEmbedding::Other(serde_json::Value::Null)
    }
}

impl From<&str> for RawEmbedding {
    fn from(s: &str) -> Self {
        RawEmbedding::Text(s.to_string())
    }
}

impl From<String> for RawEmbedding {
    fn from(s: String) -> Self {
        RawEmbedding::Text(s)
    }
}

impl From<Vec<f64>> for RawEmbedding {
    fn from(values: Vec<f64>) -> Self {
        RawEmbedding::Numbers(values)
    }
}

impl fmt::Display for RawEmbedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawEmbedding::Text(s) => write!(f, "{}", s),
            RawEmbedding::Numbers(v) => write!(f, "<{} numbers>", v.len()),
            RawEmbedding::Other(v) => write!(f, "{}", v),
        }
    }
}

/// A row read from the movie table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub embedding: RawEmbedding,
}

impl RawRow {
    /// Create a new raw row.
    pub fn new(id: i64, title: impl Into<String>, embedding: impl Into<RawEmbedding>) -> Self {
        Self {
            id,
            title: title.into(),
            embedding: embedding.into(),
        }
    }
}

/// A validated catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    pub vector: EmbeddingVector,
}

/// One ranked match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    /// Title of the matched entry.
    pub title: String,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
    /// External id of the matched entry.
    pub id: i64,
    /// Position of the matched entry in the catalog.
    pub position: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_embedding_deserialize_variants() {
        let text: RawEmbedding = serde_json::from_str(r#""[1.0, 2.0]""#).unwrap();
        assert_eq!(text, RawEmbedding::Text("[1.0, 2.0]".to_string()));

        let numbers: RawEmbedding = serde_json::from_str("[1, 2.5]").unwrap();
        assert_eq!(numbers, RawEmbedding::Numbers(vec![1.0, 2.5]));

        let other: RawEmbedding = serde_json::from_str(r#"[1, "x"]"#).unwrap();
        assert!(matches!(other, RawEmbedding::Other(_)));

        let null: RawEmbedding = serde_json::from_str("null").unwrap();
        assert_eq!(null, RawEmbedding::default());
    }

    #[test]
    fn test_raw_row_missing_embedding() {
        let row: RawRow = serde_json::from_str(r#"{"id": 7, "title": "Heat"}"#).unwrap();
        assert_eq!(row.id, 7);
        assert_eq!(row.embedding, RawEmbedding::default());
    }

    #[test]
    fn test_norm() {
        let v = EmbeddingVector::from_validated(vec![3.0, 4.0]);
        assert!((v.norm() - 5.0).abs() < 1e-12);
        assert_eq!(v.len(), 2);
    }
}

//! Error types for catalog building and similarity queries.

use thiserror::Error;

use crate::dispatcher::QueryRequest;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Reasons a raw embedding cannot become an [`EmbeddingVector`](crate::EmbeddingVector).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidEmbedding {
    /// Text that is neither a sequence literal nor a comma-separated list of numbers.
    #[error("Malformed embedding text: {0}")]
    Malformed(String),

    /// Nothing left after stripping brackets and whitespace.
    #[error("Empty embedding")]
    Empty,

    /// Parsed successfully but with the wrong number of components.
    #[error("Expected {expected} components, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    /// A component is NaN or infinite (or overflows f32).
    #[error("Non-finite component at index {index}")]
    NonFinite { index: usize },

    /// The raw value is not text and not a flat numeric sequence.
    #[error("Unsupported embedding representation: {0}")]
    Unsupported(String),
}

/// Errors raised while building a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No row produced a valid embedding.
    #[error("No valid embeddings among {rows_read} rows")]
    EmptyCatalog { rows_read: usize },

    /// The configured dimensionality is unusable.
    #[error("Invalid embedding dimension: {0}")]
    InvalidDimension(usize),

    /// The row source failed while being read.
    #[error("Row source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by an individual similarity query.
///
/// These are isolated per request: a batch reports them next to sibling
/// successes instead of aborting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// A raw query vector could not be parsed.
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(#[from] InvalidEmbedding),

    /// The query vector and the catalog disagree on dimensionality.
    #[error("Dimension mismatch: catalog has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The request names a position or id the catalog doesn't hold.
    #[error("No catalog entry for {0}")]
    EntryNotFound(QueryRequest),

    /// `top_k` must be at least one.
    #[error("top_k must be at least 1")]
    InvalidTopK,

    /// A batch was submitted with no requests.
    #[error("No items selected")]
    EmptyQuerySelection,

    /// The worker running this request died before reporting.
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

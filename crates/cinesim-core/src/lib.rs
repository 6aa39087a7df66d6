//! cinesim-core: embedding ingestion and similarity search
//!
//! This crate provides the recommendation core for cinesim:
//! - Parsing raw embeddings (list literals, delimited strings, numeric arrays)
//!   into validated fixed-length vectors
//! - Building an immutable, swappable in-memory catalog from raw rows
//! - Exact top-k cosine similarity ranking
//! - Concurrent dispatch of batches of similarity requests

pub mod catalog;
pub mod codec;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod types;

pub use catalog::{BuildStats, Catalog, CatalogBuilder, CatalogHandle, RowSource};
pub use codec::VectorCodec;
pub use dispatcher::{
    DEFAULT_TOP_K, DispatchConfig, DispatchReport, QueryDispatcher, QueryRequest, Recommendation,
};
pub use engine::{ExactEngine, Exclusion, SimilarityEngine, cosine_similarity};
pub use error::{CatalogError, InvalidEmbedding, QueryError, Result};
pub use types::{CatalogEntry, EmbeddingVector, RawEmbedding, RawRow, SimilarityResult};

//! Row types for the movie table.
//!
//! Stored lines look like
//! `{"id":603,"title":"The Matrix","popularity":61.2,"embedding":"{0.01,-0.2,...}"}`:
//! the embedding is kept as a brace-delimited numeric literal, the same form a
//! PostgreSQL `FLOAT8[]` column returns as text.

use cinesim_core::{EmbeddingVector, InvalidEmbedding, RawEmbedding, RawRow, VectorCodec};
use serde::{Deserialize, Serialize, Serializer};

/// A validated row ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieRecord {
    pub id: i64,
    pub title: String,
    pub popularity: f32,
    #[serde(serialize_with = "serialize_literal")]
    pub embedding: EmbeddingVector,
}

impl MovieRecord {
    /// Validate an import row's embedding and build a record from it.
    pub fn from_import(row: ImportRow, codec: &VectorCodec) -> Result<Self, InvalidEmbedding> {
        let embedding = codec.parse(&row.embedding)?;
        Ok(Self {
            id: row.id,
            title: row.title,
            popularity: row.popularity,
            embedding,
        })
    }

    /// The row as the read path sees it.
    pub fn to_raw_row(&self) -> RawRow {
        RawRow::new(
            self.id,
            self.title.clone(),
            VectorCodec::format_literal(&self.embedding),
        )
    }
}

fn serialize_literal<S: Serializer>(vector: &EmbeddingVector, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&VectorCodec::format_literal(vector))
}

/// A row from an import file, embedding not yet validated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportRow {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub popularity: f32,
    #[serde(default)]
    pub embedding: RawEmbedding,
}

/// Just enough of a stored line to find its id.
#[derive(Debug, Deserialize)]
pub(crate) struct RowId {
    pub id: i64,
}

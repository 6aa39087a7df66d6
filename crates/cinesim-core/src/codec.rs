//! Conversion of raw embeddings into validated fixed-length vectors.
//!
//! Text is parsed in two stages: first as a strict sequence literal
//! (`[0.1, 0.2]`), then, if the text is not a well-formed literal, permissively
//! as a delimited list with surrounding brackets, braces, or parentheses
//! stripped (`{0.1,0.2}`, `0.1, 0.2`, `[0.1, 0.2,]`). A well-formed literal that
//! is not a flat list of numbers is rejected rather than reinterpreted. A vector
//! is either accepted whole or rejected; it is never truncated or padded to the
//! configured dimension.

use serde_json::Value;

use crate::error::{CatalogError, InvalidEmbedding};
use crate::types::{EmbeddingVector, RawEmbedding};

/// Characters trimmed from both ends of text in the permissive stage.
const STRIP_CHARS: &[char] = &['[', ']', '{', '}', '(', ')', ' ', '\n', '\r', '\t'];

/// Longest prefix of offending input quoted in error messages.
const SNIPPET_LEN: usize = 40;

/// Parses raw embeddings against a fixed dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorCodec {
    dimension: usize,
}

impl VectorCodec {
    /// Create a codec expecting vectors of exactly `dimension` components.
    pub fn new(dimension: usize) -> Result<Self, CatalogError> {
        if dimension == 0 {
            return Err(CatalogError::InvalidDimension(dimension));
        }
        Ok(Self { dimension })
    }

    /// The dimensionality every accepted vector has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Parse a raw embedding into a vector of length `dimension`.
    pub fn parse(&self, raw: &RawEmbedding) -> Result<EmbeddingVector, InvalidEmbedding> {
        let values = match raw {
            RawEmbedding::Text(text) => self.parse_text(text)?,
            RawEmbedding::Numbers(numbers) => coerce(numbers.iter().copied())?,
            RawEmbedding::Other(value) => {
                return Err(InvalidEmbedding::Unsupported(snippet(&value.to_string())));
            }
        };
        self.check_length(values)
    }

    /// Parse a textual embedding.
    pub fn parse_str(&self, text: &str) -> Result<EmbeddingVector, InvalidEmbedding> {
        let values = self.parse_text(text)?;
        self.check_length(values)
    }

    /// Render a vector as a brace-delimited literal (`{0.1,0.2}`), the form the
    /// movie table stores. The output always parses back to the same vector.
    pub fn format_literal(vector: &EmbeddingVector) -> String {
        let body = vector
            .as_slice()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("{{{}}}", body)
    }

    fn parse_text(&self, text: &str) -> Result<Vec<f32>, InvalidEmbedding> {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => numeric_items(&items),
            // Braces delimit a list here, and a bare number is a one-element list
            Ok(Value::Number(_) | Value::Object(_)) | Err(_) => parse_delimited(text),
            Ok(other) => Err(InvalidEmbedding::Unsupported(snippet(&other.to_string()))),
        }
    }

    fn check_length(&self, values: Vec<f32>) -> Result<EmbeddingVector, InvalidEmbedding> {
        if values.len() != self.dimension {
            return Err(InvalidEmbedding::WrongLength {
                expected: self.dimension,
                actual: values.len(),
            });
        }
        Ok(EmbeddingVector::from_validated(values))
    }
}

/// Narrow to f32, rejecting anything that isn't finite after the cast.
fn coerce(numbers: impl Iterator<Item = f64>) -> Result<Vec<f32>, InvalidEmbedding> {
    numbers
        .enumerate()
        .map(|(index, n)| {
            let v = n as f32;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(InvalidEmbedding::NonFinite { index })
            }
        })
        .collect()
}

/// Elements of a well-formed sequence literal, which must all be numbers.
fn numeric_items(items: &[Value]) -> Result<Vec<f32>, InvalidEmbedding> {
    let numbers = items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| InvalidEmbedding::Malformed(snippet(&n.to_string()))),
            Value::Array(_) | Value::Object(_) => Err(InvalidEmbedding::Unsupported(snippet(
                &item.to_string(),
            ))),
            other => Err(InvalidEmbedding::Malformed(snippet(&other.to_string()))),
        })
        .collect::<Result<Vec<f64>, _>>()?;
    coerce(numbers.into_iter())
}

fn parse_delimited(text: &str) -> Result<Vec<f32>, InvalidEmbedding> {
    let cleaned = text.trim_matches(STRIP_CHARS);
    if cleaned.is_empty() {
        return Err(InvalidEmbedding::Empty);
    }

    let mut tokens: Vec<&str> = cleaned.split(',').map(str::trim).collect();
    // One trailing comma is allowed, as in a sequence literal
    if tokens.len() > 1 && tokens.last() == Some(&"") {
        tokens.pop();
    }

    tokens
        .into_iter()
        .enumerate()
        .map(|(index, token)| {
            let v: f32 = token
                .parse()
                .map_err(|_| InvalidEmbedding::Malformed(snippet(token)))?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(InvalidEmbedding::NonFinite { index })
            }
        })
        .collect()
}

fn snippet(s: &str) -> String {
    if s.chars().count() <= SNIPPET_LEN {
        s.to_string()
    } else {
        let head: String = s.chars().take(SNIPPET_LEN).collect();
        format!("{}...", head)
    }
}

// LanceDB vector database module
// Keyed embedding collections and cosine similarity search over them

#[cfg(test)]
mod tests;

pub mod client;
pub mod locks;
pub mod similarity;
pub mod vector_store;

pub use client::StoreClient;
pub use similarity::{SearchHit, SearchParams, SimilarityIndex};
pub use vector_store::EmbeddingStore;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{RecommenderError, Result};

/// Longest key accepted for either collection
pub const MAX_KEY_LENGTH: usize = 64;

/// Name of the fixed-size vector column in both tables
pub const VECTOR_COLUMN: &str = "embedding";

pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// The two logical entity types that own embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Participants,
    Hackathons,
}

impl Collection {
    pub const ALL: [Self; 2] = [Self::Participants, Self::Hackathons];

    /// Table name in LanceDB
    #[inline]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Participants => "participants",
            Self::Hackathons => "hackathons",
        }
    }

    /// Primary key column of the table
    #[inline]
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Participants => "pid",
            Self::Hackathons => "hid",
        }
    }
}

impl fmt::Display for Collection {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Participants => f.write_str("participant"),
            Self::Hackathons => f.write_str("hackathon"),
        }
    }
}

impl FromStr for Collection {
    type Err = RecommenderError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "participants" | "participant" => Ok(Self::Participants),
            "hackathons" | "hackathon" => Ok(Self::Hackathons),
            other => Err(RecommenderError::InvalidArgument(format!(
                "Unknown collection '{}' (expected 'participants' or 'hackathons')",
                other
            ))),
        }
    }
}

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Participant or hackathon identifier
    pub id: String,
    /// The skill embedding
    pub vector: Vec<f32>,
    /// RFC 3339 timestamp of the write that produced this row
    pub updated_at: String,
}

impl EmbeddingRecord {
    /// Create a record stamped with the current time
    #[inline]
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            updated_at: current_timestamp(),
        }
    }
}

/// Microsecond precision keeps string order equal to chronological order
#[inline]
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Reject empty or overlong keys
#[inline]
pub fn validate_key(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(RecommenderError::InvalidArgument(
            "Identifier cannot be empty".to_string(),
        ));
    }

    let length = id.chars().count();
    if length > MAX_KEY_LENGTH {
        return Err(RecommenderError::InvalidArgument(format!(
            "Identifier is {} characters long (maximum {})",
            length, MAX_KEY_LENGTH
        )));
    }

    Ok(())
}

#[inline]
pub fn validate_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(RecommenderError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Check the length and reject NaN or infinite components
#[inline]
pub fn validate_vector(vector: &[f32], expected: usize) -> Result<()> {
    validate_dimension(vector, expected)?;
    if let Some((position, value)) = vector.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        return Err(RecommenderError::InvalidArgument(format!(
            "Vector component {} is not finite ({})",
            position, value
        )));
    }
    Ok(())
}

/// Classify a LanceDB failure
///
/// Object store, runtime and directory failures mean the store could not be
/// reached and become `StoreUnavailable`; everything else is `Database`.
#[inline]
pub fn map_store_error(context: impl fmt::Display, error: lancedb::Error) -> RecommenderError {
    let message = format!("{}: {}", context, error);
    match error {
        lancedb::Error::ObjectStore { .. }
        | lancedb::Error::Runtime { .. }
        | lancedb::Error::CreateDir { .. } => RecommenderError::StoreUnavailable(message),
        _ => RecommenderError::Database(message),
    }
}

/// Typed filter over a collection's key field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPredicate<'a> {
    Equals(&'a str),
    NotEquals(&'a str),
    All,
}

impl KeyPredicate<'_> {
    /// Render as a LanceDB filter expression for the given collection
    #[inline]
    pub fn to_filter(&self, collection: Collection) -> String {
        let field = collection.key_field();
        match self {
            Self::Equals(id) => format!("{} = {}", field, quote_literal(id)),
            Self::NotEquals(id) => format!("{} != {}", field, quote_literal(id)),
            Self::All => format!("{} IS NOT NULL", field),
        }
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

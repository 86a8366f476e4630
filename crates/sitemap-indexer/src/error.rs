//! Error types for the indexing engine.

use thiserror::Error;

/// Errors raised by a [`CheckpointStore`](crate::store::CheckpointStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("checkpoint value for '{key}' is not valid JSON: {source}")]
    Encoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`PagedSource`](crate::paged::PagedSource).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("partition '{0}' not found")]
    UnknownPartition(String),
}

/// Errors that abort an indexing invocation.
///
/// Budget exhaustion and per-entry validation failures are not errors; they
/// surface as `finished = false` and validation events respectively.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("stored checkpoint '{key}' has unexpected shape: {value}")]
    CorruptCheckpoint { key: String, value: serde_json::Value },
}

pub type Result<T> = std::result::Result<T, IndexError>;

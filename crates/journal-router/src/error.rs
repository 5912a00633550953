//! Error types for the journal router

use journal_core::{ConfigError, StoreError};
use thiserror::Error;

/// Journal error types
#[derive(Debug, Error)]
pub enum JournalError {
    /// Invalid configuration, detected at construction
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Error reported by the backing store
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No shard holds a matching document
    #[error("document not found")]
    NotFound,

    /// The caller's document could not be turned into a store document
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A stored document does not fit the requested result type
    #[error("cannot decode document from shard {shard}: {source}")]
    Decode {
        shard: String,
        #[source]
        source: serde_json::Error,
    },

    /// The collection's background worker is gone
    #[error("journal {0} is shut down")]
    Closed(String),
}

impl JournalError {
    /// True for both the router's and the store's not-found errors
    pub fn is_not_found(&self) -> bool {
        match self {
            JournalError::NotFound => true,
            JournalError::Store(err) => err.is_not_found(),
            _ => false,
        }
    }
}

/// Journal result type
pub type Result<T> = std::result::Result<T, JournalError>;

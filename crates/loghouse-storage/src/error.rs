//! Storage error types.
//!
//! Wraps the core taxonomy plus the failure modes specific to this layer:
//! backend I/O, index (de)serialization, and wire decoding. `NotFound` and
//! `CorruptData` conditions are normalized into [`loghouse_core::Error`]
//! variants so callers match on one taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] loghouse_core::Error),

    #[error("index error: {0}")]
    Index(#[from] loghouse_index::Error),

    #[error("backend error: {0}")]
    Backend(#[from] object_store::Error),
}

impl Error {
    /// Whether this error means the referenced chunk or key does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Core(loghouse_core::Error::NotFound(_)) => true,
            Error::Backend(object_store::Error::NotFound { .. }) => true,
            _ => false,
        }
    }

    /// Normalizes backend not-found errors into the core taxonomy.
    pub(crate) fn normalize(self, what: &str) -> Self {
        match self {
            Error::Backend(object_store::Error::NotFound { .. }) => {
                Error::Core(loghouse_core::Error::NotFound(what.to_string()))
            }
            other => other,
        }
    }
}

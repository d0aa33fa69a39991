//! Shared error taxonomy.
//!
//! Every component maps its failures into one of these categories. The
//! split mirrors what callers are expected to do with them: `InvalidArgument`
//! is never retried, `NotFound` is sometimes expected (delete-before-exists),
//! `PreconditionFailed` signals a programming error rather than bad input,
//! and everything else surfaces as `Internal`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request: missing id or payload, unparsable JSON, inverted
    /// time range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A chunk id string or its components failed validation.
    #[error("invalid chunk id: {0}")]
    InvalidId(String),

    /// The referenced chunk or key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored bytes failed to deserialize.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// An operation was invoked in a state where it is not legal, e.g.
    /// materializing a chunk from a builder that is still open.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("query error: {0}")]
    Query(#[from] tantivy::query::QueryParserError),

    /// The payload handed to `add` was not valid JSON.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Attempted to add a document to an index reconstructed from an archive.
    #[error("index is read-only: {0}")]
    ReadOnly(String),

    /// The archive is missing files or its contents fail to load.
    #[error("archive error: {0}")]
    Archive(String),
}

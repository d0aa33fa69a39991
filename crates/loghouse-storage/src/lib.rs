//! Chunk storage layer.
//!
//! This crate owns the immutable chunk model and the façade that maps it onto
//! a pluggable durable backend:
//!
//! - [`Chunk`]: a loaded, searchable, immutable chunk (entries + index).
//! - [`chunk_proto`] / [`search_entries`]: shared chunk construction and
//!   search logic, also used by the appenders' open-chunk builders.
//! - [`ChunkStore`]: store / load / list / delete over any
//!   [`object_store::ObjectStore`] implementation (in-memory, local disk, or
//!   S3-compatible object storage).
//! - [`StorageMetrics`]: an explicit prometheus metrics sink passed into the
//!   store by the process that owns the registry.

pub mod chunk;
pub mod error;
pub mod metrics;
pub mod store;

pub use chunk::{chunk_proto, search_entries, Chunk};
pub use error::{Error, Result};
pub use metrics::StorageMetrics;
pub use store::ChunkStore;

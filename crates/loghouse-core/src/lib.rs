//! Core data model shared by all loghouse components.
//!
//! This crate defines the two identities everything else is built on:
//!
//! - [`LogEntry`]: a single immutable log line with a caller-assigned id and
//!   a millisecond timestamp.
//! - [`ChunkId`]: the self-describing address of an immutable chunk in
//!   storage, encoding its time span, size class and a random disambiguator.
//!
//! It also carries the shared [`Error`] taxonomy and small time/uid helpers.

pub mod chunk_id;
pub mod entry;
pub mod error;
pub mod util;

pub use chunk_id::{ChunkId, SizeClass};
pub use entry::LogEntry;
pub use error::{Error, Result};

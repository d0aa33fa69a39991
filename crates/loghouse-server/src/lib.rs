//! The loghouse server: sharded, append-only log storage and search.
//!
//! One binary hosts three gRPC services sharing a chunk store:
//!
//! - the appender accumulates entries in open chunks and flushes them to
//!   storage as immutable small chunks;
//! - the mixer merges search results from every appender and every stored
//!   chunk into one ordered stream;
//! - the ingester stamps raw payloads with ids and timestamps and replicates
//!   them across appender shards.
//!
//! A background janitor optionally compacts small chunks into big ones.

pub mod config;
pub mod discovery;
pub mod janitor;
pub mod services;

pub use config::ServerConfig;
pub use discovery::{AppenderHandle, Discovery, LocalAppender, RemoteAppender};
pub use janitor::{Janitor, JanitorConfig};
pub use services::appender::AppenderService;
pub use services::ingester::IngesterService;
pub use services::mixer::MixerService;
pub use services::open_chunk::ChunkPolicy;

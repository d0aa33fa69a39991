//! Protocol buffer definitions for loghouse.
//!
//! Three gRPC services make up the inter-node surface:
//!
//! - **Appender**: `Append` / `Search`, exposed by every shard server.
//! - **Mixer**: `Search`, the merged global query surface.
//! - **Ingester**: `Ingest`, the raw-JSON entry point.
//!
//! The `Chunk` message doubles as the persisted chunk wire format: the bytes
//! written to the durable backend are exactly `Chunk::encode_to_vec()`.

pub mod convert;

pub mod loghouse {
    tonic::include_proto!("loghouse");
}

pub use loghouse::*;

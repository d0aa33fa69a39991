//! The chunk store façade.
//!
//! Maps the chunk model onto a byte-oriented [`object_store::ObjectStore`]
//! backend. Keys follow the layout `chunk/<sizeClass>/<chunkIdString>`, so
//! listing one size class is a prefix listing and the chunk id string is
//! recoverable from the key alone.

use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use prost::Message;
use tracing::debug;

use loghouse_core::{ChunkId, SizeClass};
use loghouse_proto::loghouse as pb;

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::metrics::StorageMetrics;

const CHUNK_PREFIX: &str = "chunk";

/// Stores chunks in a durable backend and supports loading, listing and
/// deleting them.
pub struct ChunkStore {
    backend: Arc<dyn ObjectStore>,
    metrics: Arc<StorageMetrics>,
}

impl ChunkStore {
    pub fn new(backend: Arc<dyn ObjectStore>, metrics: Arc<StorageMetrics>) -> Self {
        Self { backend, metrics }
    }

    /// Persists the supplied chunk. Returns the id it was stored under.
    pub async fn store_chunk(&self, chunk: &pb::Chunk) -> Result<ChunkId> {
        let id = ChunkId::try_from(chunk.id.clone().unwrap_or_default())?;
        let bytes = chunk.encode_to_vec();

        self.metrics.writes.inc();
        self.backend
            .put(&chunk_key(&id), PutPayload::from(bytes))
            .await?;

        debug!(chunk = %id, "stored chunk");
        Ok(id)
    }

    /// Loads the chunk with the supplied id.
    ///
    /// Fails with `NotFound` if no such chunk is stored and `CorruptData` if
    /// the stored bytes fail to decode.
    pub async fn load_chunk(&self, id: &ChunkId) -> Result<Chunk> {
        self.metrics.reads.inc();
        let result = self
            .backend
            .get(&chunk_key(id))
            .await
            .map_err(|e| Error::from(e).normalize(&format!("chunk {id}")))?;
        let bytes = result.bytes().await?;

        let proto = pb::Chunk::decode(bytes.as_ref()).map_err(|e| {
            loghouse_core::Error::CorruptData(format!("unable to decode chunk {id}: {e}"))
        })?;
        Chunk::from_proto(proto)
    }

    /// Returns the ids of stored chunks of the given class which may overlap
    /// the supplied time range (zero bounds are unbounded), ascending by
    /// start time.
    ///
    /// The overlap filter is a best-effort narrowing: the backend only
    /// supports prefix listing, so callers needing a precise window must
    /// re-check the returned spans themselves.
    pub async fn list_chunks(
        &self,
        start_ms: i64,
        end_ms: i64,
        size_class: SizeClass,
    ) -> Result<Vec<ChunkId>> {
        let prefix = Path::from(format!("{CHUNK_PREFIX}/{size_class}"));

        self.metrics
            .lists
            .with_label_values(&[size_class.as_str()])
            .inc();

        let mut stream = self.backend.list(Some(&prefix));
        let mut ids = Vec::new();
        while let Some(meta) = stream.try_next().await? {
            let name = meta.location.filename().unwrap_or_default();
            let id: ChunkId = name.parse()?;
            if id.overlaps(start_ms, end_ms) {
                ids.push(id);
            }
        }

        ids.sort_by_key(|id| (id.start_ms(), id.end_ms(), id.uid().to_string()));
        Ok(ids)
    }

    /// Deletes the chunk with the supplied id. Fails with `NotFound` if it
    /// does not exist.
    pub async fn delete_chunk(&self, id: &ChunkId) -> Result<()> {
        self.metrics.deletes.inc();
        self.backend
            .delete(&chunk_key(id))
            .await
            .map_err(|e| Error::from(e).normalize(&format!("chunk {id}")))?;
        debug!(chunk = %id, "deleted chunk");
        Ok(())
    }
}

fn chunk_key(id: &ChunkId) -> Path {
    Path::from(format!("{CHUNK_PREFIX}/{}/{}", id.size_class(), id))
}

//! The appender service.
//!
//! Owns the open chunks of one shard. Appends go to the first open chunk that
//! accepts the entry; when a chunk closes it arrives on the sink channel,
//! where the store loop persists it and, after a grace period, drops it from
//! the open list. The grace period keeps freshly stored entries searchable on
//! the appender while mixers converge on the stored copy.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tonic::{Request, Response, Status};
use tracing::{error, info};

use loghouse_core::LogEntry;
use loghouse_proto::loghouse as pb;
use loghouse_storage::{ChunkStore, Result};

use crate::services::open_chunk::{ChunkPolicy, ChunkSink, OpenChunk};
use crate::services::status_from_error;

/// One appender shard. Cheap to clone; clones share the open-chunk list.
#[derive(Clone)]
pub struct AppenderService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<ChunkStore>,
    policy: ChunkPolicy,
    grace_period: Duration,
    open_chunks: Mutex<Vec<Arc<OpenChunk>>>,
    sink: ChunkSink,
}

impl AppenderService {
    /// Creates the shard and spawns its store loop. Fails with
    /// `InvalidArgument` on a non-positive policy.
    pub fn new(
        store: Arc<ChunkStore>,
        policy: ChunkPolicy,
        grace_period: Duration,
    ) -> Result<Self> {
        if policy.max_entries == 0 {
            return Err(invalid("max_entries must be positive"));
        }
        if policy.max_spread_ms <= 0 {
            return Err(invalid("max_spread_ms must be positive"));
        }
        if policy.max_open_ms == 0 {
            return Err(invalid("max_open_ms must be positive"));
        }

        let (sink, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            store,
            policy,
            grace_period,
            open_chunks: Mutex::new(Vec::new()),
            sink,
        });

        tokio::spawn(store_closed_chunks(Arc::clone(&inner), receiver));
        Ok(Self { inner })
    }

    /// Accepts one entry into an open chunk, opening a new one if no current
    /// chunk takes it.
    pub async fn append_entry(&self, entry: LogEntry) -> Result<()> {
        if entry.id.is_empty() {
            return Err(invalid("entry id must not be empty"));
        }
        if entry.entry_json.is_empty() {
            return Err(invalid("entry payload must not be empty"));
        }

        let mut open_chunks = self.inner.open_chunks.lock().await;
        for chunk in open_chunks.iter() {
            if chunk.try_add(&entry).await? {
                return Ok(());
            }
        }

        let chunk = OpenChunk::create(
            &entry,
            self.inner.policy.clone(),
            self.inner.sink.clone(),
        )
        .await?;
        open_chunks.push(chunk);
        Ok(())
    }

    /// Searches all chunks currently held in memory. Results are the
    /// concatenation of the per-chunk hits; ordering is up to the caller.
    pub async fn search_open_chunks(&self, request: &pb::SearchRequest) -> Result<Vec<LogEntry>> {
        let open_chunks = self.inner.open_chunks.lock().await;

        let mut result = Vec::new();
        for chunk in open_chunks.iter() {
            let hits = chunk
                .search(
                    &request.query,
                    request.num as usize,
                    request.start_ms,
                    request.end_ms,
                )
                .await?;
            result.extend(hits);
        }
        Ok(result)
    }

    /// Number of chunks currently held, open or awaiting removal.
    #[cfg(test)]
    pub(crate) async fn held_chunks(&self) -> usize {
        self.inner.open_chunks.lock().await.len()
    }
}

/// Drains the sink: persists each closed chunk, then drops it from the open
/// list once the grace period has passed. A chunk that fails to persist is
/// kept in memory and stays searchable.
async fn store_closed_chunks(
    inner: Arc<Inner>,
    mut receiver: mpsc::UnboundedReceiver<Arc<OpenChunk>>,
) {
    while let Some(chunk) = receiver.recv().await {
        let proto = match chunk.to_proto().await {
            Ok(proto) => proto,
            Err(e) => {
                error!(error = %e, "unable to materialize closed chunk");
                continue;
            }
        };

        match inner.store.store_chunk(&proto).await {
            Ok(id) => {
                info!(chunk = %id, entries = proto.entries.len(), "stored closed chunk");
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    tokio::time::sleep(inner.grace_period).await;
                    let mut open_chunks = inner.open_chunks.lock().await;
                    open_chunks.retain(|c| !Arc::ptr_eq(c, &chunk));
                });
            }
            Err(e) => {
                error!(error = %e, "unable to store closed chunk, keeping it in memory");
            }
        }
    }
}

fn invalid(msg: &str) -> loghouse_storage::Error {
    loghouse_core::Error::InvalidArgument(msg.to_string()).into()
}

#[tonic::async_trait]
impl pb::appender_server::Appender for AppenderService {
    async fn append(
        &self,
        request: Request<pb::AppendRequest>,
    ) -> std::result::Result<Response<pb::AppendResponse>, Status> {
        let entry = request
            .into_inner()
            .entry
            .ok_or_else(|| Status::invalid_argument("no entry supplied"))?;

        self.append_entry(entry.into())
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(pb::AppendResponse {}))
    }

    async fn search(
        &self,
        request: Request<pb::SearchRequest>,
    ) -> std::result::Result<Response<pb::SearchResponse>, Status> {
        let request = request.into_inner();
        let entries = self
            .search_open_chunks(&request)
            .await
            .map_err(status_from_error)?;

        Ok(Response::new(pb::SearchResponse {
            entries: entries.into_iter().map(pb::LogEntry::from).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use object_store::memory::InMemory;
    use prometheus::Registry;

    use loghouse_core::SizeClass;
    use loghouse_storage::StorageMetrics;

    fn store() -> Arc<ChunkStore> {
        let registry = Registry::new();
        let metrics = Arc::new(StorageMetrics::new(&registry).unwrap());
        Arc::new(ChunkStore::new(Arc::new(InMemory::new()), metrics))
    }

    fn entry(id: &str, ts: i64, message: &str) -> LogEntry {
        LogEntry::new(id, ts, format!(r#"{{"message": "{message}"}}"#))
    }

    fn search_request(query: &str, num: u32) -> pb::SearchRequest {
        pb::SearchRequest {
            query: query.to_string(),
            num,
            start_ms: 0,
            end_ms: 0,
        }
    }

    fn appender(store: Arc<ChunkStore>, max_entries: usize) -> AppenderService {
        AppenderService::new(
            store,
            ChunkPolicy {
                max_entries,
                max_spread_ms: 5000,
                max_open_ms: 60_000,
            },
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rejects_invalid_entries() {
        let appender = appender(store(), 10);
        assert!(appender.append_entry(entry("", 1, "foo")).await.is_err());
        assert!(appender
            .append_entry(LogEntry::new("a", 1, ""))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn full_chunk_is_stored_and_removed_after_grace() {
        let store = store();
        let appender = appender(Arc::clone(&store), 3);

        for (id, ts) in [("a", 200), ("b", 400), ("c", 600)] {
            appender.append_entry(entry(id, ts, "foo")).await.unwrap();
        }

        // The chunk closes at capacity and the store loop persists it.
        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = store.list_chunks(0, 0, SizeClass::Small).await.unwrap();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].start_ms(), 200);
        assert_eq!(stored[0].end_ms(), 600);

        // During the grace period the entries are still served from memory.
        let hits = appender.search_open_chunks(&search_request("foo", 10)).await.unwrap();
        assert_eq!(hits.len(), 3);

        for _ in 0..50 {
            if appender.held_chunks().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(appender.held_chunks().await, 0);
    }

    #[tokio::test]
    async fn spread_overflow_opens_second_chunk() {
        let appender = appender(store(), 10);

        appender.append_entry(entry("a", 0, "foo")).await.unwrap();
        appender.append_entry(entry("b", 9000, "foo")).await.unwrap();
        assert_eq!(appender.held_chunks().await, 2);

        // Both chunks serve searches.
        let hits = appender.search_open_chunks(&search_request("foo", 10)).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}

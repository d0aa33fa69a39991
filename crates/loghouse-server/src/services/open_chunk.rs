//! The open-chunk builder.
//!
//! An appender accumulates incoming entries in open chunks. Each open chunk
//! enforces its admission policy on `try_add`, closes itself exactly once
//! (capacity, age timer, or explicit close), and hands itself to the
//! appender's sink channel when it does. Closed chunks stay searchable in
//! memory until the appender persists them and lets them go.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use loghouse_core::chunk_id::new_uid;
use loghouse_core::entry::sort_oldest_first;
use loghouse_core::{ChunkId, LogEntry, SizeClass};
use loghouse_index::LogIndex;
use loghouse_proto::loghouse as pb;
use loghouse_storage::{search_entries, Result};

/// Receives chunks as they close.
pub(crate) type ChunkSink = mpsc::UnboundedSender<Arc<OpenChunk>>;

/// Admission limits for a single open chunk.
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    /// Entry count at which the chunk closes.
    pub max_entries: usize,
    /// Maximum allowed distance between the oldest and newest entry.
    pub max_spread_ms: i64,
    /// Wall-clock time after which the chunk closes regardless of fill.
    pub max_open_ms: u64,
}

pub(crate) struct OpenChunk {
    policy: ChunkPolicy,
    sink: ChunkSink,
    state: Mutex<State>,
}

struct State {
    uid: String,
    entries: HashMap<String, LogEntry>,
    index: LogIndex,
    // Span placeholders collapse onto the first entry's timestamp.
    start_ms: i64,
    end_ms: i64,
    closed: bool,
    close_timer: Option<JoinHandle<()>>,
}

impl OpenChunk {
    /// Creates a new open chunk seeded with `entry` and arms its age timer.
    pub(crate) async fn create(
        entry: &LogEntry,
        policy: ChunkPolicy,
        sink: ChunkSink,
    ) -> Result<Arc<Self>> {
        let chunk = Arc::new(Self {
            policy,
            sink,
            state: Mutex::new(State {
                uid: new_uid(),
                entries: HashMap::new(),
                index: LogIndex::new()?,
                start_ms: i64::MAX,
                end_ms: i64::MIN,
                closed: false,
                close_timer: None,
            }),
        });

        if !chunk.try_add(entry).await? {
            return Err(loghouse_core::Error::Internal(
                "fresh open chunk rejected its first entry".to_string(),
            )
            .into());
        }

        let max_open = Duration::from_millis(chunk.policy.max_open_ms);
        let timer = tokio::spawn({
            let chunk = Arc::clone(&chunk);
            async move {
                tokio::time::sleep(max_open).await;
                debug!("open chunk reached max age, closing");
                chunk.close().await;
            }
        });
        chunk.state.lock().await.close_timer = Some(timer);

        Ok(chunk)
    }

    /// Attempts to add the entry. Returns `false` if this chunk cannot take
    /// it (already closed, or the entry would stretch the span past the
    /// policy limit); the caller then tries the next chunk or opens a new
    /// one. Indexing failures are hard errors.
    pub(crate) async fn try_add(self: &Arc<Self>, entry: &LogEntry) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(false);
        }
        // The capacity close is asynchronous; refuse entries in the window
        // between hitting capacity and the close running.
        if state.entries.len() >= self.policy.max_entries {
            return Ok(false);
        }

        let new_start = state.start_ms.min(entry.timestamp_ms);
        let new_end = state.end_ms.max(entry.timestamp_ms);
        if new_end - new_start > self.policy.max_spread_ms {
            return Ok(false);
        }

        state.index.add(&entry.id, &entry.entry_json)?;
        state.entries.insert(entry.id.clone(), entry.clone());
        state.start_ms = new_start;
        state.end_ms = new_end;

        if state.entries.len() >= self.policy.max_entries {
            // Asynchronous so the caller's append returns immediately.
            let chunk = Arc::clone(self);
            tokio::spawn(async move {
                debug!("open chunk reached max entries, closing");
                chunk.close().await;
            });
        }

        Ok(true)
    }

    /// Closes this chunk and delivers it to the sink. Idempotent: every call
    /// after the first is a no-op, so the capacity path, the age timer and
    /// explicit closes can race freely.
    pub(crate) async fn close(self: Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(timer) = state.close_timer.take() {
            timer.abort();
        }
        drop(state);

        if self.sink.send(Arc::clone(&self)).is_err() {
            warn!("closed chunk dropped: sink receiver is gone");
        }
    }

    /// Searches the entries currently held, open or closed.
    pub(crate) async fn search(
        &self,
        query: &str,
        num: usize,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<LogEntry>> {
        let state = self.state.lock().await;
        search_entries(&state.index, &state.entries, query, num, start_ms, end_ms)
    }

    /// Materializes this chunk as a small chunk wire message, ready for
    /// storage. Fails with `PreconditionFailed` if the chunk is still open.
    /// Seals the index; the chunk remains searchable afterwards.
    pub(crate) async fn to_proto(&self) -> Result<pb::Chunk> {
        let mut state = self.state.lock().await;
        if !state.closed {
            return Err(loghouse_core::Error::PreconditionFailed(
                "chunk must be closed before it can be materialized".to_string(),
            )
            .into());
        }

        state.index.seal()?;
        let archive = state.index.to_archive()?;

        let mut entries: Vec<LogEntry> = state.entries.values().cloned().collect();
        sort_oldest_first(&mut entries);

        let id = ChunkId::new(state.uid.clone(), state.start_ms, state.end_ms, SizeClass::Small)?;
        Ok(pb::Chunk {
            id: Some(id.into()),
            entries: entries.into_iter().map(pb::LogEntry::from).collect(),
            index: Some(archive.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, ts: i64, message: &str) -> LogEntry {
        LogEntry::new(id, ts, format!(r#"{{"message": "{message}"}}"#))
    }

    fn policy(max_entries: usize, max_spread_ms: i64) -> ChunkPolicy {
        ChunkPolicy {
            max_entries,
            max_spread_ms,
            // Long enough that the age timer never fires in these tests.
            max_open_ms: 60_000,
        }
    }

    fn sink() -> (ChunkSink, mpsc::UnboundedReceiver<Arc<OpenChunk>>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn closes_once_at_capacity() {
        let (tx, mut rx) = sink();
        let chunk = OpenChunk::create(&entry("a", 100, "foo"), policy(2, 5000), tx)
            .await
            .unwrap();

        assert!(chunk.try_add(&entry("b", 200, "bar")).await.unwrap());
        let closed = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&closed, &chunk));

        // Closed chunks take nothing further, and re-closing delivers nothing.
        assert!(!chunk.try_add(&entry("c", 300, "baz")).await.unwrap());
        Arc::clone(&chunk).close().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejects_entry_stretching_span_past_limit() {
        let (tx, _rx) = sink();
        let chunk = OpenChunk::create(&entry("a", 0, "foo"), policy(10, 1000), tx)
            .await
            .unwrap();

        assert!(chunk.try_add(&entry("b", 1000, "foo")).await.unwrap());
        assert!(!chunk.try_add(&entry("c", 1500, "foo")).await.unwrap());
        // An entry within the span is still welcome.
        assert!(chunk.try_add(&entry("d", 500, "foo")).await.unwrap());
    }

    #[tokio::test]
    async fn age_timer_closes_the_chunk() {
        let (tx, mut rx) = sink();
        let fast = ChunkPolicy {
            max_entries: 100,
            max_spread_ms: 5000,
            max_open_ms: 20,
        };
        let chunk = OpenChunk::create(&entry("a", 100, "foo"), fast, tx)
            .await
            .unwrap();

        let closed = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&closed, &chunk));
        assert!(!chunk.try_add(&entry("b", 150, "foo")).await.unwrap());
    }

    #[tokio::test]
    async fn open_chunk_is_searchable() {
        let (tx, _rx) = sink();
        let chunk = OpenChunk::create(&entry("a", 100, "foo"), policy(10, 5000), tx)
            .await
            .unwrap();
        chunk.try_add(&entry("b", 200, "bar")).await.unwrap();

        let hits = chunk.search("foo", 10, 0, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn to_proto_requires_closed() {
        let (tx, mut rx) = sink();
        let chunk = OpenChunk::create(&entry("a", 100, "foo"), policy(10, 5000), tx)
            .await
            .unwrap();

        let err = chunk.to_proto().await.unwrap_err();
        assert!(matches!(
            err,
            loghouse_storage::Error::Core(loghouse_core::Error::PreconditionFailed(_))
        ));

        chunk.try_add(&entry("b", 300, "bar")).await.unwrap();
        Arc::clone(&chunk).close().await;
        rx.recv().await.unwrap();

        let proto = chunk.to_proto().await.unwrap();
        let id = ChunkId::try_from(proto.id.unwrap()).unwrap();
        assert_eq!(id.start_ms(), 100);
        assert_eq!(id.end_ms(), 300);
        assert_eq!(id.size_class(), SizeClass::Small);
        assert_eq!(proto.entries.len(), 2);

        // Still searchable after materialization.
        assert_eq!(chunk.search("bar", 10, 0, 0).await.unwrap().len(), 1);
    }
}

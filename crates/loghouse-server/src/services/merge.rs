//! K-way merge of search results.
//!
//! Merges per-appender hit lists with hits from stored chunks into one
//! globally ordered, deduplicated stream. Stored chunks are loaded lazily:
//! until loaded, a chunk sits in the heap keyed by its span's start, a lower
//! bound on any hit it can produce. Once loaded and searched, its hits
//! re-enter the heap keyed by their real first timestamp, so a chunk is only
//! paid for if the merge actually reaches its span.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use tracing::debug;

use loghouse_core::entry::sort_oldest_first;
use loghouse_core::{ChunkId, LogEntry};
use loghouse_storage::{ChunkStore, Result};

/// Search parameters the merge forwards to lazily loaded chunks.
pub(crate) struct MergeQuery {
    pub query: String,
    pub num: usize,
    pub start_ms: i64,
    pub end_ms: i64,
}

enum Source {
    /// A sorted run of already-known hits, cursor at `next`.
    Entries { entries: Vec<LogEntry>, next: usize },
    /// A stored chunk not yet loaded.
    PendingChunk { id: ChunkId },
}

/// Heap item ordered solely by its key, `(timestamp, id)`.
struct Keyed {
    key: (i64, String),
    source: Source,
}

impl PartialEq for Keyed {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Keyed {}

impl PartialOrd for Keyed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Keyed {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

fn push_run(heap: &mut BinaryHeap<Reverse<Keyed>>, entries: Vec<LogEntry>, next: usize) {
    if let Some(entry) = entries.get(next) {
        heap.push(Reverse(Keyed {
            key: (entry.timestamp_ms, entry.id.clone()),
            source: Source::Entries { entries, next },
        }));
    }
}

/// Merges the supplied sources into up to `num` entries, ascending by
/// `(timestamp, id)`, with duplicate ids dropped. Each list in
/// `appender_hits` must already be sorted ascending.
pub(crate) async fn merge(
    store: &Arc<ChunkStore>,
    query: &MergeQuery,
    appender_hits: Vec<Vec<LogEntry>>,
    chunk_ids: Vec<ChunkId>,
) -> Result<Vec<LogEntry>> {
    let mut heap: BinaryHeap<Reverse<Keyed>> = BinaryHeap::new();
    for hits in appender_hits {
        push_run(&mut heap, hits, 0);
    }
    for id in chunk_ids {
        heap.push(Reverse(Keyed {
            key: (id.start_ms(), String::new()),
            source: Source::PendingChunk { id },
        }));
    }

    let mut result = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    while let Some(Reverse(item)) = heap.pop() {
        if result.len() >= query.num {
            break;
        }
        match item.source {
            Source::PendingChunk { id } => {
                debug!(chunk = %id, "loading chunk for merge");
                let chunk = store.load_chunk(&id).await?;
                let hits = chunk.search(&query.query, query.num, query.start_ms, query.end_ms)?;
                push_run(&mut heap, hits, 0);
            }
            Source::Entries { entries, next } => {
                let entry = &entries[next];
                // Record the id even when the entry is dropped as a duplicate.
                if seen.insert(entry.id.clone()) {
                    result.push(entry.clone());
                }
                push_run(&mut heap, entries, next + 1);
            }
        }
    }

    Ok(result)
}

/// Sorts one appender's hits into the ascending run the merge requires.
pub(crate) fn into_sorted_run(entries: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut entries = entries;
    sort_oldest_first(&mut entries);
    entries
}

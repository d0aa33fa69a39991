//! The in-memory, immutable representation of a stored chunk.
//!
//! A [`Chunk`] pairs a deserialized index with the entry map it was built
//! from. The two must agree exactly: every id the index returns resolves to
//! an entry, a property every search implicitly checks. The index is owned by
//! the chunk, so dropping the chunk releases it; there is no way to search a
//! released chunk.

use std::collections::HashMap;

use loghouse_core::entry::sort_oldest_first;
use loghouse_core::{ChunkId, LogEntry, SizeClass};
use loghouse_index::LogIndex;
use loghouse_proto::loghouse as pb;

use crate::error::Result;

/// An immutable chunk loaded from storage.
pub struct Chunk {
    id: ChunkId,
    index: LogIndex,
    entries: HashMap<String, LogEntry>,
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("id", &self.id)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Chunk {
    /// Opens the supplied chunk wire message. Fails with `CorruptData` if the
    /// embedded index cannot be reconstructed.
    pub fn from_proto(proto: pb::Chunk) -> Result<Self> {
        let id = ChunkId::try_from(proto.id.unwrap_or_default())?;

        let archive = proto.index.unwrap_or_default().into();
        let index = LogIndex::from_archive(&archive).map_err(|e| {
            loghouse_core::Error::CorruptData(format!("unable to open index of chunk {id}: {e}"))
        })?;

        let entries = proto
            .entries
            .into_iter()
            .map(|e| (e.id.clone(), LogEntry::from(e)))
            .collect();

        Ok(Self { id, index, entries })
    }

    pub fn id(&self) -> &ChunkId {
        &self.id
    }

    /// Returns all entries in this chunk, ascending by timestamp.
    pub fn entries(&self) -> Vec<LogEntry> {
        let mut result: Vec<LogEntry> = self.entries.values().cloned().collect();
        sort_oldest_first(&mut result);
        result
    }

    /// Returns up to `num` entries matching the query and time window, in
    /// ascending order by timestamp.
    pub fn search(
        &self,
        query: &str,
        num: usize,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<LogEntry>> {
        search_entries(&self.index, &self.entries, query, num, start_ms, end_ms)
    }
}

/// Executes a search against an index and the entry map it was built from.
///
/// Shared between stored chunks and the open-chunk builders on appenders,
/// which hold exactly this shape of state. A hit the map cannot resolve
/// indicates index/entry divergence and fails the whole search.
pub fn search_entries(
    index: &LogIndex,
    entries: &HashMap<String, LogEntry>,
    query: &str,
    num: usize,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<LogEntry>> {
    let ids = index.search(query, num)?;

    let mut result = Vec::new();
    for id in ids {
        let entry = entries.get(&id).ok_or_else(|| {
            loghouse_core::Error::Internal(format!("could not locate hit {id}"))
        })?;

        if start_ms != 0 && entry.timestamp_ms < start_ms {
            continue;
        }
        if end_ms != 0 && entry.timestamp_ms > end_ms {
            continue;
        }
        result.push(entry.clone());
        if result.len() >= num {
            break;
        }
    }

    sort_oldest_first(&mut result);
    Ok(result)
}

/// Builds a sealed chunk wire message from a set of entries: orders them,
/// indexes every payload, and stamps a fresh id spanning their timestamps.
pub fn chunk_proto(entries: Vec<LogEntry>, size_class: SizeClass) -> Result<pb::Chunk> {
    if entries.is_empty() {
        return Err(loghouse_core::Error::InvalidArgument(
            "cannot build a chunk from zero entries".to_string(),
        )
        .into());
    }

    let mut entries = entries;
    sort_oldest_first(&mut entries);

    let mut index = LogIndex::new()?;
    for entry in &entries {
        index.add(&entry.id, &entry.entry_json)?;
    }
    index.seal()?;

    let start_ms = entries.first().map(|e| e.timestamp_ms).unwrap_or(0);
    let end_ms = entries.last().map(|e| e.timestamp_ms).unwrap_or(0);
    let id = ChunkId::fresh(start_ms, end_ms, size_class)?;

    Ok(pb::Chunk {
        id: Some(id.into()),
        entries: entries.into_iter().map(pb::LogEntry::from).collect(),
        index: Some(index.to_archive()?.into()),
    })
}

//! Conversions between wire messages and core types.
//!
//! Entry and archive conversions are infallible; chunk id conversion from the
//! wire validates the same invariants as parsing a string id.

use loghouse_core::{ChunkId, Error, LogEntry, SizeClass};
use loghouse_index::{IndexArchive, IndexFile};

use crate::loghouse as pb;

impl From<LogEntry> for pb::LogEntry {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp_ms: entry.timestamp_ms,
            entry_json: entry.entry_json,
        }
    }
}

impl From<pb::LogEntry> for LogEntry {
    fn from(entry: pb::LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp_ms: entry.timestamp_ms,
            entry_json: entry.entry_json,
        }
    }
}

impl From<SizeClass> for pb::SizeClass {
    fn from(class: SizeClass) -> Self {
        match class {
            SizeClass::Small => pb::SizeClass::Small,
            SizeClass::Big => pb::SizeClass::Big,
        }
    }
}

impl From<pb::SizeClass> for SizeClass {
    fn from(class: pb::SizeClass) -> Self {
        match class {
            pb::SizeClass::Small => SizeClass::Small,
            pb::SizeClass::Big => SizeClass::Big,
        }
    }
}

impl From<ChunkId> for pb::ChunkId {
    fn from(id: ChunkId) -> Self {
        Self {
            uid: id.uid().to_string(),
            start_ms: id.start_ms(),
            end_ms: id.end_ms(),
            size_class: pb::SizeClass::from(id.size_class()) as i32,
        }
    }
}

impl TryFrom<pb::ChunkId> for ChunkId {
    type Error = Error;

    fn try_from(id: pb::ChunkId) -> Result<Self, Error> {
        let size_class = pb::SizeClass::try_from(id.size_class)
            .map_err(|_| Error::InvalidId(format!("unknown size class: {}", id.size_class)))?;
        ChunkId::new(id.uid, id.start_ms, id.end_ms, size_class.into())
    }
}

impl From<IndexArchive> for pb::IndexArchive {
    fn from(archive: IndexArchive) -> Self {
        Self {
            files: archive
                .files
                .into_iter()
                .map(|f| pb::IndexFile {
                    name: f.name,
                    contents: f.contents,
                })
                .collect(),
        }
    }
}

impl From<pb::IndexArchive> for IndexArchive {
    fn from(archive: pb::IndexArchive) -> Self {
        Self {
            files: archive
                .files
                .into_iter()
                .map(|f| IndexFile {
                    name: f.name,
                    contents: f.contents,
                })
                .collect(),
        }
    }
}

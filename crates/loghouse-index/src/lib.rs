//! Full-text index wrapper.
//!
//! Wraps a tantivy index held entirely in a RAM directory and presents it in
//! terms of log entries: documents are `(entry id, raw JSON payload)` pairs,
//! queries return ranked entry ids. Instances can be serialized into a list
//! of named file blobs ([`IndexArchive`]) and reconstructed from one without
//! loss of searchability, which is how a chunk's index travels inside the
//! persisted chunk format.
//!
//! Query support comes from tantivy's query parser: free text matches the
//! flattened payload (`body` field), `field:value` and `+field:value` resolve
//! into paths of the JSON payload (`entry` field).

mod archive;
mod error;

pub use archive::{IndexArchive, IndexFile};
pub use error::{Error, Result};

use tantivy::collector::TopDocs;
use tantivy::directory::RamDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, OwnedValue, Schema, Value, STORED, STRING, TEXT};
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, TantivyDocument};

const ID_FIELD: &str = "id";
const BODY_FIELD: &str = "body";
const ENTRY_FIELD: &str = "entry";

// One indexing thread per open chunk; tantivy requires at least 15MB of
// writer arena.
const WRITER_MEMORY_BYTES: usize = 15_000_000;

/// A searchable index over a set of log entries.
///
/// Writable when freshly created (the live index of an open chunk builder),
/// read-only when reconstructed from an archive (a stored chunk's index).
pub struct LogIndex {
    directory: RamDirectory,
    index: Index,
    reader: IndexReader,
    writer: Option<IndexWriter<TantivyDocument>>,
    id_field: Field,
    body_field: Field,
    entry_field: Field,
}

impl LogIndex {
    /// Creates a fresh, empty, writable index.
    pub fn new() -> Result<Self> {
        let schema = Self::schema();
        let directory = RamDirectory::create();
        let index = Index::create(directory.clone(), schema, IndexSettings::default())?;
        let writer = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
        Self::assemble(directory, index, Some(writer))
    }

    fn schema() -> Schema {
        let mut builder = Schema::builder();
        builder.add_text_field(ID_FIELD, STRING | STORED);
        builder.add_text_field(BODY_FIELD, TEXT);
        builder.add_json_field(ENTRY_FIELD, TEXT);
        builder.build()
    }

    fn assemble(
        directory: RamDirectory,
        index: Index,
        writer: Option<IndexWriter<TantivyDocument>>,
    ) -> Result<Self> {
        let schema = index.schema();
        let id_field = schema.get_field(ID_FIELD)?;
        let body_field = schema.get_field(BODY_FIELD)?;
        let entry_field = schema.get_field(ENTRY_FIELD)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            directory,
            index,
            reader,
            writer,
            id_field,
            body_field,
            entry_field,
        })
    }

    /// Indexes the supplied entry payload under the given id and makes it
    /// visible to subsequent searches.
    ///
    /// A payload which is not valid JSON is a hard error; the index is left
    /// unchanged in that case.
    pub fn add(&mut self, id: &str, entry_json: &str) -> Result<()> {
        let payload: serde_json::Value = serde_json::from_str(entry_json)?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::ReadOnly("cannot add to an index loaded from an archive".into()))?;

        let mut doc = TantivyDocument::new();
        doc.add_text(self.id_field, id);
        doc.add_text(self.body_field, flatten_leaves(&payload));
        if payload.is_object() {
            doc.add_field_value(self.entry_field, OwnedValue::from(payload));
        }

        writer.add_document(doc)?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Runs the supplied query and returns up to `limit` matching entry ids,
    /// ranked by relevance.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let parser =
            QueryParser::for_index(&self.index, vec![self.body_field, self.entry_field]);
        let parsed = parser.parse_query(query)?;

        let searcher = self.reader.searcher();
        let hits = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

        let mut ids = Vec::with_capacity(hits.len());
        for (_score, address) in hits {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Archive("hit without stored id".into()))?;
            ids.push(id.to_string());
        }
        Ok(ids)
    }

    /// Stops accepting writes and waits for any in-flight segment merges.
    ///
    /// Archiving a still-writable index races against background merges, so
    /// callers seal before calling [`LogIndex::to_archive`]. Sealing an
    /// already-sealed index is a no-op.
    pub fn seal(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.wait_merging_threads()?;
        }
        Ok(())
    }

    /// Captures the index's file set into a self-contained archive.
    ///
    /// The index must be sealed (or have been loaded from an archive).
    pub fn to_archive(&self) -> Result<IndexArchive> {
        if self.writer.is_some() {
            return Err(Error::Archive("cannot archive an unsealed index".into()));
        }
        archive::capture(&self.directory, &self.index)
    }

    /// Reconstructs a read-only index from an archive previously produced by
    /// [`LogIndex::to_archive`].
    pub fn from_archive(archive: &IndexArchive) -> Result<Self> {
        let directory = archive::restore(archive)?;
        let index = Index::open(directory.clone())?;
        Self::assemble(directory, index, None)
    }
}

/// Flattens all leaf values of a JSON document into one whitespace-joined
/// string, so that free-text queries match values anywhere in the payload.
fn flatten_leaves(value: &serde_json::Value) -> String {
    fn walk(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Bool(b) => out.push(b.to_string()),
            serde_json::Value::Number(n) => out.push(n.to_string()),
            serde_json::Value::String(s) => out.push(s.clone()),
            serde_json::Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            serde_json::Value::Object(map) => {
                for item in map.values() {
                    walk(item, out);
                }
            }
        }
    }

    let mut parts = Vec::new();
    walk(value, &mut parts);
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_and_finds_free_text() {
        let mut index = LogIndex::new().unwrap();
        index.add("e1", r#"{"message": "connection refused"}"#).unwrap();
        index.add("e2", r#"{"message": "connection accepted"}"#).unwrap();

        let hits = index.search("refused", 10).unwrap();
        assert_eq!(hits, vec!["e1".to_string()]);

        let both = index.search("connection", 10).unwrap();
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn supports_field_scoped_queries() {
        let mut index = LogIndex::new().unwrap();
        index.add("e1", r#"{"level": "error", "message": "disk full"}"#).unwrap();
        index.add("e2", r#"{"level": "info", "message": "disk ok"}"#).unwrap();

        let hits = index.search("level:error", 10).unwrap();
        assert_eq!(hits, vec!["e1".to_string()]);

        let required = index.search("+level:info disk", 10).unwrap();
        assert_eq!(required, vec!["e2".to_string()]);
    }

    #[test]
    fn respects_result_limit() {
        let mut index = LogIndex::new().unwrap();
        for i in 0..5 {
            index.add(&format!("e{i}"), r#"{"message": "foo"}"#).unwrap();
        }
        assert_eq!(index.search("foo", 3).unwrap().len(), 3);
        assert!(index.search("foo", 0).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_payload() {
        let mut index = LogIndex::new().unwrap();
        assert!(matches!(
            index.add("e1", "not json at all {"),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn indexes_non_object_payloads_as_text() {
        let mut index = LogIndex::new().unwrap();
        index.add("e1", r#""bare string payload""#).unwrap();
        assert_eq!(index.search("bare", 10).unwrap(), vec!["e1".to_string()]);
    }

    #[test]
    fn archive_round_trip_preserves_searchability() {
        let mut index = LogIndex::new().unwrap();
        index.add("e1", r#"{"message": "foo"}"#).unwrap();
        index.add("e2", r#"{"message": "bar"}"#).unwrap();
        index.seal().unwrap();

        let archive = index.to_archive().unwrap();
        let restored = LogIndex::from_archive(&archive).unwrap();

        assert_eq!(restored.search("foo", 10).unwrap(), vec!["e1".to_string()]);
        assert_eq!(restored.search("bar", 10).unwrap(), vec!["e2".to_string()]);
        assert!(restored.search("baz", 10).unwrap().is_empty());
    }

    #[test]
    fn restored_index_is_read_only() {
        let mut index = LogIndex::new().unwrap();
        index.add("e1", r#"{"message": "foo"}"#).unwrap();
        index.seal().unwrap();
        let mut restored = LogIndex::from_archive(&index.to_archive().unwrap()).unwrap();
        assert!(matches!(
            restored.add("e2", r#"{"message": "bar"}"#),
            Err(Error::ReadOnly(_))
        ));
    }
}

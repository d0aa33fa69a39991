//! Integration tests for the chunk store over real backends.

use std::sync::Arc;

use object_store::memory::InMemory;
use object_store::ObjectStore;
use prometheus::Registry;
use tempfile::TempDir;

use loghouse_core::{ChunkId, LogEntry, SizeClass};
use loghouse_storage::{chunk_proto, ChunkStore, StorageMetrics};

fn new_store(backend: Arc<dyn ObjectStore>) -> ChunkStore {
    let registry = Registry::new();
    let metrics = Arc::new(StorageMetrics::new(&registry).unwrap());
    ChunkStore::new(backend, metrics)
}

fn memory_store() -> ChunkStore {
    new_store(Arc::new(InMemory::new()))
}

fn entry(id: &str, ts: i64, message: &str) -> LogEntry {
    LogEntry::new(id, ts, format!(r#"{{"message": "{message}"}}"#))
}

#[tokio::test]
async fn store_then_load_preserves_entries_and_searchability() {
    let store = memory_store();

    let proto = chunk_proto(
        vec![entry("a", 100, "foo"), entry("b", 200, "bar")],
        SizeClass::Small,
    )
    .unwrap();
    let id = store.store_chunk(&proto).await.unwrap();

    let chunk = store.load_chunk(&id).await.unwrap();
    assert_eq!(chunk.id(), &id);
    assert_eq!(chunk.entries().len(), 2);

    let hits = chunk.search("foo", 10, 0, 0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a");
}

#[tokio::test]
async fn load_missing_chunk_is_not_found() {
    let store = memory_store();
    let id = ChunkId::new("abcde", 0, 10, SizeClass::Small).unwrap();

    let err = store.load_chunk(&id).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn load_corrupt_bytes_is_corrupt_data() {
    let backend: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let store = new_store(backend.clone());

    let id = ChunkId::new("abcde", 0, 10, SizeClass::Small).unwrap();
    let key = object_store::path::Path::from(format!("chunk/small/{id}"));
    backend
        .put(&key, vec![0xde, 0xad, 0xbe, 0xef].into())
        .await
        .unwrap();

    let err = store.load_chunk(&id).await.unwrap_err();
    assert!(
        matches!(
            err,
            loghouse_storage::Error::Core(loghouse_core::Error::CorruptData(_))
        ),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn delete_removes_chunk_and_missing_delete_fails() {
    let store = memory_store();

    let proto = chunk_proto(vec![entry("a", 100, "foo")], SizeClass::Small).unwrap();
    let id = store.store_chunk(&proto).await.unwrap();

    store.delete_chunk(&id).await.unwrap();
    assert!(store.load_chunk(&id).await.unwrap_err().is_not_found());

    let err = store.delete_chunk(&id).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn list_filters_by_size_class_and_sorts_by_start() {
    let store = memory_store();

    let small_late = chunk_proto(vec![entry("c", 500, "foo")], SizeClass::Small).unwrap();
    let small_early = chunk_proto(vec![entry("a", 100, "foo")], SizeClass::Small).unwrap();
    let big = chunk_proto(vec![entry("b", 300, "foo")], SizeClass::Big).unwrap();

    store.store_chunk(&small_late).await.unwrap();
    store.store_chunk(&small_early).await.unwrap();
    store.store_chunk(&big).await.unwrap();

    let smalls = store.list_chunks(0, 0, SizeClass::Small).await.unwrap();
    assert_eq!(smalls.len(), 2);
    assert_eq!(smalls[0].start_ms(), 100);
    assert_eq!(smalls[1].start_ms(), 500);

    let bigs = store.list_chunks(0, 0, SizeClass::Big).await.unwrap();
    assert_eq!(bigs.len(), 1);
    assert_eq!(bigs[0].start_ms(), 300);
}

#[tokio::test]
async fn list_narrows_by_time_overlap() {
    let store = memory_store();

    let first = chunk_proto(
        vec![entry("a", 100, "foo"), entry("b", 200, "foo")],
        SizeClass::Small,
    )
    .unwrap();
    let second = chunk_proto(
        vec![entry("c", 1000, "foo"), entry("d", 2000, "foo")],
        SizeClass::Small,
    )
    .unwrap();
    store.store_chunk(&first).await.unwrap();
    store.store_chunk(&second).await.unwrap();

    let ids = store.list_chunks(150, 500, SizeClass::Small).await.unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].start_ms(), 100);

    // Unbounded sides keep everything.
    assert_eq!(store.list_chunks(0, 0, SizeClass::Small).await.unwrap().len(), 2);
}

#[tokio::test]
async fn local_filesystem_backend_round_trips() {
    let dir = TempDir::new().unwrap();
    let backend = object_store::local::LocalFileSystem::new_with_prefix(dir.path()).unwrap();
    let store = new_store(Arc::new(backend));

    let proto = chunk_proto(
        vec![entry("a", 100, "foo"), entry("b", 200, "foo")],
        SizeClass::Small,
    )
    .unwrap();
    let id = store.store_chunk(&proto).await.unwrap();

    let listed = store.list_chunks(0, 0, SizeClass::Small).await.unwrap();
    assert_eq!(listed, vec![id.clone()]);

    let chunk = store.load_chunk(&id).await.unwrap();
    assert_eq!(chunk.search("foo", 10, 0, 0).unwrap().len(), 2);
}

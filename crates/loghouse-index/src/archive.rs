//! Index archival.
//!
//! A [`LogIndex`] lives in a RAM directory. To embed it inside a persisted
//! chunk, the directory's file set is captured into an [`IndexArchive`]: the
//! index metadata plus every file belonging to a searchable segment. The
//! archive is opaque to everything outside this crate; the only contract is
//! that `restore(capture(index))` yields an equally-searchable index.

use std::path::Path;

use tantivy::directory::RamDirectory;
use tantivy::{Directory, Index};

use crate::error::{Error, Result};

const META_FILE: &str = "meta.json";
const MANAGED_FILE: &str = ".managed.json";

/// A single named file blob captured from an index directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// The serialized form of an index: a flat list of named file blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexArchive {
    pub files: Vec<IndexFile>,
}

/// Captures the supplied index's directory into an archive.
pub(crate) fn capture(directory: &RamDirectory, index: &Index) -> Result<IndexArchive> {
    let mut files = Vec::new();

    let meta = directory
        .atomic_read(Path::new(META_FILE))
        .map_err(|e| Error::Archive(format!("unable to read {META_FILE}: {e}")))?;
    files.push(IndexFile {
        name: META_FILE.to_string(),
        contents: meta,
    });

    if exists(directory, Path::new(MANAGED_FILE))? {
        let managed = directory
            .atomic_read(Path::new(MANAGED_FILE))
            .map_err(|e| Error::Archive(format!("unable to read {MANAGED_FILE}: {e}")))?;
        files.push(IndexFile {
            name: MANAGED_FILE.to_string(),
            contents: managed,
        });
    }

    for segment in index.searchable_segment_metas()? {
        for path in segment.list_files() {
            // Not every component a segment can have is actually present.
            if !exists(directory, &path)? {
                continue;
            }
            let slice = directory
                .open_read(&path)
                .map_err(|e| Error::Archive(format!("unable to open {}: {e}", path.display())))?;
            let bytes = slice
                .read_bytes()
                .map_err(|e| Error::Archive(format!("unable to read {}: {e}", path.display())))?;
            files.push(IndexFile {
                name: path.to_string_lossy().into_owned(),
                contents: bytes.as_slice().to_vec(),
            });
        }
    }

    Ok(IndexArchive { files })
}

/// Writes the archive's files into a fresh RAM directory.
pub(crate) fn restore(archive: &IndexArchive) -> Result<RamDirectory> {
    let directory = RamDirectory::create();
    for file in &archive.files {
        directory
            .atomic_write(Path::new(&file.name), &file.contents)
            .map_err(|e| Error::Archive(format!("unable to restore {}: {e}", file.name)))?;
    }
    Ok(directory)
}

fn exists(directory: &RamDirectory, path: &Path) -> Result<bool> {
    directory
        .exists(path)
        .map_err(|e| Error::Archive(format!("unable to stat {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogIndex;

    #[test]
    fn capture_includes_index_metadata() {
        let mut index = LogIndex::new().unwrap();
        index.add("e1", r#"{"message": "foo"}"#).unwrap();
        index.seal().unwrap();

        let archive = index.to_archive().unwrap();
        assert!(archive.files.iter().any(|f| f.name == META_FILE));
        // One committed segment means more than just the metadata files.
        assert!(archive.files.len() > 2);
    }

    #[test]
    fn restore_rejects_incomplete_archives() {
        let archive = IndexArchive::default();
        let directory = restore(&archive).unwrap();
        assert!(Index::open(directory).is_err());
    }
}

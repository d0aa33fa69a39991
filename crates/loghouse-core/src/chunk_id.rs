//! Chunk identity.
//!
//! A chunk id is self-describing: it carries the chunk's time span, its size
//! class (compaction tier) and a short random disambiguator. The canonical
//! string encoding is `"<class>-<startMs>-<endMs>-<uid>"` and round-trips
//! losslessly through [`std::fmt::Display`] / [`std::str::FromStr`]. The uid
//! alphabet excludes the `-` separator, so the encoding is unambiguous.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::error::{Error, Result};

const SEPARATOR: char = '-';
const UID_LENGTH: usize = 5;

/// Compaction tier of a chunk.
///
/// `Small` chunks are produced by appenders flushing open chunks; the janitor
/// folds groups of them into `Big` chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Small,
    Big,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Big => "big",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "small" => Ok(SizeClass::Small),
            "big" => Ok(SizeClass::Big),
            other => Err(Error::InvalidId(format!("unknown size class: {other}"))),
        }
    }
}

/// The address of an immutable chunk in storage.
///
/// Invariants are enforced at construction: `start_ms <= end_ms`, and the uid
/// is non-empty and free of the separator character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkId {
    uid: String,
    start_ms: i64,
    end_ms: i64,
    size_class: SizeClass,
}

impl ChunkId {
    pub fn new(
        uid: impl Into<String>,
        start_ms: i64,
        end_ms: i64,
        size_class: SizeClass,
    ) -> Result<Self> {
        let uid = uid.into();
        if uid.is_empty() {
            return Err(Error::InvalidId("uid must not be empty".to_string()));
        }
        if uid.contains(SEPARATOR) {
            return Err(Error::InvalidId(format!(
                "uid must not contain '{SEPARATOR}', but got: {uid}"
            )));
        }
        if start_ms > end_ms {
            return Err(Error::InvalidId(format!(
                "invalid time span: start={start_ms}, end={end_ms}"
            )));
        }
        Ok(Self {
            uid,
            start_ms,
            end_ms,
            size_class,
        })
    }

    /// Creates an id for the supplied span with a fresh random uid.
    pub fn fresh(start_ms: i64, end_ms: i64, size_class: SizeClass) -> Result<Self> {
        Self::new(new_uid(), start_ms, end_ms, size_class)
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    pub fn end_ms(&self) -> i64 {
        self.end_ms
    }

    pub fn size_class(&self) -> SizeClass {
        self.size_class
    }

    /// Whether this chunk's time span overlaps the supplied query window.
    /// A zero bound means unbounded on that side.
    pub fn overlaps(&self, start_ms: i64, end_ms: i64) -> bool {
        if start_ms != 0 && self.end_ms < start_ms {
            return false;
        }
        if end_ms != 0 && self.start_ms > end_ms {
            return false;
        }
        true
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.size_class, self.start_ms, self.end_ms, self.uid
        )
    }
}

impl FromStr for ChunkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let [class, start, end, uid] = parts.as_slice() else {
            return Err(Error::InvalidId(format!("unable to parse id: {s}")));
        };
        let size_class = class.parse::<SizeClass>()?;
        let start_ms = start
            .parse::<i64>()
            .map_err(|e| Error::InvalidId(format!("bad start in id {s}: {e}")))?;
        let end_ms = end
            .parse::<i64>()
            .map_err(|e| Error::InvalidId(format!("bad end in id {s}: {e}")))?;
        ChunkId::new(*uid, start_ms, end_ms, size_class)
    }
}

/// Returns a fresh random uid, suitable as the disambiguator of a new chunk.
pub fn new_uid() -> String {
    let mut rng = rand::thread_rng();
    (0..UID_LENGTH)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string_form() {
        let id = ChunkId::new("abcde", 100, 250, SizeClass::Small).unwrap();
        let parsed: ChunkId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        let big = ChunkId::new("zzzzz", 0, 0, SizeClass::Big).unwrap();
        assert_eq!(big.to_string(), "big-0-0-zzzzz");
        assert_eq!(big.to_string().parse::<ChunkId>().unwrap(), big);
    }

    #[test]
    fn rejects_empty_uid() {
        assert!(matches!(
            ChunkId::new("", 0, 1, SizeClass::Small),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn rejects_uid_with_separator() {
        assert!(matches!(
            ChunkId::new("ab-cd", 0, 1, SizeClass::Small),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn rejects_inverted_span() {
        assert!(matches!(
            ChunkId::new("abcde", 10, 5, SizeClass::Small),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn rejects_malformed_strings() {
        for s in ["", "small", "small-1-2", "huge-1-2-abcde", "small-x-2-ab"] {
            assert!(s.parse::<ChunkId>().is_err(), "expected {s:?} to fail");
        }
    }

    #[test]
    fn fresh_uids_have_expected_shape() {
        let uid = new_uid();
        assert_eq!(uid.len(), UID_LENGTH);
        assert!(uid.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn overlap_respects_unbounded_sides() {
        let id = ChunkId::new("abcde", 100, 200, SizeClass::Small).unwrap();
        assert!(id.overlaps(0, 0));
        assert!(id.overlaps(150, 0));
        assert!(id.overlaps(0, 150));
        assert!(!id.overlaps(201, 0));
        assert!(!id.overlaps(0, 99));
    }
}

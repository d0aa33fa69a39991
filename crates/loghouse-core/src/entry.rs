//! The fundamental unit of data in loghouse.

use serde::{Deserialize, Serialize};

/// A single log entry.
///
/// Entries are immutable once created. The `id` is assigned by the caller or
/// the ingester and must be globally unique; it is the unit of deduplication
/// during merged searches. `entry_json` is the raw payload as it entered the
/// system, with no schema imposed beyond being valid JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Globally unique entry id.
    pub id: String,

    /// Timestamp in milliseconds since epoch.
    pub timestamp_ms: i64,

    /// Raw JSON payload.
    pub entry_json: String,
}

impl LogEntry {
    pub fn new(id: impl Into<String>, timestamp_ms: i64, entry_json: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp_ms,
            entry_json: entry_json.into(),
        }
    }
}

/// Sorts entries ascending by timestamp, breaking ties by id so that the
/// order is stable across processes.
pub fn sort_oldest_first(entries: &mut [LogEntry]) {
    entries.sort_by(|a, b| {
        a.timestamp_ms
            .cmp(&b.timestamp_ms)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_is_stable_on_timestamp_ties() {
        let mut entries = vec![
            LogEntry::new("b", 200, "{}"),
            LogEntry::new("a", 200, "{}"),
            LogEntry::new("c", 100, "{}"),
        ];
        sort_oldest_first(&mut entries);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}

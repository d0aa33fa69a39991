//! The ingester service.
//!
//! Turns raw JSON payloads into log entries (assigning timestamp and id) and
//! replicates each entry to a random subset of appenders. An ingest only
//! succeeds once every chosen appender has accepted the entry.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::task::JoinSet;
use tonic::{Request, Response, Status};
use tracing::debug;

use loghouse_core::util::{now_ms, random_string};
use loghouse_core::LogEntry;
use loghouse_proto::loghouse as pb;

use crate::discovery::{AppenderHandle, Discovery};

const TIMESTAMP_FIELD: &str = "timestamp_ms";
const ID_SUFFIX_LENGTH: usize = 3;

/// Accepts raw log payloads and fans them out to appenders.
#[derive(Clone)]
pub struct IngesterService {
    discovery: Arc<Discovery>,
    fanout: usize,
}

impl IngesterService {
    /// Fails with `InvalidArgument` if the fanout is zero or exceeds the
    /// number of known appenders.
    pub fn new(discovery: Arc<Discovery>, fanout: usize) -> loghouse_core::Result<Self> {
        if fanout == 0 {
            return Err(loghouse_core::Error::InvalidArgument(
                "fanout must be positive".to_string(),
            ));
        }
        if fanout > discovery.len() {
            return Err(loghouse_core::Error::InvalidArgument(format!(
                "fanout {} exceeds the {} known appenders",
                fanout,
                discovery.len()
            )));
        }
        Ok(Self { discovery, fanout })
    }

    pub async fn ingest_entry(&self, entry_json: &str) -> Result<LogEntry, Status> {
        let entry = extract_entry(entry_json)?;
        debug!(id = %entry.id, "ingesting entry");

        let mut fanout: JoinSet<Result<(), Status>> = JoinSet::new();
        for appender in self.pick_appenders() {
            let entry = pb::LogEntry::from(entry.clone());
            fanout.spawn(async move { appender.append(entry).await });
        }

        while let Some(joined) = fanout.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(status)) => {
                    fanout.abort_all();
                    return Err(status);
                }
                Err(e) => {
                    fanout.abort_all();
                    return Err(Status::internal(format!("append panicked: {e}")));
                }
            }
        }
        Ok(entry)
    }

    fn pick_appenders(&self) -> Vec<Arc<dyn AppenderHandle>> {
        let mut appenders = self.discovery.appenders();
        appenders.shuffle(&mut rand::thread_rng());
        appenders.truncate(self.fanout);
        appenders
    }
}

/// Parses a raw payload into an entry: the timestamp comes from the
/// payload's `timestamp_ms` field or, absent that, the current wall clock;
/// the id is derived from the timestamp plus a random suffix.
fn extract_entry(entry_json: &str) -> Result<LogEntry, Status> {
    let value: serde_json::Value = serde_json::from_str(entry_json)
        .map_err(|e| Status::invalid_argument(format!("payload is not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(Status::invalid_argument(
            "payload must be a JSON object".to_string(),
        ));
    }

    let timestamp_ms = match value.get(TIMESTAMP_FIELD) {
        None => now_ms(),
        Some(field) => field.as_i64().ok_or_else(|| {
            Status::invalid_argument(format!("field {TIMESTAMP_FIELD} must be an integer"))
        })?,
    };

    let id = format!("{timestamp_ms}-{}", random_string(ID_SUFFIX_LENGTH));
    Ok(LogEntry::new(id, timestamp_ms, entry_json))
}

#[tonic::async_trait]
impl pb::ingester_server::Ingester for IngesterService {
    async fn ingest(
        &self,
        request: Request<pb::IngestRequest>,
    ) -> Result<Response<pb::IngestResponse>, Status> {
        let entry = self.ingest_entry(&request.into_inner().entry_json).await?;
        Ok(Response::new(pb::IngestResponse { id: entry.id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_uses_supplied_timestamp() {
        let entry = extract_entry(r#"{"timestamp_ms": 1234, "message": "foo"}"#).unwrap();
        assert_eq!(entry.timestamp_ms, 1234);
        assert!(entry.id.starts_with("1234-"));
        assert_eq!(entry.id.len(), "1234-".len() + ID_SUFFIX_LENGTH);
    }

    #[test]
    fn extract_defaults_to_wall_clock() {
        let before = now_ms();
        let entry = extract_entry(r#"{"message": "foo"}"#).unwrap();
        assert!(entry.timestamp_ms >= before);
    }

    #[test]
    fn extract_rejects_bad_payloads() {
        assert!(extract_entry("not json").is_err());
        assert!(extract_entry(r#""just a string""#).is_err());
        assert!(extract_entry(r#"{"timestamp_ms": "soon"}"#).is_err());
    }
}

//! Server configuration.
//!
//! Every knob has a default, so a bare config deserializes to a working
//! single-process setup: one local appender, in-memory storage, janitor off.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the gRPC server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Addresses of the appender shards the mixer and ingester talk to.
    /// Empty means the in-process appender is the only shard.
    #[serde(default)]
    pub appender_endpoints: Vec<String>,

    /// Entry count at which an open chunk closes.
    #[serde(default = "default_max_chunk_entries")]
    pub max_chunk_entries: usize,

    /// Maximum timestamp spread an open chunk accepts, in milliseconds.
    #[serde(default = "default_max_chunk_spread_ms")]
    pub max_chunk_spread_ms: i64,

    /// Wall-clock age at which an open chunk closes, in milliseconds.
    #[serde(default = "default_max_chunk_open_ms")]
    pub max_chunk_open_ms: u64,

    /// How long a stored chunk stays searchable on its appender, in
    /// milliseconds.
    #[serde(default = "default_closed_chunk_grace_ms")]
    pub closed_chunk_grace_ms: u64,

    /// How many appenders each ingested entry is replicated to.
    #[serde(default = "default_appender_fanout")]
    pub appender_fanout: usize,

    /// Cap on concurrent appender searches per mixer request.
    #[serde(default = "default_mixer_fanout_limit")]
    pub mixer_fanout_limit: usize,

    /// Whether this process runs the compaction loop.
    #[serde(default)]
    pub janitor_enabled: bool,

    /// Seconds between compaction cycles.
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,

    /// Maximum timestamp spread of a big chunk, in milliseconds.
    #[serde(default = "default_big_chunk_max_spread_ms")]
    pub big_chunk_max_spread_ms: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            appender_endpoints: Vec::new(),
            max_chunk_entries: default_max_chunk_entries(),
            max_chunk_spread_ms: default_max_chunk_spread_ms(),
            max_chunk_open_ms: default_max_chunk_open_ms(),
            closed_chunk_grace_ms: default_closed_chunk_grace_ms(),
            appender_fanout: default_appender_fanout(),
            mixer_fanout_limit: default_mixer_fanout_limit(),
            janitor_enabled: false,
            janitor_interval_secs: default_janitor_interval_secs(),
            big_chunk_max_spread_ms: default_big_chunk_max_spread_ms(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_max_chunk_entries() -> usize {
    10
}

fn default_max_chunk_spread_ms() -> i64 {
    5000
}

fn default_max_chunk_open_ms() -> u64 {
    3000
}

fn default_closed_chunk_grace_ms() -> u64 {
    1000
}

fn default_appender_fanout() -> usize {
    2
}

fn default_mixer_fanout_limit() -> usize {
    16
}

fn default_janitor_interval_secs() -> u64 {
    300
}

fn default_big_chunk_max_spread_ms() -> i64 {
    3_600_000
}

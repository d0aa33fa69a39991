//! The janitor: background compaction of small chunks into big ones.
//!
//! On every tick the janitor lists the stored small chunks, picks a prefix
//! that fits in one big chunk window, folds their entries into a single big
//! chunk, stores it, and only then deletes the smalls. Any failure aborts the
//! cycle with the store unchanged or strictly safer (the big chunk may exist
//! alongside its smalls; the mixer's dedup hides the overlap).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use loghouse_core::util::now_ms;
use loghouse_core::{ChunkId, SizeClass};
use loghouse_storage::{chunk_proto, ChunkStore, Result};

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Time between compaction cycles.
    pub interval: Duration,
    /// Maximum allowed distance between the oldest and newest entry of a
    /// big chunk. Also the settle time: chunks younger than this are left
    /// alone, since appenders may still produce overlapping smalls.
    pub big_chunk_max_spread_ms: i64,
}

pub struct Janitor {
    store: Arc<ChunkStore>,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(store: Arc<ChunkStore>, config: JanitorConfig) -> loghouse_core::Result<Self> {
        if config.big_chunk_max_spread_ms <= 0 {
            return Err(loghouse_core::Error::InvalidArgument(
                "big_chunk_max_spread_ms must be positive".to_string(),
            ));
        }
        Ok(Self { store, config })
    }

    /// Spawns the compaction loop. It runs until the shutdown channel fires;
    /// an in-flight cycle finishes before the task exits.
    pub fn start(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.config.interval, "janitor started");
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick is immediate

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_compaction_cycle().await {
                            warn!(error = %e, "compaction cycle failed");
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("janitor shutting down");
                        return;
                    }
                }
            }
        })
    }

    /// One compaction cycle. Public so operators (and tests) can force one.
    pub async fn run_compaction_cycle(&self) -> Result<()> {
        let started = Instant::now();
        let smalls = self.store.list_chunks(0, 0, SizeClass::Small).await?;
        debug!(count = smalls.len(), "listed small chunks");

        let selected = self.select_small_chunks(&smalls, now_ms());
        if selected.is_empty() {
            return Ok(());
        }
        info!(count = selected.len(), "compacting small chunks");

        let mut entries = Vec::new();
        for id in &selected {
            let chunk = self.store.load_chunk(id).await?;
            entries.extend(chunk.entries());
        }

        let big = chunk_proto(entries, SizeClass::Big)?;
        let big_id = self.store.store_chunk(&big).await?;
        info!(chunk = %big_id, "stored big chunk");

        // Deletes come strictly after the store, so a crash between the two
        // loses nothing.
        for id in &selected {
            self.store.delete_chunk(id).await?;
        }

        info!(
            count = selected.len(),
            elapsed = ?started.elapsed(),
            "compaction cycle finished"
        );
        Ok(())
    }

    /// Picks the prefix of `ids` (sorted ascending by start) that fits in one
    /// big chunk window anchored at the first candidate's start.
    fn select_small_chunks(&self, ids: &[ChunkId], now_ms: i64) -> Vec<ChunkId> {
        let spread = self.config.big_chunk_max_spread_ms;
        let mut selected = Vec::new();
        let mut window_end: Option<i64> = None;

        for id in ids {
            // Too recent: appenders may still emit chunks in this region.
            if id.start_ms() > now_ms - spread {
                break;
            }
            let end = match window_end {
                None => *window_end.insert(id.start_ms() + spread),
                Some(end) => {
                    if id.start_ms() > end {
                        break;
                    }
                    end
                }
            };
            // Starts inside the window but would stretch past it; skip it and
            // keep looking for smaller chunks that still fit.
            if id.end_ms() > end {
                continue;
            }
            selected.push(id.clone());
        }

        selected
    }
}

//! The mixer service.
//!
//! Fans a search out to every appender shard and, in parallel, lists the
//! stored chunks overlapping the query window, then k-way merges everything
//! into one ordered, deduplicated result. The first failure anywhere aborts
//! the whole search.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tonic::{Request, Response, Status};
use tracing::debug;

use loghouse_core::{ChunkId, LogEntry, SizeClass};
use loghouse_proto::loghouse as pb;
use loghouse_storage::ChunkStore;

use crate::discovery::Discovery;
use crate::services::merge::{into_sorted_run, merge, MergeQuery};
use crate::services::status_from_error;

/// Merges search results across all appenders and stored chunks.
#[derive(Clone)]
pub struct MixerService {
    store: Arc<ChunkStore>,
    discovery: Arc<Discovery>,
    fanout_limit: usize,
}

impl MixerService {
    pub fn new(store: Arc<ChunkStore>, discovery: Arc<Discovery>, fanout_limit: usize) -> Self {
        Self {
            store,
            discovery,
            fanout_limit: fanout_limit.max(1),
        }
    }

    pub async fn merged_search(
        &self,
        request: pb::SearchRequest,
    ) -> Result<Vec<pb::LogEntry>, Status> {
        if request.start_ms != 0 && request.end_ms != 0 && request.start_ms > request.end_ms {
            return Err(Status::invalid_argument(format!(
                "invalid time range: start={}, end={}",
                request.start_ms, request.end_ms
            )));
        }
        let num = request.num as usize;
        if num == 0 {
            return Ok(Vec::new());
        }

        // Chunk listing runs alongside the appender fan-out.
        let list_task = {
            let store = Arc::clone(&self.store);
            let (start_ms, end_ms) = (request.start_ms, request.end_ms);
            tokio::spawn(async move {
                let mut ids = store
                    .list_chunks(start_ms, end_ms, SizeClass::Small)
                    .await
                    .map_err(status_from_error)?;
                ids.extend(
                    store
                        .list_chunks(start_ms, end_ms, SizeClass::Big)
                        .await
                        .map_err(status_from_error)?,
                );
                Ok::<Vec<ChunkId>, Status>(ids)
            })
        };

        let semaphore = Arc::new(Semaphore::new(self.fanout_limit));
        let mut fanout: JoinSet<Result<Vec<LogEntry>, Status>> = JoinSet::new();
        for appender in self.discovery.appenders() {
            let request = request.clone();
            let semaphore = Arc::clone(&semaphore);
            fanout.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| Status::internal("search aborted"))?;
                let hits = appender.search(request).await?;
                Ok(hits.into_iter().map(LogEntry::from).collect())
            });
        }

        let mut appender_hits = Vec::new();
        while let Some(joined) = fanout.join_next().await {
            let hits = match joined {
                Ok(Ok(hits)) => hits,
                Ok(Err(status)) => {
                    fanout.abort_all();
                    list_task.abort();
                    return Err(status);
                }
                Err(e) => {
                    fanout.abort_all();
                    list_task.abort();
                    return Err(Status::internal(format!("appender search panicked: {e}")));
                }
            };
            if !hits.is_empty() {
                appender_hits.push(into_sorted_run(hits));
            }
        }

        let chunk_ids = list_task
            .await
            .map_err(|e| Status::internal(format!("chunk listing failed: {e}")))??;
        debug!(
            appenders = self.discovery.len(),
            chunks = chunk_ids.len(),
            "merging search results"
        );

        let merge_query = MergeQuery {
            query: request.query.clone(),
            num,
            start_ms: request.start_ms,
            end_ms: request.end_ms,
        };
        let merged = merge(&self.store, &merge_query, appender_hits, chunk_ids)
            .await
            .map_err(status_from_error)?;

        Ok(merged.into_iter().map(pb::LogEntry::from).collect())
    }
}

#[tonic::async_trait]
impl pb::mixer_server::Mixer for MixerService {
    async fn search(
        &self,
        request: Request<pb::SearchRequest>,
    ) -> Result<Response<pb::SearchResponse>, Status> {
        let entries = self.merged_search(request.into_inner()).await?;
        Ok(Response::new(pb::SearchResponse { entries }))
    }
}

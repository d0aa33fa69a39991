//! Appender discovery.
//!
//! Mixers and ingesters address appenders through [`AppenderHandle`], so a
//! shard can live behind a gRPC channel or in the same process. The set of
//! shards is fixed at startup.

use std::sync::Arc;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::info;

use loghouse_proto::loghouse as pb;
use loghouse_proto::loghouse::appender_client::AppenderClient;

use crate::services::appender::AppenderService;
use crate::services::status_from_error;

/// One reachable appender shard.
#[async_trait]
pub trait AppenderHandle: Send + Sync {
    async fn append(&self, entry: pb::LogEntry) -> Result<(), Status>;
    async fn search(&self, request: pb::SearchRequest) -> Result<Vec<pb::LogEntry>, Status>;
}

/// An appender reached over gRPC.
pub struct RemoteAppender {
    client: AppenderClient<Channel>,
}

impl RemoteAppender {
    /// Connects lazily, so the target may come up after us.
    pub fn connect(addr: &str) -> loghouse_core::Result<Self> {
        let endpoint = Endpoint::from_shared(addr.to_string()).map_err(|e| {
            loghouse_core::Error::InvalidArgument(format!("bad appender address {addr}: {e}"))
        })?;
        info!(addr, "registering remote appender");
        Ok(Self {
            client: AppenderClient::new(endpoint.connect_lazy()),
        })
    }
}

#[async_trait]
impl AppenderHandle for RemoteAppender {
    async fn append(&self, entry: pb::LogEntry) -> Result<(), Status> {
        let mut client = self.client.clone();
        client
            .append(pb::AppendRequest { entry: Some(entry) })
            .await?;
        Ok(())
    }

    async fn search(&self, request: pb::SearchRequest) -> Result<Vec<pb::LogEntry>, Status> {
        let mut client = self.client.clone();
        let response = client.search(request).await?;
        Ok(response.into_inner().entries)
    }
}

/// An appender running in this process, bypassing the network.
pub struct LocalAppender {
    service: AppenderService,
}

impl LocalAppender {
    pub fn new(service: AppenderService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl AppenderHandle for LocalAppender {
    async fn append(&self, entry: pb::LogEntry) -> Result<(), Status> {
        self.service
            .append_entry(entry.into())
            .await
            .map_err(status_from_error)
    }

    async fn search(&self, request: pb::SearchRequest) -> Result<Vec<pb::LogEntry>, Status> {
        let entries = self
            .service
            .search_open_chunks(&request)
            .await
            .map_err(status_from_error)?;
        Ok(entries.into_iter().map(pb::LogEntry::from).collect())
    }
}

/// The fixed set of appender shards this process knows about.
pub struct Discovery {
    appenders: Vec<Arc<dyn AppenderHandle>>,
}

impl Discovery {
    pub fn new(appenders: Vec<Arc<dyn AppenderHandle>>) -> Self {
        Self { appenders }
    }

    /// Builds a discovery over remote appenders at the supplied addresses.
    pub fn from_endpoints(addrs: &[String]) -> loghouse_core::Result<Self> {
        let mut appenders: Vec<Arc<dyn AppenderHandle>> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            appenders.push(Arc::new(RemoteAppender::connect(addr)?));
        }
        Ok(Self { appenders })
    }

    pub fn appenders(&self) -> Vec<Arc<dyn AppenderHandle>> {
        self.appenders.clone()
    }

    pub fn len(&self) -> usize {
        self.appenders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appenders.is_empty()
    }
}

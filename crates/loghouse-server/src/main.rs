//! Loghouse gRPC Server
//!
//! Main entry point for the loghouse log storage and search service.
//!
//! ## Overview
//! One process hosts the appender, mixer and ingester gRPC services over a
//! shared chunk store, and optionally the janitor compaction loop. A cluster
//! is a set of these processes pointed at the same storage bucket, with the
//! mixers and ingesters configured with the appenders' addresses.
//!
//! ## Configuration
//! All configuration is done via environment variables:
//!
//! ### Server Settings
//! - `LOGHOUSE_ADDR`: Server bind address (default: 0.0.0.0:9090)
//! - `LOGHOUSE_APPENDERS`: Comma-separated appender addresses for the mixer
//!   and ingester. Empty means the in-process appender is the only shard.
//! - `LOGHOUSE_FANOUT`: Appenders each ingested entry is replicated to
//!   (default: min(2, number of shards))
//!
//! ### Storage Settings
//! - `LOGHOUSE_BUCKET`: S3 bucket name (default: loghouse)
//! - `AWS_REGION`: AWS region (default: us-east-1)
//! - `USE_LOCAL_STORAGE`: Use local filesystem instead of S3 (any value)
//! - `LOCAL_STORAGE_PATH`: Path for local storage (default: ./data/chunks)
//!
//! ### Chunk Settings
//! - `LOGHOUSE_CHUNK_MAX_ENTRIES`: Entries at which an open chunk closes
//! - `LOGHOUSE_CHUNK_MAX_SPREAD_MS`: Max timestamp spread of an open chunk
//! - `LOGHOUSE_CHUNK_MAX_OPEN_MS`: Max wall-clock age of an open chunk
//!
//! ### Janitor Settings
//! - `LOGHOUSE_JANITOR`: Run the compaction loop in this process (any value)
//! - `LOGHOUSE_JANITOR_INTERVAL_SECS`: Seconds between compaction cycles
//! - `LOGHOUSE_BIG_CHUNK_MAX_SPREAD_MS`: Max timestamp spread of a big chunk
//!
//! ## Logging
//! Logging is controlled via the `RUST_LOG` environment variable.

use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Server;

use loghouse_proto::loghouse::appender_server::AppenderServer;
use loghouse_proto::loghouse::ingester_server::IngesterServer;
use loghouse_proto::loghouse::mixer_server::MixerServer;
use loghouse_server::{
    AppenderService, ChunkPolicy, Discovery, IngesterService, Janitor, JanitorConfig,
    LocalAppender, MixerService, ServerConfig,
};
use loghouse_storage::{ChunkStore, StorageMetrics};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env()?;
    let bind_addr = config.bind_addr.parse()?;

    // Object store backend.
    let bucket = std::env::var("LOGHOUSE_BUCKET").unwrap_or_else(|_| "loghouse".to_string());
    let backend: Arc<dyn object_store::ObjectStore> =
        if std::env::var("USE_LOCAL_STORAGE").is_ok() {
            let local_path =
                std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./data/chunks".to_string());
            tracing::info!("Using local storage at {}", local_path);
            std::fs::create_dir_all(&local_path)?;
            Arc::new(object_store::local::LocalFileSystem::new_with_prefix(
                local_path,
            )?)
        } else {
            tracing::info!("Using S3 storage (bucket: {})", bucket);
            let s3 = object_store::aws::AmazonS3Builder::from_env()
                .with_bucket_name(&bucket)
                .build()?;
            Arc::new(s3)
        };

    let registry = prometheus::Registry::new();
    let metrics = Arc::new(StorageMetrics::new(&registry)?);
    let store = Arc::new(ChunkStore::new(backend, metrics));

    // The in-process appender shard.
    let appender = AppenderService::new(
        Arc::clone(&store),
        ChunkPolicy {
            max_entries: config.max_chunk_entries,
            max_spread_ms: config.max_chunk_spread_ms,
            max_open_ms: config.max_chunk_open_ms,
        },
        Duration::from_millis(config.closed_chunk_grace_ms),
    )?;

    // The shard set: remote appenders if configured, otherwise just us.
    let discovery = if config.appender_endpoints.is_empty() {
        Arc::new(Discovery::new(vec![Arc::new(LocalAppender::new(
            appender.clone(),
        ))]))
    } else {
        Arc::new(Discovery::from_endpoints(&config.appender_endpoints)?)
    };
    let fanout = config.appender_fanout.min(discovery.len());

    let mixer = MixerService::new(
        Arc::clone(&store),
        Arc::clone(&discovery),
        config.mixer_fanout_limit,
    );
    let ingester = IngesterService::new(Arc::clone(&discovery), fanout)?;

    // Janitor, if this process is the one running compaction.
    let (janitor_shutdown_tx, janitor_handle) = if config.janitor_enabled {
        let janitor = Arc::new(Janitor::new(
            Arc::clone(&store),
            JanitorConfig {
                interval: Duration::from_secs(config.janitor_interval_secs),
                big_chunk_max_spread_ms: config.big_chunk_max_spread_ms,
            },
        )?);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = janitor.start(rx);
        (Some(tx), Some(handle))
    } else {
        (None, None)
    };

    tracing::info!("Loghouse server starting on {}", bind_addr);
    tracing::info!("  Shards: {}", discovery.len());
    tracing::info!("  Fanout: {}", fanout);
    tracing::info!("  Janitor: {}", config.janitor_enabled);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            },
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            },
        }

        let _ = shutdown_tx.send(());
    });

    Server::builder()
        .add_service(AppenderServer::new(appender))
        .add_service(MixerServer::new(mixer))
        .add_service(IngesterServer::new(ingester))
        .serve_with_shutdown(bind_addr, async {
            shutdown_rx.await.ok();
        })
        .await?;

    // Let an in-flight compaction cycle finish before exiting.
    if let Some(tx) = janitor_shutdown_tx {
        let _ = tx.send(());
    }
    if let Some(handle) = janitor_handle {
        let _ = handle.await;
    }

    tracing::info!("Loghouse server shut down gracefully");
    Ok(())
}

fn config_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Ok(addr) = std::env::var("LOGHOUSE_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(appenders) = std::env::var("LOGHOUSE_APPENDERS") {
        config.appender_endpoints = appenders
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Ok(v) = std::env::var("LOGHOUSE_FANOUT") {
        config.appender_fanout = v.parse()?;
    }
    if let Ok(v) = std::env::var("LOGHOUSE_CHUNK_MAX_ENTRIES") {
        config.max_chunk_entries = v.parse()?;
    }
    if let Ok(v) = std::env::var("LOGHOUSE_CHUNK_MAX_SPREAD_MS") {
        config.max_chunk_spread_ms = v.parse()?;
    }
    if let Ok(v) = std::env::var("LOGHOUSE_CHUNK_MAX_OPEN_MS") {
        config.max_chunk_open_ms = v.parse()?;
    }
    if let Ok(v) = std::env::var("LOGHOUSE_GRACE_MS") {
        config.closed_chunk_grace_ms = v.parse()?;
    }
    config.janitor_enabled = std::env::var("LOGHOUSE_JANITOR").is_ok();
    if let Ok(v) = std::env::var("LOGHOUSE_JANITOR_INTERVAL_SECS") {
        config.janitor_interval_secs = v.parse()?;
    }
    if let Ok(v) = std::env::var("LOGHOUSE_BIG_CHUNK_MAX_SPREAD_MS") {
        config.big_chunk_max_spread_ms = v.parse()?;
    }

    Ok(config)
}

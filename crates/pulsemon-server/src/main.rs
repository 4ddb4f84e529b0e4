use anyhow::Result;
use pulsemon_common::proto::metric_sync_server::MetricSyncServer;
use pulsemon_server::app::SyncApp;
use pulsemon_server::grpc::MetricSyncImpl;
use pulsemon_server::{api, config};
use pulsemon_storage::mem::MemStorage;
use pulsemon_storage::snapshot::{restore, FileDumper};
use pulsemon_storage::sqlite::SqliteStorage;
use pulsemon_storage::MetricStore;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tonic::transport::Server as TonicServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulsemon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = config::ServerConfig::load(&config_path)?;

    tracing::info!(
        grpc_port = config.grpc_port,
        http_port = config.http_port,
        store_file = %config.store_file,
        store_interval_secs = config.store_interval_secs,
        signing = !config.key.is_empty(),
        "pulsemon-server starting"
    );

    let store: Arc<dyn MetricStore> = match &config.sqlite_path {
        Some(path) => {
            tracing::info!(path = %path, "Using SQLite storage backend");
            Arc::new(SqliteStorage::open(Path::new(path))?)
        }
        None => Arc::new(MemStorage::new()),
    };

    // The durable backend already holds its state; the snapshot file only
    // seeds the in-memory store.
    if config.restore && config.sqlite_path.is_none() {
        let snapshot = restore(Path::new(&config.store_file))?;
        if !snapshot.is_empty() {
            store.bulk_put(&snapshot)?;
            tracing::info!(count = snapshot.len(), "Restored metrics from snapshot");
        }
    }

    let dumper = Arc::new(FileDumper::new(&config.store_file));
    let sync_dump = config.store_interval_secs == 0;
    let app = Arc::new(
        SyncApp::new(store)
            .with_dumper(dumper)
            .with_key(config.key.clone())
            .with_sync_dump(sync_dump),
    );
    let dump_loop = if sync_dump {
        None
    } else {
        Some(app.spawn_dump_loop(Duration::from_secs(config.store_interval_secs)))
    };

    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], config.grpc_port));

    let router = api::build_router(Arc::clone(&app));
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_server = axum::serve(listener, router);

    let grpc_service = MetricSyncServer::new(MetricSyncImpl::new(Arc::clone(&app)));
    let grpc_server = TonicServer::builder()
        .add_service(grpc_service)
        .serve(grpc_addr);

    tracing::info!(%http_addr, %grpc_addr, "Listening");

    tokio::select! {
        result = http_server => result?,
        result = grpc_server => result?,
        _ = signal::ctrl_c() => {
            tracing::info!("Shutting down gracefully");
        }
    }

    // stop the periodic snapshot task before the final dump so no new
    // dump can start after it, then drain whatever is still in flight
    if let Some(handle) = dump_loop {
        handle.abort();
        let _ = handle.await;
    }
    app.safe_dump();
    if let Err(e) = app.close() {
        tracing::warn!(error = %e, "Could not close snapshot sink");
    }

    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! slipwayd — the Slipway orchestration worker.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use slipway_adapters::stream::{CONSUMER_GROUP, STREAM_NAME};
use slipway_adapters::{
    ClusterError, CommandStream, KubeDriver, RedisStatusStore, StatusStoreError, StreamError,
};
use slipway_backend::{BackendError, HttpAuth, HttpBackend};
use slipway_core::SystemClock;
use slipway_worker::consumer::spawn_signal_handler;
use slipway_worker::{Consumer, Dispatcher, DispatcherDeps, WorkerConfig};

#[derive(Debug, Error)]
enum StartupError {
    #[error("cluster driver: {0}")]
    Cluster(#[from] ClusterError),
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("status store: {0}")]
    StatusStore(#[from] StatusStoreError),
    #[error("command stream: {0}")]
    Stream(#[from] StreamError),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerConfig::load();
    tracing::info!(
        registry = %config.registry_url,
        gateway = %config.gateway_url,
        namespace = %config.namespace,
        consumer = %config.consumer_name,
        "starting slipway worker"
    );

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "worker failed to start");
        std::process::exit(1);
    }
}

async fn run(config: WorkerConfig) -> Result<(), StartupError> {
    let cluster = KubeDriver::connect(&config.namespace).await?;
    let backend = HttpBackend::new()?;
    let auth = HttpAuth::new(slipway_worker::env::auth_service_url())?;
    let status = RedisStatusStore::connect(&config.redis_url).await?;
    let stream = CommandStream::connect(
        &config.redis_url,
        STREAM_NAME,
        CONSUMER_GROUP,
        &config.consumer_name,
    )
    .await?;

    let dispatcher = Dispatcher::new(
        DispatcherDeps { cluster, backend, auth, status },
        SystemClock,
        config,
    );

    let mut consumer = Consumer::new(stream, dispatcher);
    spawn_signal_handler(consumer.shutdown_flag());
    consumer.run().await;
    Ok(())
}

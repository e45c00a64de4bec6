// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's main loop: claim, dispatch, acknowledge.
//!
//! One message is in flight at a time. The dispatcher records every outcome
//! before returning, so the loop acknowledges unconditionally — a poison
//! message is never redelivered; its failure is visible in the status
//! records instead. Shutdown flips the run flag and lets the in-flight
//! command finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slipway_adapters::stream::is_connection_error;
use slipway_adapters::{ClusterDriver, CommandStream, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::Clock;

use crate::dispatcher::Dispatcher;

/// Pause after a connection-level stream error before retrying.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Pause after an unexpected stream error before retrying.
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Stream consumer driving the dispatcher.
pub struct Consumer<K, B, A, S, C: Clock> {
    stream: CommandStream,
    dispatcher: Dispatcher<K, B, A, S, C>,
    running: Arc<AtomicBool>,
}

impl<K, B, A, S, C> Consumer<K, B, A, S, C>
where
    K: ClusterDriver,
    B: BackendApi,
    A: AuthApi,
    S: StatusStore,
    C: Clock,
{
    pub fn new(stream: CommandStream, dispatcher: Dispatcher<K, B, A, S, C>) -> Self {
        Self { stream, dispatcher, running: Arc::new(AtomicBool::new(true)) }
    }

    /// Handle that flips the run flag from a signal task.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until the flag is cleared. The blocking read times out every
    /// second, which bounds how long shutdown waits when idle.
    pub async fn run(&mut self) {
        tracing::info!("worker listening for orchestration commands");

        while self.running.load(Ordering::SeqCst) {
            match self.stream.read_one().await {
                Ok(Some(message)) => {
                    tracing::info!(msg_id = %message.id, "claimed orchestration command");
                    if let Err(e) = self.dispatcher.dispatch(&message.fields).await {
                        // Already recorded in the status stores; the loop
                        // only needs to move on.
                        tracing::warn!(msg_id = %message.id, error = %e, "command ended in failure");
                    }
                    if let Err(e) = self.stream.ack(&message.id).await {
                        tracing::error!(msg_id = %message.id, error = %e, "failed to acknowledge message");
                    }
                }
                Ok(None) => {}
                Err(e) if is_connection_error(&e) => {
                    tracing::error!(error = %e, "stream connection error, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "stream read error");
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
            }
        }

        tracing::info!("worker stopped");
    }
}

/// Clear the run flag when SIGINT or SIGTERM arrives.
pub fn spawn_signal_handler(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut interrupt = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => tracing::info!("received SIGINT, shutting down gracefully"),
            _ = terminate.recv() => tracing::info!("received SIGTERM, shutting down gracefully"),
        }
        flag.store(false, Ordering::SeqCst);
    });
}

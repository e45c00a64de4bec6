// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volatile per-agent status store.
//!
//! Statuses live as Redis hashes under `agent:status:<agent_name>` with a
//! 24 h TTL refreshed on every write. Writes are best-effort: the dispatcher
//! logs failures and carries on, so the store must never be load-bearing.
//! Callers pass only present fields — the store never sees nulls.

use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

/// TTL applied to every agent status hash.
pub const AGENT_STATUS_TTL_SECS: i64 = 86_400;

/// Errors from status store operations.
#[derive(Debug, Error)]
pub enum StatusStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Key for an agent's volatile status hash.
pub fn agent_status_key(agent_name: &str) -> String {
    format!("agent:status:{agent_name}")
}

/// Store for volatile agent status records.
#[async_trait]
pub trait StatusStore: Send + Sync + 'static {
    /// Write the status hash for an agent and refresh its TTL.
    async fn set_agent_status(
        &self,
        agent_name: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<(), StatusStoreError>;
}

/// Redis-backed status store.
///
/// The connection manager multiplexes and reconnects internally, so this is
/// cheap to clone and share across the worker.
#[derive(Clone)]
pub struct RedisStatusStore {
    conn: ConnectionManager,
}

impl RedisStatusStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StatusStoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn set_agent_status(
        &self,
        agent_name: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<(), StatusStoreError> {
        let key = agent_status_key(agent_name);
        let items: Vec<(String, String)> = fields.into_iter().collect();

        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(&key, &items).await?;
        let _: () = conn.expire(&key, AGENT_STATUS_TTL_SECS).await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeStatusStoreState {
        writes: Vec<(String, BTreeMap<String, String>)>,
        fail_writes: bool,
    }

    /// Recording status store for tests.
    #[derive(Clone, Default)]
    pub struct FakeStatusStore {
        inner: Arc<Mutex<FakeStatusStoreState>>,
    }

    impl FakeStatusStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent write fail (the store is best-effort, so
        /// flows must survive this).
        pub fn fail_writes(&self) {
            self.inner.lock().fail_writes = true;
        }

        /// Every write in order, across all agents.
        pub fn writes(&self) -> Vec<(String, BTreeMap<String, String>)> {
            self.inner.lock().writes.clone()
        }

        /// All status values written for one agent, in order.
        pub fn statuses_for(&self, agent_name: &str) -> Vec<String> {
            self.inner
                .lock()
                .writes
                .iter()
                .filter(|(name, _)| name == agent_name)
                .filter_map(|(_, fields)| fields.get("status").cloned())
                .collect()
        }

        /// Most recent field map written for one agent.
        pub fn last_for(&self, agent_name: &str) -> Option<BTreeMap<String, String>> {
            self.inner
                .lock()
                .writes
                .iter()
                .rev()
                .find(|(name, _)| name == agent_name)
                .map(|(_, fields)| fields.clone())
        }
    }

    #[async_trait]
    impl StatusStore for FakeStatusStore {
        async fn set_agent_status(
            &self,
            agent_name: &str,
            fields: BTreeMap<String, String>,
        ) -> Result<(), StatusStoreError> {
            let mut state = self.inner.lock();
            if state.fail_writes {
                return Err(StatusStoreError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "fake status store write failure",
                ))));
            }
            state.writes.push((agent_name.to_string(), fields));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeStatusStore;

#[cfg(test)]
#[path = "status_store_tests.rs"]
mod tests;

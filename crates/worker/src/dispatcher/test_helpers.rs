// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for dispatcher tests.

use std::collections::HashMap;

use slipway_adapters::{FakeCluster, FakeStatusStore};
use slipway_backend::{FakeAuth, FakeBackend};
use slipway_core::FakeClock;

use crate::config::WorkerConfig;
use crate::dispatcher::{Dispatcher, DispatcherDeps};

/// Deterministic timestamp used by every dispatcher test.
pub(crate) const TEST_EPOCH: u64 = 1_700_000_000;

pub(crate) type TestDispatcher =
    Dispatcher<FakeCluster, FakeBackend, FakeAuth, FakeStatusStore, FakeClock>;

pub(crate) struct TestContext {
    pub cluster: FakeCluster,
    pub backend: FakeBackend,
    pub auth: FakeAuth,
    pub status: FakeStatusStore,
    pub clock: FakeClock,
    pub dispatcher: TestDispatcher,
}

pub(crate) fn setup() -> TestContext {
    setup_with(WorkerConfig::for_tests())
}

pub(crate) fn setup_with(config: WorkerConfig) -> TestContext {
    let cluster = FakeCluster::new();
    let backend = FakeBackend::new();
    let auth = FakeAuth::new();
    let status = FakeStatusStore::new();
    let clock = FakeClock::new();
    clock.set_epoch_secs(TEST_EPOCH);

    let dispatcher = Dispatcher::new(
        DispatcherDeps {
            cluster: cluster.clone(),
            backend: backend.clone(),
            auth: auth.clone(),
            status: status.clone(),
        },
        clock.clone(),
        config,
    );

    TestContext { cluster, backend, auth, status, clock, dispatcher }
}

pub(crate) fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// A deploy command for agent `myA` owned by `u1`.
pub(crate) fn deploy_fields() -> HashMap<String, String> {
    fields(&[
        ("action", "deploy_agent"),
        ("agent_name", "myA"),
        ("agent_path", "/app/agents/myA/v1.0.0"),
        ("owner_id", "u1"),
        ("upload_id", "up1"),
        ("upload_type", "zip"),
    ])
}

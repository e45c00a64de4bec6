// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! slipway-adapters: external-system adapters for the orchestration worker.
//!
//! Each adapter is a trait at the seam, a production implementation, and a
//! recording fake behind the `test-support` feature:
//!
//! - [`ClusterDriver`] — build jobs, deployments, config-maps ([`KubeDriver`])
//! - [`StatusStore`] — volatile per-agent status hashes ([`RedisStatusStore`])
//! - [`CommandStream`] — the durable orchestration command stream
//! - [`subprocess`] — external tool invocation (injector, card generator)

pub mod cluster;
pub mod kube;
pub mod status_store;
pub mod stream;
pub mod subprocess;

#[cfg(any(test, feature = "test-support"))]
pub use cluster::FakeCluster;
pub use cluster::{BuildJobSpec, BuildSource, ClusterDriver, ClusterError, DeploySpec, JobPhase};
pub use kube::KubeDriver;
#[cfg(any(test, feature = "test-support"))]
pub use status_store::FakeStatusStore;
pub use status_store::{RedisStatusStore, StatusStore, StatusStoreError};
pub use stream::{CommandStream, StreamError, StreamMessage};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! slipway-backend: HTTP clients for the platform's own services.
//!
//! Two seams: [`BackendApi`] (upload status, build/deployment records,
//! registry, version mapping, tarball download) and [`AuthApi`] (per-agent
//! owner permissions). Per the orchestration contract, operations return a
//! boolean or a nullable identifier; failures are logged, never raised.
//! The dispatcher decides which of them gate later steps.

pub mod auth;
pub mod client;

#[cfg(any(test, feature = "test-support"))]
pub use auth::FakeAuth;
pub use auth::{AuthApi, HttpAuth};
#[cfg(any(test, feature = "test-support"))]
pub use client::FakeBackend;
pub use client::{BackendApi, BackendError, HttpBackend};

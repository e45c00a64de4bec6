// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity service client.
//!
//! One operation: create owner permissions for a freshly registered agent.
//! Permission failures never fail the flow; the completion payload records
//! the boolean so operators can repair ownership later.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::BackendError;

const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// The identity service's agent-permissions API.
#[async_trait]
pub trait AuthApi: Send + Sync + 'static {
    /// `POST /auth/agents/<agent_id>/permissions?owner_id=<id>`
    async fn create_agent_permissions(&self, agent_id: &str, owner_id: &str) -> bool;
}

/// reqwest-backed implementation of [`AuthApi`].
#[derive(Clone)]
pub struct HttpAuth {
    http: reqwest::Client,
    service_url: String,
}

impl HttpAuth {
    pub fn new(service_url: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(AUTH_TIMEOUT).build()?,
            service_url: service_url.into(),
        })
    }
}

#[async_trait]
impl AuthApi for HttpAuth {
    async fn create_agent_permissions(&self, agent_id: &str, owner_id: &str) -> bool {
        let url = format!(
            "{}/auth/agents/{agent_id}/permissions",
            self.service_url.trim_end_matches('/')
        );

        match self.http.post(&url).query(&[("owner_id", owner_id)]).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(%agent_id, %owner_id, "created agent permissions");
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                tracing::warn!(%agent_id, %status, detail = %detail, "permission creation rejected");
                false
            }
            Err(e) => {
                tracing::warn!(%agent_id, error = %e, "permission creation failed");
                false
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeAuthState {
        grants: Vec<(String, String)>,
        fail: bool,
    }

    /// Recording auth client for tests.
    #[derive(Clone, Default)]
    pub struct FakeAuth {
        inner: Arc<Mutex<FakeAuthState>>,
    }

    impl FakeAuth {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make permission creation report failure.
        pub fn fail_grants(&self) {
            self.inner.lock().fail = true;
        }

        /// `(agent_id, owner_id)` pairs granted so far.
        pub fn grants(&self) -> Vec<(String, String)> {
            self.inner.lock().grants.clone()
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn create_agent_permissions(&self, agent_id: &str, owner_id: &str) -> bool {
            let mut state = self.inner.lock();
            if state.fail {
                return false;
            }
            state.grants.push((agent_id.to_string(), owner_id.to_string()));
            true
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAuth;

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;

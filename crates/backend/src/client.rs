// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend API client.
//!
//! Thin wrapper over the backend's REST endpoints. Every operation takes the
//! base URL explicitly because a command may override the configured one.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use slipway_core::records::{
    BuildStatusUpdate, DeploymentStatusUpdate, NewBuildRecord, NewDeploymentRecord,
    UploadStatusUpdate,
};
use slipway_core::status::VersionState;

/// Timeout for record and registry calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for tarball downloads, which move real bytes.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while constructing the client. Operational failures are
/// logged and folded into the boolean/nullable return values instead.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The platform backend's orchestration-facing API.
#[async_trait]
pub trait BackendApi: Send + Sync + 'static {
    /// `PUT /api/v1/upload-status/agent/<name>/latest`
    async fn update_upload_status(
        &self,
        base_url: &str,
        agent_name: &str,
        update: &UploadStatusUpdate,
    ) -> bool;

    /// `POST /api/v1/agents/build` — returns the new record id.
    async fn create_build_record(&self, base_url: &str, record: &NewBuildRecord)
        -> Option<String>;

    /// `PUT /api/v1/agents/build/<id>/status`
    async fn update_build_status(
        &self,
        base_url: &str,
        build_id: &str,
        update: &BuildStatusUpdate,
    ) -> bool;

    /// `POST /api/v1/agents/deploy` — returns the new record id.
    async fn create_deployment_record(
        &self,
        base_url: &str,
        record: &NewDeploymentRecord,
    ) -> Option<String>;

    /// `PUT /api/v1/agents/deployment/<id>/status`
    async fn update_deployment_status(
        &self,
        base_url: &str,
        deployment_id: &str,
        update: &DeploymentStatusUpdate,
    ) -> bool;

    /// `PUT /api/v1/registry/agent/<name>` with the AgentCard-derived body.
    async fn register_agent(&self, base_url: &str, agent_name: &str, document: &Value) -> bool;

    /// `PUT /api/v1/registry/agent/<name>/version/status`
    async fn update_registry_version_status(
        &self,
        base_url: &str,
        agent_name: &str,
        status: VersionState,
    ) -> bool;

    /// `GET /api/v1/agents/build/version-mapping` — the immutable image tag
    /// recorded for `(agent_id, semantic_version)`, if any.
    async fn resolve_version_mapping(
        &self,
        base_url: &str,
        agent_id: &str,
        semantic_version: &str,
    ) -> Option<String>;

    /// `GET /api/v1/agents/<name>/download[?version=]` — gzipped tarball of
    /// the agent's uploaded files.
    async fn download_agent_tarball(
        &self,
        base_url: &str,
        agent_name: &str,
        version: Option<&str>,
    ) -> Option<Vec<u8>>;
}

/// reqwest-backed implementation of [`BackendApi`].
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    download: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?,
            download: reqwest::Client::builder().timeout(DOWNLOAD_TIMEOUT).build()?,
        })
    }

    /// PUT a JSON body, reporting success as a boolean.
    async fn put_json(&self, url: String, body: &Value, what: &str) -> bool {
        match self.http.put(&url).json(body).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                tracing::warn!(%url, %status, detail = %detail, "{what} rejected");
                false
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "{what} failed");
                false
            }
        }
    }

    /// POST a JSON body, returning the created record's `_id`.
    async fn post_for_id(&self, url: String, body: &Value, what: &str) -> Option<String> {
        match self.http.post(&url).json(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                let value: Value = resp.json().await.ok()?;
                value.get("_id").and_then(Value::as_str).map(str::to_string)
            }
            Ok(resp) => {
                tracing::warn!(%url, status = %resp.status(), "{what} rejected");
                None
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "{what} failed");
                None
            }
        }
    }
}

fn api(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn update_upload_status(
        &self,
        base_url: &str,
        agent_name: &str,
        update: &UploadStatusUpdate,
    ) -> bool {
        let url = api(base_url, &format!("/api/v1/upload-status/agent/{agent_name}/latest"));
        let body = match serde_json::to_value(update) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "upload status not serializable");
                return false;
            }
        };
        self.put_json(url, &body, "upload status update").await
    }

    async fn create_build_record(
        &self,
        base_url: &str,
        record: &NewBuildRecord,
    ) -> Option<String> {
        let url = api(base_url, "/api/v1/agents/build");
        let body = serde_json::to_value(record).ok()?;
        let id = self.post_for_id(url, &body, "build record creation").await;
        if let Some(ref id) = id {
            tracing::info!(agent_id = %record.agent_id, build_id = %id, "created build record");
        }
        id
    }

    async fn update_build_status(
        &self,
        base_url: &str,
        build_id: &str,
        update: &BuildStatusUpdate,
    ) -> bool {
        let url = api(base_url, &format!("/api/v1/agents/build/{build_id}/status"));
        let body = match serde_json::to_value(update) {
            Ok(body) => body,
            Err(_) => return false,
        };
        self.put_json(url, &body, "build status update").await
    }

    async fn create_deployment_record(
        &self,
        base_url: &str,
        record: &NewDeploymentRecord,
    ) -> Option<String> {
        let url = api(base_url, "/api/v1/agents/deploy");
        let body = serde_json::to_value(record).ok()?;
        let id = self.post_for_id(url, &body, "deployment record creation").await;
        if let Some(ref id) = id {
            tracing::info!(
                agent_id = %record.agent_id,
                deployment_id = %id,
                "created deployment record"
            );
        }
        id
    }

    async fn update_deployment_status(
        &self,
        base_url: &str,
        deployment_id: &str,
        update: &DeploymentStatusUpdate,
    ) -> bool {
        let url = api(base_url, &format!("/api/v1/agents/deployment/{deployment_id}/status"));
        let body = match serde_json::to_value(update) {
            Ok(body) => body,
            Err(_) => return false,
        };
        self.put_json(url, &body, "deployment status update").await
    }

    async fn register_agent(&self, base_url: &str, agent_name: &str, document: &Value) -> bool {
        let url = api(base_url, &format!("/api/v1/registry/agent/{agent_name}"));
        self.put_json(url, document, "registry upsert").await
    }

    async fn update_registry_version_status(
        &self,
        base_url: &str,
        agent_name: &str,
        status: VersionState,
    ) -> bool {
        let url = api(base_url, &format!("/api/v1/registry/agent/{agent_name}/version/status"));
        let body = serde_json::json!({ "status": status });
        self.put_json(url, &body, "registry version status update").await
    }

    async fn resolve_version_mapping(
        &self,
        base_url: &str,
        agent_id: &str,
        semantic_version: &str,
    ) -> Option<String> {
        let url = api(base_url, "/api/v1/agents/build/version-mapping");
        let result = self
            .http
            .get(&url)
            .query(&[("agent_id", agent_id), ("semantic_version", semantic_version)])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                let value: Value = resp.json().await.ok()?;
                value.get("image_tag").and_then(Value::as_str).map(str::to_string)
            }
            Ok(resp) => {
                tracing::warn!(
                    %agent_id,
                    %semantic_version,
                    status = %resp.status(),
                    "version mapping lookup rejected"
                );
                None
            }
            Err(e) => {
                tracing::warn!(%agent_id, %semantic_version, error = %e, "version mapping lookup failed");
                None
            }
        }
    }

    async fn download_agent_tarball(
        &self,
        base_url: &str,
        agent_name: &str,
        version: Option<&str>,
    ) -> Option<Vec<u8>> {
        let url = api(base_url, &format!("/api/v1/agents/{agent_name}/download"));
        let mut request = self.download.get(&url);
        if let Some(version) = version {
            request = request.query(&[("version", version)]);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.bytes().await.ok().map(|b| b.to_vec())
            }
            Ok(resp) => {
                tracing::warn!(%agent_name, status = %resp.status(), "agent tarball download rejected");
                None
            }
            Err(e) => {
                tracing::warn!(%agent_name, error = %e, "agent tarball download failed");
                None
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeBackendState {
        upload_updates: Vec<(String, UploadStatusUpdate)>,
        build_records: Vec<NewBuildRecord>,
        build_status_updates: Vec<(String, BuildStatusUpdate)>,
        deployment_records: Vec<NewDeploymentRecord>,
        deployment_status_updates: Vec<(String, DeploymentStatusUpdate)>,
        registered: Vec<(String, Value)>,
        version_status_updates: Vec<(String, VersionState)>,
        version_mappings: HashMap<(String, String), String>,
        tarballs: HashMap<String, Vec<u8>>,
        fail_register: bool,
        fail_build_record: bool,
    }

    /// Recording backend for tests. Record creation hands out sequential
    /// `build-N` / `deploy-N` ids.
    #[derive(Clone, Default)]
    pub struct FakeBackend {
        inner: Arc<Mutex<FakeBackendState>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Install a `(agent_id, semver) → image tag` mapping.
        pub fn map_version(&self, agent_id: &str, semver: &str, image_tag: &str) {
            self.inner
                .lock()
                .version_mappings
                .insert((agent_id.to_string(), semver.to_string()), image_tag.to_string());
        }

        /// Serve a tarball for an agent (any requested version).
        pub fn put_tarball(&self, agent_name: &str, bytes: Vec<u8>) {
            self.inner.lock().tarballs.insert(agent_name.to_string(), bytes);
        }

        /// Make registry upserts fail; the one backend failure the
        /// dispatcher lets gate a later step (permissions).
        pub fn fail_register(&self) {
            self.inner.lock().fail_register = true;
        }

        /// Make build record creation return no id.
        pub fn fail_build_record(&self) {
            self.inner.lock().fail_build_record = true;
        }

        pub fn upload_updates(&self, agent_name: &str) -> Vec<UploadStatusUpdate> {
            self.inner
                .lock()
                .upload_updates
                .iter()
                .filter(|(name, _)| name == agent_name)
                .map(|(_, u)| u.clone())
                .collect()
        }

        /// Progress values reported for an agent, in write order.
        pub fn progress_for(&self, agent_name: &str) -> Vec<u8> {
            self.upload_updates(agent_name).iter().map(|u| u.progress_percentage).collect()
        }

        pub fn build_records(&self) -> Vec<NewBuildRecord> {
            self.inner.lock().build_records.clone()
        }

        pub fn build_status_updates(&self) -> Vec<(String, BuildStatusUpdate)> {
            self.inner.lock().build_status_updates.clone()
        }

        pub fn deployment_records(&self) -> Vec<NewDeploymentRecord> {
            self.inner.lock().deployment_records.clone()
        }

        pub fn deployment_status_updates(&self) -> Vec<(String, DeploymentStatusUpdate)> {
            self.inner.lock().deployment_status_updates.clone()
        }

        pub fn registered(&self) -> Vec<(String, Value)> {
            self.inner.lock().registered.clone()
        }

        pub fn version_status_updates(&self) -> Vec<(String, VersionState)> {
            self.inner.lock().version_status_updates.clone()
        }
    }

    #[async_trait]
    impl BackendApi for FakeBackend {
        async fn update_upload_status(
            &self,
            _base_url: &str,
            agent_name: &str,
            update: &UploadStatusUpdate,
        ) -> bool {
            self.inner.lock().upload_updates.push((agent_name.to_string(), update.clone()));
            true
        }

        async fn create_build_record(
            &self,
            _base_url: &str,
            record: &NewBuildRecord,
        ) -> Option<String> {
            let mut state = self.inner.lock();
            if state.fail_build_record {
                return None;
            }
            state.build_records.push(record.clone());
            Some(format!("build-{}", state.build_records.len()))
        }

        async fn update_build_status(
            &self,
            _base_url: &str,
            build_id: &str,
            update: &BuildStatusUpdate,
        ) -> bool {
            self.inner
                .lock()
                .build_status_updates
                .push((build_id.to_string(), update.clone()));
            true
        }

        async fn create_deployment_record(
            &self,
            _base_url: &str,
            record: &NewDeploymentRecord,
        ) -> Option<String> {
            let mut state = self.inner.lock();
            state.deployment_records.push(record.clone());
            Some(format!("deploy-{}", state.deployment_records.len()))
        }

        async fn update_deployment_status(
            &self,
            _base_url: &str,
            deployment_id: &str,
            update: &DeploymentStatusUpdate,
        ) -> bool {
            self.inner
                .lock()
                .deployment_status_updates
                .push((deployment_id.to_string(), update.clone()));
            true
        }

        async fn register_agent(
            &self,
            _base_url: &str,
            agent_name: &str,
            document: &Value,
        ) -> bool {
            let mut state = self.inner.lock();
            if state.fail_register {
                return false;
            }
            state.registered.push((agent_name.to_string(), document.clone()));
            true
        }

        async fn update_registry_version_status(
            &self,
            _base_url: &str,
            agent_name: &str,
            status: VersionState,
        ) -> bool {
            self.inner
                .lock()
                .version_status_updates
                .push((agent_name.to_string(), status));
            true
        }

        async fn resolve_version_mapping(
            &self,
            _base_url: &str,
            agent_id: &str,
            semantic_version: &str,
        ) -> Option<String> {
            self.inner
                .lock()
                .version_mappings
                .get(&(agent_id.to_string(), semantic_version.to_string()))
                .cloned()
        }

        async fn download_agent_tarball(
            &self,
            _base_url: &str,
            agent_name: &str,
            _version: Option<&str>,
        ) -> Option<Vec<u8>> {
            self.inner.lock().tarballs.get(agent_name).cloned()
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBackend;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

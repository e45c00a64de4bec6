// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster driver seam.
//!
//! The worker drives an external cluster through six operations and assumes
//! nothing else about it. Operations are blocking and synchronous from the
//! worker's viewpoint; the dispatcher threads them off the stream loop.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster api error: {0}")]
    Api(String),
    #[error("build job submission failed: {0}")]
    SubmitFailed(String),
    #[error("deploy failed: {0}")]
    DeployFailed(String),
    #[error("resource not found: {0}")]
    NotFound(String),
}

/// Observed phase of a build job.
///
/// Anything the cluster reports that does not map cleanly is `Unknown`;
/// callers treat it as "still running" to survive transient API flaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Active,
    Succeeded,
    Failed,
    Unknown,
}

slipway_core::simple_display! {
    JobPhase {
        Pending => "pending",
        Active => "active",
        Succeeded => "succeeded",
        Failed => "failed",
        Unknown => "unknown",
    }
}

/// Where a build job gets its context from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSource {
    /// Clone and build from a git repository.
    Git { url: String },
    /// Build from files uploaded to the backend, optionally replaced by a
    /// staged config-map of instrumented files.
    Upload {
        agent_name: String,
        backend_url: String,
        agent_path: Option<String>,
        files_configmap: Option<String>,
    },
}

/// A build job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJobSpec {
    /// Correlation id; the cluster job is named `job-<job_id>` and creation
    /// is idempotent with respect to it.
    pub job_id: String,
    /// Fully qualified image reference to push.
    pub image_destination: String,
    pub source: BuildSource,
}

/// An agent deployment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySpec {
    pub deployment_name: String,
    pub image_reference: String,
    pub port: u16,
    pub env: BTreeMap<String, String>,
}

/// Abstraction over the cluster API.
#[async_trait]
pub trait ClusterDriver: Send + Sync + 'static {
    /// Submit a build job. Returns as soon as the job is accepted.
    async fn create_build_job(&self, spec: &BuildJobSpec) -> Result<(), ClusterError>;

    /// Report the phase of a previously submitted job.
    async fn job_phase(&self, job_name: &str) -> Result<JobPhase, ClusterError>;

    /// Create or replace an agent deployment.
    async fn deploy_agent(&self, spec: &DeploySpec) -> Result<(), ClusterError>;

    /// Names of all live deployments belonging to an agent.
    async fn list_agent_deployments(&self, agent_id: &str) -> Result<Vec<String>, ClusterError>;

    /// Delete one agent deployment by name.
    async fn delete_agent_deployment(&self, name: &str) -> Result<(), ClusterError>;

    /// Publish a tree of files as a config-map for the builder to mount.
    async fn create_configmap_with_files(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
        namespace: &str,
    ) -> Result<(), ClusterError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeClusterState {
        build_jobs: Vec<BuildJobSpec>,
        job_phases: HashMap<String, VecDeque<JobPhase>>,
        deployed: Vec<DeploySpec>,
        deployments: Vec<String>,
        deleted: Vec<String>,
        configmaps: Vec<(String, String, BTreeMap<String, String>)>,
        fail_submit: Option<String>,
        fail_deploy: Option<String>,
        fail_delete: Vec<String>,
    }

    /// Recording cluster driver for tests.
    ///
    /// Build jobs succeed on first poll unless a phase script is installed
    /// with [`FakeCluster::script_job_phases`]. Deployments created through
    /// `deploy_agent` join the live set returned by `list_agent_deployments`.
    #[derive(Clone, Default)]
    pub struct FakeCluster {
        inner: Arc<Mutex<FakeClusterState>>,
    }

    impl FakeCluster {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the phases a job reports on successive polls.
        /// The last phase repeats once the queue drains.
        pub fn script_job_phases(&self, job_name: &str, phases: &[JobPhase]) {
            self.inner
                .lock()
                .job_phases
                .insert(job_name.to_string(), phases.iter().copied().collect());
        }

        /// Seed a pre-existing deployment into the live set.
        pub fn push_deployment(&self, name: &str) {
            self.inner.lock().deployments.push(name.to_string());
        }

        /// Make the next build job submission fail.
        pub fn fail_next_submit(&self, message: &str) {
            self.inner.lock().fail_submit = Some(message.to_string());
        }

        /// Make the next deploy fail.
        pub fn fail_next_deploy(&self, message: &str) {
            self.inner.lock().fail_deploy = Some(message.to_string());
        }

        /// Make deletion of a specific deployment fail.
        pub fn fail_delete_of(&self, name: &str) {
            self.inner.lock().fail_delete.push(name.to_string());
        }

        pub fn build_jobs(&self) -> Vec<BuildJobSpec> {
            self.inner.lock().build_jobs.clone()
        }

        pub fn deployed(&self) -> Vec<DeploySpec> {
            self.inner.lock().deployed.clone()
        }

        /// Names currently live (created or seeded, minus deleted).
        pub fn live_deployments(&self) -> Vec<String> {
            self.inner.lock().deployments.clone()
        }

        pub fn deleted(&self) -> Vec<String> {
            self.inner.lock().deleted.clone()
        }

        pub fn configmaps(&self) -> Vec<(String, String, BTreeMap<String, String>)> {
            self.inner.lock().configmaps.clone()
        }
    }

    #[async_trait]
    impl ClusterDriver for FakeCluster {
        async fn create_build_job(&self, spec: &BuildJobSpec) -> Result<(), ClusterError> {
            let mut state = self.inner.lock();
            if let Some(msg) = state.fail_submit.take() {
                return Err(ClusterError::SubmitFailed(msg));
            }
            state.build_jobs.push(spec.clone());
            Ok(())
        }

        async fn job_phase(&self, job_name: &str) -> Result<JobPhase, ClusterError> {
            let mut state = self.inner.lock();
            match state.job_phases.get_mut(job_name) {
                Some(phases) => {
                    let phase = if phases.len() > 1 {
                        phases.pop_front().unwrap_or(JobPhase::Unknown)
                    } else {
                        phases.front().copied().unwrap_or(JobPhase::Unknown)
                    };
                    Ok(phase)
                }
                None => Ok(JobPhase::Succeeded),
            }
        }

        async fn deploy_agent(&self, spec: &DeploySpec) -> Result<(), ClusterError> {
            let mut state = self.inner.lock();
            if let Some(msg) = state.fail_deploy.take() {
                return Err(ClusterError::DeployFailed(msg));
            }
            state.deployed.push(spec.clone());
            state.deployments.push(spec.deployment_name.clone());
            Ok(())
        }

        async fn list_agent_deployments(
            &self,
            agent_id: &str,
        ) -> Result<Vec<String>, ClusterError> {
            let prefix = format!("agent-{agent_id}-");
            let state = self.inner.lock();
            Ok(state
                .deployments
                .iter()
                .filter(|name| name.starts_with(&prefix))
                .cloned()
                .collect())
        }

        async fn delete_agent_deployment(&self, name: &str) -> Result<(), ClusterError> {
            let mut state = self.inner.lock();
            if state.fail_delete.iter().any(|n| n == name) {
                return Err(ClusterError::Api(format!("delete of {name} rejected")));
            }
            state.deployments.retain(|n| n != name);
            state.deleted.push(name.to_string());
            Ok(())
        }

        async fn create_configmap_with_files(
            &self,
            name: &str,
            data: BTreeMap<String, String>,
            namespace: &str,
        ) -> Result<(), ClusterError> {
            self.inner.lock().configmaps.push((
                name.to_string(),
                namespace.to_string(),
                data,
            ));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCluster;

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod tests;

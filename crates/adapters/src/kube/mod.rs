// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes cluster driver.
//!
//! Builds run as batch/v1 Jobs executing rootless BuildKit; agents run as
//! apps/v1 Deployments fronted by the gateway; staged file trees become
//! core/v1 ConfigMaps. All resources carry the
//! `app.kubernetes.io/managed-by=slipway` label so they can be listed and
//! reaped without tracking state in the worker.

mod manifest;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;

use crate::cluster::{BuildJobSpec, ClusterDriver, ClusterError, DeploySpec, JobPhase};

/// Label selector shared by every resource this worker creates.
const MANAGED_BY_SELECTOR: &str = "app.kubernetes.io/managed-by=slipway";

/// Cluster driver backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeDriver {
    client: Client,
    namespace: String,
}

impl KubeDriver {
    /// Connect using the ambient kubeconfig or in-cluster service account.
    pub async fn connect(namespace: impl Into<String>) -> Result<Self, ClusterError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::Api(format!("failed to create kube client: {e}")))?;
        Ok(Self { client, namespace: namespace.into() })
    }

    /// BuildKit image for build jobs.
    fn builder_image() -> String {
        std::env::var("SLIPWAY_BUILDKIT_IMAGE")
            .unwrap_or_else(|_| "moby/buildkit:v0.16.0-rootless".to_string())
    }

    /// Utility image for context-fetching init containers.
    fn fetch_image() -> String {
        std::env::var("SLIPWAY_FETCH_IMAGE").unwrap_or_else(|_| "alpine:3.20".to_string())
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn configmaps_in(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn is_conflict(err: &kube::Error) -> bool {
        matches!(err, kube::Error::Api(resp) if resp.code == 409)
    }

    fn is_not_found(err: &kube::Error) -> bool {
        matches!(err, kube::Error::Api(resp) if resp.code == 404)
    }
}

#[async_trait]
impl ClusterDriver for KubeDriver {
    async fn create_build_job(&self, spec: &BuildJobSpec) -> Result<(), ClusterError> {
        let job = manifest::build_job(&manifest::BuildJobParams {
            spec,
            namespace: &self.namespace,
            builder_image: Self::builder_image(),
            fetch_image: Self::fetch_image(),
        });

        let name = job.metadata.name.clone().unwrap_or_default();
        tracing::info!(job = %name, image = %spec.image_destination, "creating build job");

        match self.jobs().create(&PostParams::default(), &job).await {
            Ok(_) => Ok(()),
            // Same job_id resubmitted — the existing job is already doing the work.
            Err(e) if Self::is_conflict(&e) => {
                tracing::info!(job = %name, "build job already exists");
                Ok(())
            }
            Err(e) => Err(ClusterError::SubmitFailed(e.to_string())),
        }
    }

    async fn job_phase(&self, job_name: &str) -> Result<JobPhase, ClusterError> {
        let job = match self.jobs().get(job_name).await {
            Ok(job) => job,
            Err(e) if Self::is_not_found(&e) => return Ok(JobPhase::Unknown),
            Err(e) => return Err(ClusterError::Api(e.to_string())),
        };

        let Some(status) = job.status else { return Ok(JobPhase::Unknown) };
        let phase = if status.succeeded.unwrap_or(0) > 0 {
            JobPhase::Succeeded
        } else if status.failed.unwrap_or(0) > 0 {
            JobPhase::Failed
        } else if status.active.unwrap_or(0) > 0 {
            JobPhase::Active
        } else {
            JobPhase::Pending
        };
        Ok(phase)
    }

    async fn deploy_agent(&self, spec: &DeploySpec) -> Result<(), ClusterError> {
        let deployment = manifest::agent_deployment(spec, &self.namespace);

        tracing::info!(
            deployment = %spec.deployment_name,
            image = %spec.image_reference,
            "applying agent deployment"
        );

        // Server-side apply covers both create and update.
        let params = PatchParams::apply("slipway-worker").force();
        self.deployments()
            .patch(&spec.deployment_name, &params, &Patch::Apply(&deployment))
            .await
            .map_err(|e| ClusterError::DeployFailed(e.to_string()))?;
        Ok(())
    }

    async fn list_agent_deployments(&self, agent_id: &str) -> Result<Vec<String>, ClusterError> {
        let params = ListParams::default().labels(MANAGED_BY_SELECTOR);
        let list = self
            .deployments()
            .list(&params)
            .await
            .map_err(|e| ClusterError::Api(e.to_string()))?;

        let prefix = format!("agent-{agent_id}-");
        Ok(list
            .items
            .into_iter()
            .filter_map(|d| d.metadata.name)
            .filter(|name| name.starts_with(&prefix))
            .collect())
    }

    async fn delete_agent_deployment(&self, name: &str) -> Result<(), ClusterError> {
        tracing::info!(deployment = %name, "deleting agent deployment");
        match self.deployments().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            // Already gone is the outcome we wanted.
            Err(e) if Self::is_not_found(&e) => Ok(()),
            Err(e) => Err(ClusterError::Api(e.to_string())),
        }
    }

    async fn create_configmap_with_files(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
        namespace: &str,
    ) -> Result<(), ClusterError> {
        let configmap = manifest::files_configmap(name, namespace, data);
        match self.configmaps_in(namespace).create(&PostParams::default(), &configmap).await {
            Ok(_) => Ok(()),
            Err(e) if Self::is_conflict(&e) => {
                tracing::info!(configmap = %name, "config-map already exists");
                Ok(())
            }
            Err(e) => Err(ClusterError::Api(e.to_string())),
        }
    }
}

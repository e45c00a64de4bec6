// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `rebuild_agent` flow: rebuild the current version from the same
//! sources (base-image refresh), redeploy, and reap every older deployment
//! of that version except the one just created.

use serde_json::json;

use slipway_adapters::{BuildJobSpec, BuildSource, ClusterDriver, DeploySpec, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::command::RebuildCommand;
use slipway_core::records::{
    DeploymentStatusUpdate, NewBuildRecord, NewDeploymentRecord, VersionMapping,
};
use slipway_core::status::{progress, AgentState, BuildPhase, DeployPhase, UploadPhase, VersionState};
use slipway_core::{naming, Clock};

use super::{DispatchError, Dispatcher, StatusDetails, AGENT_PORT};
use crate::{observability, versions};

impl<K, B, A, S, C> Dispatcher<K, B, A, S, C>
where
    K: ClusterDriver,
    B: BackendApi,
    A: AuthApi,
    S: StatusStore,
    C: Clock,
{
    pub(crate) async fn handle_rebuild(
        &self,
        cmd: &RebuildCommand,
        base_url: &str,
    ) -> Result<(), DispatchError> {
        match self.rebuild_inner(cmd, base_url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_rebuild_failure(cmd, base_url, &e).await;
                Err(e)
            }
        }
    }

    async fn rebuild_inner(
        &self,
        cmd: &RebuildCommand,
        base_url: &str,
    ) -> Result<(), DispatchError> {
        let header = &cmd.header;
        let agent = &header.agent_name;

        // The version being rebuilt: explicit, from the path, or 1.0.0.
        let version = cmd
            .version
            .clone()
            .or_else(|| header.agent_path.as_deref().and_then(naming::version_from_path))
            .unwrap_or_else(|| "1.0.0".to_string());
        tracing::info!(agent_name = %agent, %version, "rebuilding agent");

        self.set_agent_status(
            agent,
            AgentState::Rebuilding,
            StatusDetails::new(format!("Rebuilding version {version}"), "rebuild_start")
                .field("version", &version),
        )
        .await;

        let timestamp = self.clock.epoch_secs();
        let job_id = naming::rebuild_job_id(agent, timestamp);
        let job_name = naming::build_job_name(&job_id);
        let tag = naming::rebuild_image_tag(&version, timestamp);
        let image = naming::image_destination(&self.config.registry_url, agent, &tag);

        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::BUILD_SUBMITTED,
            &format!("Submitting rebuild job {job_name}"),
            None,
        )
        .await;

        let build_id = self
            .backend
            .create_build_record(
                base_url,
                &NewBuildRecord {
                    agent_id: header.agent_id.clone(),
                    version_tag: version.clone(),
                    image_reference: image.clone(),
                    status: BuildPhase::Building,
                    k8s_job_name: job_name.clone(),
                    version_mapping: VersionMapping {
                        semantic_version: version.clone(),
                        image_tag: tag.clone(),
                        timestamp,
                    },
                },
            )
            .await;

        let files_configmap = observability::stage_instrumented_files(
            &self.cluster,
            &self.backend,
            &self.config,
            base_url,
            agent,
            header.agent_path.as_deref(),
            timestamp,
        )
        .await;

        self.cluster
            .create_build_job(&BuildJobSpec {
                job_id,
                image_destination: image.clone(),
                source: BuildSource::Upload {
                    agent_name: agent.clone(),
                    backend_url: base_url.to_string(),
                    agent_path: header.agent_path.clone(),
                    files_configmap,
                },
            })
            .await
            .map_err(DispatchError::BuildSubmit)?;

        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::BUILD_RUNNING,
            "Rebuild job submitted, waiting for completion",
            None,
        )
        .await;
        self.wait_for_build(base_url, &header.agent_id, &job_name, build_id.as_deref()).await?;

        self.set_agent_status(
            agent,
            AgentState::Deploying,
            StatusDetails::new(format!("Deploying rebuilt version {version}"), "cluster_deploy")
                .field("image", &image),
        )
        .await;
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::DEPLOYING,
            "Image rebuilt, deploying to cluster",
            None,
        )
        .await;

        let deployment_name = naming::deployment_name(agent, timestamp);
        let deployment_id = self
            .backend
            .create_deployment_record(
                base_url,
                &NewDeploymentRecord {
                    agent_id: header.agent_id.clone(),
                    build_id: build_id.clone(),
                    status: DeployPhase::Starting,
                    k8s_deployment_name: deployment_name.clone(),
                    namespace: self.config.namespace.clone(),
                },
            )
            .await;

        let env = self.agent_env(agent, header.owner_id.as_deref());
        let deploy_result = self
            .cluster
            .deploy_agent(&DeploySpec {
                deployment_name: deployment_name.clone(),
                image_reference: image.clone(),
                port: AGENT_PORT,
                env,
            })
            .await;
        if let Err(e) = deploy_result {
            if let Some(ref id) = deployment_id {
                self.backend
                    .update_deployment_status(
                        base_url,
                        id,
                        &DeploymentStatusUpdate {
                            agent_id: header.agent_id.clone(),
                            status: DeployPhase::Failed,
                            service_url: None,
                            error_message: Some("Failed to deploy rebuilt agent".to_string()),
                        },
                    )
                    .await;
            }
            return Err(DispatchError::Deploy(e));
        }

        let agent_url = self.public_url(&deployment_name)?;
        self.register_in_registry(
            base_url,
            agent,
            header.agent_path.as_deref(),
            header.owner_id.as_deref(),
            &agent_url,
        )
        .await;

        if let Some(ref id) = deployment_id {
            self.backend
                .update_deployment_status(
                    base_url,
                    id,
                    &DeploymentStatusUpdate {
                        agent_id: header.agent_id.clone(),
                        status: DeployPhase::Running,
                        service_url: Some(agent_url.clone()),
                        error_message: None,
                    },
                )
                .await;
        }

        // Keep the deployment just created; reap older instances of the
        // same version.
        versions::cleanup_old_deployments(&self.cluster, Some(&header.agent_id), Some(&version), 1)
            .await;

        self.backend.update_registry_version_status(base_url, agent, VersionState::Active).await;

        self.set_agent_status(
            agent,
            AgentState::Rebuilt,
            StatusDetails::new(
                format!("Successfully rebuilt version {version}"),
                "rebuild_complete",
            )
            .field("url", &agent_url)
            .field("image", &image),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("url".to_string(), json!(agent_url));
        extra.insert("image".to_string(), json!(image));
        extra.insert("version".to_string(), json!(version));
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Completed,
            progress::DONE,
            &format!("Agent version {version} rebuilt successfully"),
            Some(extra),
        )
        .await;

        Ok(())
    }

    async fn record_rebuild_failure(
        &self,
        cmd: &RebuildCommand,
        base_url: &str,
        err: &DispatchError,
    ) {
        let agent = &cmd.header.agent_name;
        self.set_agent_status(
            agent,
            AgentState::RebuildFailed,
            StatusDetails::new(format!("Rebuild failed: {err}"), "rebuild_error")
                .opt("version", cmd.version.clone()),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("error_details".to_string(), json!([err.to_string()]));
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Failed,
            progress::FAILED,
            &format!("Agent rebuild failed: {err}"),
            Some(extra),
        )
        .await;
    }
}

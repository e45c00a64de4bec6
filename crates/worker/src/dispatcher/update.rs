// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `update_agent` flow: build the new version, deploy it, re-register,
//! optionally reap the previous version, finalize the transition.

use serde_json::json;

use slipway_adapters::{BuildJobSpec, BuildSource, ClusterDriver, DeploySpec, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::command::{UpdateCommand, UpdateStrategy, UploadKind};
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
    pub(crate) async fn handle_update(
        &self,
        cmd: &UpdateCommand,
        base_url: &str,
    ) -> Result<(), DispatchError> {
        match self.update_inner(cmd, base_url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_update_failure(cmd, base_url, &e).await;
                Err(e)
            }
        }
    }

    async fn update_inner(&self, cmd: &UpdateCommand, base_url: &str) -> Result<(), DispatchError> {
        let header = &cmd.header;
        let agent = &header.agent_name;
        let previous = cmd.previous_version.as_deref().unwrap_or("unknown");
        tracing::info!(
            agent_name = %agent,
            from = previous,
            to = %cmd.new_version,
            strategy = %cmd.strategy,
            "updating agent"
        );

        self.set_agent_status(
            agent,
            AgentState::Updating,
            StatusDetails::new(
                format!("Updating agent from {previous} to {}", cmd.new_version),
                "update_initializing",
            )
            .field("new_version", &cmd.new_version)
            .opt("previous_version", cmd.previous_version.clone())
            .opt("owner_id", header.owner_id.clone())
            .opt("upload_id", header.upload_id.clone())
            .opt("upload_type", header.upload_type.map(|t| t.to_string())),
        )
        .await;
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::RECEIVED,
            &format!("Update orchestration started: {previous} -> {}", cmd.new_version),
            None,
        )
        .await;

        let timestamp = self.clock.epoch_secs();
        let job_id = naming::job_id(agent, timestamp);
        let job_name = naming::build_job_name(&job_id);
        let tag = naming::image_tag(timestamp);
        let image = naming::image_destination(&self.config.registry_url, agent, &tag);

        self.set_agent_status(
            agent,
            AgentState::Building,
            StatusDetails::new(
                format!("Building updated image (v{})", cmd.new_version),
                "image_build",
            )
            .field("job_id", &job_id)
            .field("image_destination", &image)
            .opt("owner_id", header.owner_id.clone())
            .opt("upload_id", header.upload_id.clone()),
        )
        .await;
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::BUILD_SUBMITTED,
            &format!("Submitting build job {job_name} for version {}", cmd.new_version),
            None,
        )
        .await;

        // The build record correlates the new semantic version with the
        // minted tag; rollback depends on this mapping later.
        let build_id = self
            .backend
            .create_build_record(
                base_url,
                &NewBuildRecord {
                    agent_id: header.agent_id.clone(),
                    version_tag: cmd.new_version.clone(),
                    image_reference: image.clone(),
                    status: BuildPhase::Building,
                    k8s_job_name: job_name.clone(),
                    version_mapping: VersionMapping {
                        semantic_version: cmd.new_version.clone(),
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
            "Build job submitted for update, waiting for completion",
            None,
        )
        .await;
        self.wait_for_build(base_url, &header.agent_id, &job_name, build_id.as_deref()).await?;

        self.set_agent_status(
            agent,
            AgentState::Deploying,
            StatusDetails::new(
                format!("Deploying updated agent (v{})", cmd.new_version),
                "cluster_deploy",
            )
            .field("image", &image)
            .field("update_strategy", cmd.strategy.to_string()),
        )
        .await;
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::DEPLOYING,
            &format!("Image built, deploying updated agent using {} strategy", cmd.strategy),
            None,
        )
        .await;

        match cmd.strategy {
            // The traffic split is reserved for future work; the cluster's
            // native rolling update covers both today.
            UpdateStrategy::BlueGreen => {
                tracing::info!(agent_name = %agent, "blue-green requested, deploying with rolling semantics");
            }
            UpdateStrategy::Rolling => {
                tracing::info!(agent_name = %agent, "deploying with rolling update strategy");
            }
        }

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
                            error_message: Some("Failed to deploy updated agent".to_string()),
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

        self.set_agent_status(
            agent,
            AgentState::Updated,
            StatusDetails::new(
                format!("Successfully updated to version {}", cmd.new_version),
                "update_deployed",
            )
            .field("url", &agent_url)
            .field("active_version", &cmd.new_version)
            .field("deployment_name", &deployment_name),
        )
        .await;

        if cmd.cleanup_old {
            if let Some(ref previous_version) = cmd.previous_version {
                tracing::info!(
                    agent_name = %agent,
                    version = %previous_version,
                    "cleaning up old deployments"
                );
                versions::cleanup_old_deployments(
                    &self.cluster,
                    Some(&header.agent_id),
                    Some(previous_version),
                    0,
                )
                .await;
            }
        }

        self.finalize_update(&header.agent_id, &cmd.new_version, cmd.previous_version.as_deref());
        self.backend.update_registry_version_status(base_url, agent, VersionState::Active).await;

        self.set_agent_status(
            agent,
            AgentState::Updated,
            StatusDetails::new(
                format!("Agent successfully updated to version {}", cmd.new_version),
                "update_completed",
            )
            .field("active_version", &cmd.new_version)
            .opt("previous_version", cmd.previous_version.clone())
            .field("image", &image),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("update_strategy".to_string(), json!(cmd.strategy.to_string()));
        extra.insert("image".to_string(), json!(image));
        extra.insert("active_version".to_string(), json!(cmd.new_version));
        extra.insert("cleanup_performed".to_string(), json!(cmd.cleanup_old));
        // GitHub-driven updates arrive without an agent path; the upload
        // history records the placeholder filename instead.
        if header.upload_type == Some(UploadKind::GithubUpdate) && header.agent_path.is_none() {
            extra.insert("filename".to_string(), json!("github-update"));
        }
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Completed,
            progress::DONE,
            &format!("Agent successfully updated: {previous} -> {}", cmd.new_version),
            Some(extra),
        )
        .await;

        Ok(())
    }

    /// Record the completed version transition.
    fn finalize_update(&self, agent_id: &str, new_version: &str, previous_version: Option<&str>) {
        tracing::info!(
            %agent_id,
            from = previous_version.unwrap_or("unknown"),
            to = %new_version,
            "finalized agent update"
        );
    }

    async fn record_update_failure(
        &self,
        cmd: &UpdateCommand,
        base_url: &str,
        err: &DispatchError,
    ) {
        let agent = &cmd.header.agent_name;
        self.set_agent_status(
            agent,
            AgentState::UpdateFailed,
            StatusDetails::new(format!("Update failed: {err}"), "update_error")
                .field("new_version", &cmd.new_version)
                .opt("previous_version", cmd.previous_version.clone()),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("error_details".to_string(), json!([err.to_string()]));
        extra.insert("failed_version".to_string(), json!(cmd.new_version));
        if let Some(ref previous) = cmd.previous_version {
            extra.insert("previous_version".to_string(), json!(previous));
        }
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Failed,
            progress::FAILED,
            &format!("Agent update failed: {err}"),
            Some(extra),
        )
        .await;
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `deploy_agent` flow: build the uploaded sources, deploy the image,
//! register the agent, grant owner permissions, finalize.

use serde_json::json;

use slipway_adapters::{BuildJobSpec, BuildSource, ClusterDriver, DeploySpec, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::command::{DeployCommand, UploadKind};
use slipway_core::records::{
    DeploymentStatusUpdate, NewBuildRecord, NewDeploymentRecord, VersionMapping,
};
use slipway_core::status::{progress, AgentState, BuildPhase, DeployPhase, UploadPhase, VersionState};
use slipway_core::{naming, Clock};

use super::{DispatchError, Dispatcher, StatusDetails, AGENT_PORT};
use crate::observability;

impl<K, B, A, S, C> Dispatcher<K, B, A, S, C>
where
    K: ClusterDriver,
    B: BackendApi,
    A: AuthApi,
    S: StatusStore,
    C: Clock,
{
    pub(crate) async fn handle_deploy(
        &self,
        cmd: &DeployCommand,
        base_url: &str,
    ) -> Result<(), DispatchError> {
        match self.deploy_inner(cmd, base_url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_deploy_failure(cmd, base_url, &e).await;
                Err(e)
            }
        }
    }

    async fn deploy_inner(&self, cmd: &DeployCommand, base_url: &str) -> Result<(), DispatchError> {
        let header = &cmd.header;
        let agent = &header.agent_name;
        tracing::info!(agent_name = %agent, git = cmd.git_url.is_some(), "deploying agent");

        let timestamp = self.clock.epoch_secs();
        let job_id = naming::job_id(agent, timestamp);
        let job_name = naming::build_job_name(&job_id);
        let tag = naming::image_tag(timestamp);
        let image = naming::image_destination(&self.config.registry_url, agent, &tag);

        self.set_agent_status(
            agent,
            AgentState::Building,
            StatusDetails::new("Building agent image", "image_build")
                .field("job_id", &job_id)
                .field("image_destination", &image)
                .opt("owner_id", header.owner_id.clone())
                .opt("upload_id", header.upload_id.clone())
                .opt("upload_type", header.upload_type.map(|t| t.to_string())),
        )
        .await;
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::BUILD_SUBMITTED,
            &format!("Submitting build job {job_name}"),
            None,
        )
        .await;

        // The upload path may carry the semantic version; fresh uploads
        // without one start at 1.0.0.
        let version = header
            .agent_path
            .as_deref()
            .and_then(naming::version_from_path)
            .unwrap_or_else(|| "1.0.0".to_string());

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

        let source = match &cmd.git_url {
            Some(url) => BuildSource::Git { url: url.clone() },
            None => BuildSource::Upload {
                agent_name: agent.clone(),
                backend_url: base_url.to_string(),
                agent_path: header.agent_path.clone(),
                files_configmap,
            },
        };
        self.cluster
            .create_build_job(&BuildJobSpec {
                job_id,
                image_destination: image.clone(),
                source,
            })
            .await
            .map_err(DispatchError::BuildSubmit)?;

        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::BUILD_RUNNING,
            "Build job submitted, waiting for completion",
            None,
        )
        .await;
        self.wait_for_build(base_url, &header.agent_id, &job_name, build_id.as_deref()).await?;

        self.set_agent_status(
            agent,
            AgentState::Deploying,
            StatusDetails::new("Deploying agent to cluster", "cluster_deploy")
                .field("image", &image),
        )
        .await;
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::DEPLOYING,
            "Image built, deploying to cluster",
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

        let mut env = self.agent_env(agent, header.owner_id.as_deref());
        if header.upload_type == Some(UploadKind::N8nRegister) {
            if let Some(ref webhook_url) = cmd.webhook_url {
                env.insert("WEBHOOK_URL".to_string(), webhook_url.clone());
            }
        }

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
                            error_message: Some("Failed to deploy agent to cluster".to_string()),
                        },
                    )
                    .await;
            }
            return Err(DispatchError::Deploy(e));
        }

        let agent_url = self.public_url(&deployment_name)?;
        tracing::info!(agent_name = %agent, url = %agent_url, "agent will be accessible");

        let registry_updated = self
            .register_in_registry(
                base_url,
                agent,
                header.agent_path.as_deref(),
                header.owner_id.as_deref(),
                &agent_url,
            )
            .await;

        let mut permissions_created = false;
        if registry_updated {
            match header.owner_id.as_deref() {
                Some(owner_id) => {
                    permissions_created =
                        self.auth.create_agent_permissions(&header.agent_id, owner_id).await;
                    if !permissions_created {
                        tracing::warn!(agent_name = %agent, "registry updated but permission creation failed");
                    }
                }
                None => {
                    tracing::info!(agent_name = %agent, "no owner_id provided, skipping permissions");
                }
            }
        }

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
            AgentState::Running,
            StatusDetails::new("Agent deployed successfully", "deployed")
                .field("url", &agent_url)
                .field("deployment_name", &deployment_name)
                .field("image", &image),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("url".to_string(), json!(agent_url));
        extra.insert("registry_updated".to_string(), json!(registry_updated));
        extra.insert("permissions_created".to_string(), json!(permissions_created));
        extra.insert("image".to_string(), json!(image));
        extra.insert("deployment_name".to_string(), json!(deployment_name));
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Completed,
            progress::DONE,
            "Agent built and deployed successfully",
            Some(extra),
        )
        .await;

        self.backend.update_registry_version_status(base_url, agent, VersionState::Active).await;
        Ok(())
    }

    async fn record_deploy_failure(
        &self,
        cmd: &DeployCommand,
        base_url: &str,
        err: &DispatchError,
    ) {
        let agent = &cmd.header.agent_name;
        self.set_agent_status(
            agent,
            AgentState::Failed,
            StatusDetails::new(format!("Deployment failed: {err}"), "deployment_error"),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("error_details".to_string(), json!([err.to_string()]));
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Failed,
            progress::FAILED,
            &format!("Deployment failed: {err}"),
            Some(extra),
        )
        .await;
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `rollback_agent` flow: redeploy a previously built version.
//!
//! No image is built. The target version resolves to its recorded image tag
//! through the version mapping; only when no mapping exists does the flow
//! fall back to `v<target>`, keeping pre-mapping agents rollbackable.

use serde_json::json;

use slipway_adapters::{ClusterDriver, DeploySpec, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::command::RollbackCommand;
use slipway_core::records::{DeploymentStatusUpdate, NewDeploymentRecord};
use slipway_core::status::{progress, AgentState, DeployPhase, UploadPhase};
use slipway_core::{naming, Clock};

use super::{DispatchError, Dispatcher, StatusDetails, AGENT_PORT};
use crate::versions;

impl<K, B, A, S, C> Dispatcher<K, B, A, S, C>
where
    K: ClusterDriver,
    B: BackendApi,
    A: AuthApi,
    S: StatusStore,
    C: Clock,
{
    pub(crate) async fn handle_rollback(
        &self,
        cmd: &RollbackCommand,
        base_url: &str,
    ) -> Result<(), DispatchError> {
        match self.rollback_inner(cmd, base_url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record_rollback_failure(cmd, base_url, &e).await;
                Err(e)
            }
        }
    }

    async fn rollback_inner(
        &self,
        cmd: &RollbackCommand,
        base_url: &str,
    ) -> Result<(), DispatchError> {
        let header = &cmd.header;
        let agent = &header.agent_name;
        let current = cmd.current_version.as_deref().unwrap_or("unknown");
        tracing::info!(
            agent_name = %agent,
            from = current,
            to = %cmd.target_version,
            "rolling back agent"
        );

        self.set_agent_status(
            agent,
            AgentState::RollingBack,
            StatusDetails::new(
                format!("Rolling back from {current} to {}", cmd.target_version),
                "rollback_start",
            )
            .field("target_version", &cmd.target_version)
            .opt("current_version", cmd.current_version.clone()),
        )
        .await;

        let timestamp = self.clock.epoch_secs();
        let deployment_name = naming::deployment_name(agent, timestamp);

        let resolved_tag = versions::resolve_image_tag(
            &self.backend,
            base_url,
            &header.agent_id,
            &cmd.target_version,
        )
        .await;
        let image = naming::image_destination(&self.config.registry_url, agent, &resolved_tag);
        tracing::info!(
            agent_name = %agent,
            version = %cmd.target_version,
            tag = %resolved_tag,
            "resolved rollback image"
        );
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::BUILD_SUBMITTED,
            &format!("Resolved version {} to image tag {resolved_tag}", cmd.target_version),
            None,
        )
        .await;

        // No build: the deployment record stands alone.
        let deployment_id = self
            .backend
            .create_deployment_record(
                base_url,
                &NewDeploymentRecord {
                    agent_id: header.agent_id.clone(),
                    build_id: None,
                    status: DeployPhase::Starting,
                    k8s_deployment_name: deployment_name.clone(),
                    namespace: self.config.namespace.clone(),
                },
            )
            .await;

        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::BUILD_RUNNING,
            &format!("Deploying rollback version {}", cmd.target_version),
            None,
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
                            error_message: Some("Failed to deploy rollback version".to_string()),
                        },
                    )
                    .await;
            }
            return Err(DispatchError::Deploy(e));
        }

        let agent_url = self.public_url(&deployment_name)?;
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::OrchestrationProcessing,
            progress::DEPLOYING,
            "Rollback deployed, updating registry",
            None,
        )
        .await;

        // Re-register pointing at the rolled-back version's sources so the
        // capability document matches what is actually running.
        let versioned_path = header.agent_path.as_ref().map(|path| {
            if path.contains("/v") {
                path.clone()
            } else {
                format!("{path}/v{}", cmd.target_version)
            }
        });
        self.register_in_registry(
            base_url,
            agent,
            versioned_path.as_deref(),
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

        // Reap every deployment of the version being rolled away from.
        if let Some(ref current_version) = cmd.current_version {
            versions::cleanup_old_deployments(
                &self.cluster,
                Some(&header.agent_id),
                Some(current_version),
                0,
            )
            .await;
        }

        self.set_agent_status(
            agent,
            AgentState::RolledBack,
            StatusDetails::new(
                format!("Successfully rolled back to {}", cmd.target_version),
                "rollback_complete",
            )
            .field("url", &agent_url)
            .field("active_version", &cmd.target_version),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("url".to_string(), json!(agent_url));
        extra.insert("active_version".to_string(), json!(cmd.target_version));
        if let Some(ref current_version) = cmd.current_version {
            extra.insert("previous_version".to_string(), json!(current_version));
        }
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Completed,
            progress::DONE,
            &format!("Agent rolled back to version {}", cmd.target_version),
            Some(extra),
        )
        .await;

        Ok(())
    }

    async fn record_rollback_failure(
        &self,
        cmd: &RollbackCommand,
        base_url: &str,
        err: &DispatchError,
    ) {
        let agent = &cmd.header.agent_name;
        self.set_agent_status(
            agent,
            AgentState::RollbackFailed,
            StatusDetails::new(format!("Rollback failed: {err}"), "rollback_error")
                .field("target_version", &cmd.target_version),
        )
        .await;

        let mut extra = serde_json::Map::new();
        extra.insert("error_details".to_string(), json!([err.to_string()]));
        self.update_upload_status(
            base_url,
            agent,
            UploadPhase::Failed,
            progress::FAILED,
            &format!("Agent rollback failed: {err}"),
            Some(extra),
        )
        .await;
    }
}

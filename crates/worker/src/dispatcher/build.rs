// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build job polling.

use std::time::Duration;

use slipway_adapters::{ClusterDriver, JobPhase, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::records::BuildStatusUpdate;
use slipway_core::status::BuildPhase;
use slipway_core::Clock;

use super::{DispatchError, Dispatcher};

/// Seconds between job status polls.
pub(crate) const BUILD_POLL_INTERVAL_SECS: u64 = 5;

/// Hard ceiling on a build wait.
pub(crate) const BUILD_WAIT_CEILING_SECS: u64 = 600;

impl<K, B, A, S, C> Dispatcher<K, B, A, S, C>
where
    K: ClusterDriver,
    B: BackendApi,
    A: AuthApi,
    S: StatusStore,
    C: Clock,
{
    /// Poll a build job until it finishes, updating the build record.
    ///
    /// Unknown phases and transient poll errors count as "still running" so
    /// a flapping cluster API cannot fail a healthy build; only an explicit
    /// `failed` phase or the 600 s ceiling does.
    pub(crate) async fn wait_for_build(
        &self,
        base_url: &str,
        agent_id: &str,
        job_name: &str,
        build_id: Option<&str>,
    ) -> Result<(), DispatchError> {
        let mut elapsed = 0;
        while elapsed < BUILD_WAIT_CEILING_SECS {
            let phase = match self.cluster.job_phase(job_name).await {
                Ok(phase) => phase,
                Err(e) => {
                    tracing::warn!(job = %job_name, error = %e, "job status poll failed");
                    JobPhase::Unknown
                }
            };
            tracing::debug!(job = %job_name, %phase, "build job status");

            match phase {
                JobPhase::Succeeded => {
                    tracing::info!(job = %job_name, "build job succeeded");
                    if let Some(id) = build_id {
                        self.backend
                            .update_build_status(
                                base_url,
                                id,
                                &BuildStatusUpdate {
                                    agent_id: agent_id.to_string(),
                                    status: BuildPhase::Success,
                                    logs: None,
                                    error_message: None,
                                },
                            )
                            .await;
                    }
                    return Ok(());
                }
                JobPhase::Failed => {
                    let err = DispatchError::BuildFailed(job_name.to_string());
                    if let Some(id) = build_id {
                        self.backend
                            .update_build_status(
                                base_url,
                                id,
                                &BuildStatusUpdate {
                                    agent_id: agent_id.to_string(),
                                    status: BuildPhase::Failed,
                                    logs: None,
                                    error_message: Some(err.to_string()),
                                },
                            )
                            .await;
                    }
                    return Err(err);
                }
                JobPhase::Active | JobPhase::Pending => {}
                JobPhase::Unknown => {
                    tracing::warn!(job = %job_name, "unknown job status, still waiting");
                }
            }

            tokio::time::sleep(Duration::from_secs(BUILD_POLL_INTERVAL_SECS)).await;
            elapsed += BUILD_POLL_INTERVAL_SECS;
        }

        Err(DispatchError::BuildTimeout {
            job_name: job_name.to_string(),
            timeout_secs: BUILD_WAIT_CEILING_SECS,
        })
    }
}

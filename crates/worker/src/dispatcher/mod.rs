// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatcher and per-action state machines.
//!
//! The dispatcher owns one command at a time. It records every outcome in
//! the status stores before returning, success or not, so the consumer can
//! always acknowledge.
//!
//! Flow modules: [`deploy`], [`update`], [`rollback`], [`rebuild`]. The
//! progress/status helpers live in [`progress`]; the build polling loop in
//! [`build`].

mod build;
mod deploy;
mod progress;
mod rebuild;
mod rollback;
mod update;

pub(crate) use progress::StatusDetails;

use std::collections::HashMap;

use thiserror::Error;

use slipway_adapters::{ClusterDriver, ClusterError, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::status::AgentState;
use slipway_core::{card, Clock, Command, CommandError};

use crate::agentcard;
use crate::config::WorkerConfig;

/// Container port every agent listens on behind the gateway.
pub(crate) const AGENT_PORT: u16 = 5000;

/// Errors that terminate a command.
///
/// By the time one of these propagates out of [`Dispatcher::dispatch`], the
/// failure has already been written to the status stores; callers only log
/// and acknowledge.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("Failed to create build job: {0}")]
    BuildSubmit(#[source] ClusterError),
    #[error("Build job {0} failed")]
    BuildFailed(String),
    #[error("Build job {job_name} timed out after {timeout_secs} seconds")]
    BuildTimeout { job_name: String, timeout_secs: u64 },
    #[error("Failed to deploy agent: {0}")]
    Deploy(#[source] ClusterError),
    #[error("gateway URL not configured, cannot register agent")]
    GatewayUnconfigured,
}

/// Adapter dependencies handed to the dispatcher at startup.
pub struct DispatcherDeps<K, B, A, S> {
    pub cluster: K,
    pub backend: B,
    pub auth: A,
    pub status: S,
}

/// Drives orchestration commands through their state machines.
pub struct Dispatcher<K, B, A, S, C: Clock> {
    pub(crate) cluster: K,
    pub(crate) backend: B,
    pub(crate) auth: A,
    pub(crate) status: S,
    pub(crate) clock: C,
    pub(crate) config: WorkerConfig,
}

impl<K, B, A, S, C> Dispatcher<K, B, A, S, C>
where
    K: ClusterDriver,
    B: BackendApi,
    A: AuthApi,
    S: StatusStore,
    C: Clock,
{
    pub fn new(deps: DispatcherDeps<K, B, A, S>, clock: C, config: WorkerConfig) -> Self {
        Self {
            cluster: deps.cluster,
            backend: deps.backend,
            auth: deps.auth,
            status: deps.status,
            clock,
            config,
        }
    }

    /// Process one stream message to completion.
    ///
    /// Returns `Err` for recorded failures so the caller can log them; the
    /// message must be acknowledged either way.
    pub async fn dispatch(&self, fields: &HashMap<String, String>) -> Result<(), DispatchError> {
        let command = match Command::parse(fields) {
            Ok(command) => command,
            Err(e) => {
                self.record_invalid_command(fields, &e).await;
                return Err(e.into());
            }
        };

        let header = command.header();
        let base_url = self.config.base_url_for(header.base_url.as_deref());
        tracing::info!(
            action = command.action(),
            agent_name = %header.agent_name,
            owner_id = header.owner_id.as_deref().unwrap_or(""),
            "processing orchestration command"
        );

        // Prelude, identical for every action.
        self.set_agent_status(
            &header.agent_name,
            AgentState::Processing,
            StatusDetails::new("Orchestration command received", "initializing")
                .opt("owner_id", header.owner_id.clone())
                .opt("upload_id", header.upload_id.clone())
                .opt("upload_type", header.upload_type.map(|t| t.to_string())),
        )
        .await;
        self.update_upload_status(
            &base_url,
            &header.agent_name,
            slipway_core::status::UploadPhase::OrchestrationProcessing,
            slipway_core::status::progress::RECEIVED,
            "Build orchestration started",
            None,
        )
        .await;

        let start = self.clock.now();
        let result = match &command {
            Command::Deploy(cmd) => self.handle_deploy(cmd, &base_url).await,
            Command::Update(cmd) => self.handle_update(cmd, &base_url).await,
            Command::Rollback(cmd) => self.handle_rollback(cmd, &base_url).await,
            Command::Rebuild(cmd) => self.handle_rebuild(cmd, &base_url).await,
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(
                action = command.action(),
                agent_name = %header.agent_name,
                elapsed_ms,
                "command completed"
            ),
            Err(e) => tracing::error!(
                action = command.action(),
                agent_name = %header.agent_name,
                elapsed_ms,
                error = %e,
                "command failed"
            ),
        }
        result
    }

    /// Record a message that never made it into a flow.
    async fn record_invalid_command(&self, fields: &HashMap<String, String>, err: &CommandError) {
        tracing::error!(error = %err, "invalid orchestration command");
        let Some(agent_name) = fields.get("agent_name").filter(|v| !v.is_empty()) else {
            return;
        };
        self.set_agent_status(
            agent_name,
            AgentState::Error,
            StatusDetails::new(format!("Failed to process orchestration command: {err}"), "invalid_command")
                .opt("owner_id", fields.get("owner_id").cloned())
                .opt("upload_id", fields.get("upload_id").cloned()),
        )
        .await;
    }

    /// Resolve the agent's capability document and upsert the registry entry.
    ///
    /// Returns whether the upsert succeeded; this is the one backend result
    /// that gates a later step (permissions).
    pub(crate) async fn register_in_registry(
        &self,
        base_url: &str,
        agent_name: &str,
        agent_path: Option<&str>,
        owner_id: Option<&str>,
        service_url: &str,
    ) -> bool {
        let resolved =
            agentcard::resolve_card(&self.backend, &self.config, base_url, agent_name, agent_path)
                .await;
        if resolved.is_none() {
            tracing::warn!(%agent_name, "no AgentCard available, registering minimal capabilities");
        }
        let document = card::finalize(resolved, agent_name, service_url, owner_id);
        self.backend.register_agent(base_url, agent_name, &document).await
    }

    /// Environment handed to every deployed agent.
    pub(crate) fn agent_env(
        &self,
        agent_name: &str,
        owner_id: Option<&str>,
    ) -> std::collections::BTreeMap<String, String> {
        let mut env = crate::observability::agent_env_vars(&self.config, agent_name);
        env.insert("AGENT_NAME".to_string(), agent_name.to_string());
        env.insert("OWNER_ID".to_string(), owner_id.unwrap_or("").to_string());
        if let Some(ref key) = self.config.llm_api_key {
            env.insert("LLM_API_KEY".to_string(), key.clone());
        }
        env
    }

    /// Public URL for a deployment, or the configured-gateway error.
    pub(crate) fn public_url(&self, deployment_name: &str) -> Result<String, DispatchError> {
        if self.config.gateway_url.is_empty() {
            return Err(DispatchError::GatewayUnconfigured);
        }
        Ok(slipway_core::naming::public_url(&self.config.gateway_url, deployment_name))
    }
}

#[cfg(test)]
pub(crate) mod test_helpers;

#[cfg(test)]
#[path = "dispatcher_tests/mod.rs"]
mod dispatcher_tests;

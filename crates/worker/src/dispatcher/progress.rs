// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized status writes.
//!
//! Every flow reports through these two helpers so the user-visible
//! progress contract (95 → 96 → 97 → 98 → 100 on success, 0 on failure)
//! stays enforceable by inspection.

use std::collections::BTreeMap;

use slipway_adapters::{ClusterDriver, StatusStore};
use slipway_backend::{AuthApi, BackendApi};
use slipway_core::records::UploadStatusUpdate;
use slipway_core::status::{AgentState, UploadPhase};
use slipway_core::Clock;

use super::Dispatcher;

/// Builder for the flow-specific fields of a volatile status record.
///
/// Absent optional values never reach the store, which rejects nulls.
pub(crate) struct StatusDetails {
    fields: BTreeMap<String, String>,
}

impl StatusDetails {
    pub fn new(message: impl Into<String>, stage: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("message".to_string(), message.into());
        fields.insert("stage".to_string(), stage.to_string());
        Self { fields }
    }

    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn opt<V: Into<String>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.fields.insert(key.to_string(), value.into());
        }
        self
    }
}

impl<K, B, A, S, C> Dispatcher<K, B, A, S, C>
where
    K: ClusterDriver,
    B: BackendApi,
    A: AuthApi,
    S: StatusStore,
    C: Clock,
{
    /// Write the volatile per-agent status. Best-effort: a store outage
    /// must never abort a flow.
    pub(crate) async fn set_agent_status(
        &self,
        agent_name: &str,
        state: AgentState,
        details: StatusDetails,
    ) {
        let mut fields = details.fields;
        fields.insert("agent_name".to_string(), agent_name.to_string());
        fields.insert("status".to_string(), state.to_string());
        fields.insert("last_updated".to_string(), chrono::Utc::now().to_rfc3339());
        fields.insert("updated_by".to_string(), "k8s-worker".to_string());

        if let Err(e) = self.status.set_agent_status(agent_name, fields).await {
            tracing::warn!(%agent_name, error = %e, "volatile status write failed");
        }
        tracing::debug!(%agent_name, status = %state, "agent status updated");
    }

    /// Forward an upload status update to the backend's durable record.
    pub(crate) async fn update_upload_status(
        &self,
        base_url: &str,
        agent_name: &str,
        phase: UploadPhase,
        progress: u8,
        message: &str,
        extra: Option<serde_json::Map<String, serde_json::Value>>,
    ) {
        let mut update = UploadStatusUpdate::new(phase, progress, message);
        if let Some(extra) = extra {
            update.extra = extra;
        }
        if !self.backend.update_upload_status(base_url, agent_name, &update).await {
            tracing::warn!(%agent_name, %phase, progress, "upload status update not accepted");
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request bodies for the backend's durable records.
//!
//! Field names match the backend API wire format exactly.

use serde::{Deserialize, Serialize};

use crate::status::{BuildPhase, DeployPhase, UploadPhase};

/// The authoritative association between a semantic version and the
/// immutable image tag its build pushed. Rollback resolves through this
/// instead of synthesising a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMapping {
    pub semantic_version: String,
    pub image_tag: String,
    pub timestamp: u64,
}

/// Body for `POST /api/v1/agents/build`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBuildRecord {
    pub agent_id: String,
    /// Semantic version this build belongs to.
    pub version_tag: String,
    /// Registry reference with the timestamped tag.
    pub image_reference: String,
    pub status: BuildPhase,
    pub k8s_job_name: String,
    pub version_mapping: VersionMapping,
}

/// Body for `PUT /api/v1/agents/build/<id>/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatusUpdate {
    pub agent_id: String,
    pub status: BuildPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Body for `POST /api/v1/agents/deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeploymentRecord {
    pub agent_id: String,
    /// Absent for rollbacks, which deploy an existing image.
    pub build_id: Option<String>,
    pub status: DeployPhase,
    pub k8s_deployment_name: String,
    pub namespace: String,
}

/// Body for `PUT /api/v1/agents/deployment/<id>/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatusUpdate {
    pub agent_id: String,
    pub status: DeployPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Body for `PUT /api/v1/upload-status/agent/<name>/latest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatusUpdate {
    pub status: UploadPhase,
    pub progress_percentage: u8,
    pub status_message: String,
    /// Reserved; currently always null on the wire.
    pub orchestration_duration: Option<u64>,
    /// Flow-specific completion or failure details.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UploadStatusUpdate {
    pub fn new(status: UploadPhase, progress_percentage: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress_percentage,
            status_message: message.into(),
            orchestration_duration: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a flow-specific detail field to the payload.
    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;

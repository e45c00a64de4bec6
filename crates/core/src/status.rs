// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status labels and the progress contract.
//!
//! The progress percentages are a stable user-visible contract: every
//! successful flow passes through 95 → 96 → 97 → 98 → 100, and failures
//! reset to 0.

use serde::{Deserialize, Serialize};

/// Progress percentages reported through the upload status record.
pub mod progress {
    /// Orchestration picked the command up.
    pub const RECEIVED: u8 = 95;
    /// Build job submitted to the cluster.
    pub const BUILD_SUBMITTED: u8 = 96;
    /// Build job running, waiting for completion.
    pub const BUILD_RUNNING: u8 = 97;
    /// Image built, deployment in progress.
    pub const DEPLOYING: u8 = 98;
    /// Flow finished successfully.
    pub const DONE: u8 = 100;
    /// Flow failed.
    pub const FAILED: u8 = 0;
}

/// Stage label written to the volatile per-agent status record.
///
/// UIs treat these as free-form strings; this is the set the worker emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Processing,
    Building,
    Deploying,
    Running,
    Updating,
    Updated,
    RollingBack,
    RolledBack,
    Rebuilding,
    Rebuilt,
    Failed,
    UpdateFailed,
    RollbackFailed,
    RebuildFailed,
    Error,
}

crate::simple_display! {
    AgentState {
        Processing => "processing",
        Building => "building",
        Deploying => "deploying",
        Running => "running",
        Updating => "updating",
        Updated => "updated",
        RollingBack => "rolling_back",
        RolledBack => "rolled_back",
        Rebuilding => "rebuilding",
        Rebuilt => "rebuilt",
        Failed => "failed",
        UpdateFailed => "update_failed",
        RollbackFailed => "rollback_failed",
        RebuildFailed => "rebuild_failed",
        Error => "error",
    }
}

/// Durable upload status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Initiated,
    Processing,
    CapabilitiesGenerated,
    OrchestrationTriggered,
    OrchestrationProcessing,
    Completed,
    Failed,
}

crate::simple_display! {
    UploadPhase {
        Initiated => "initiated",
        Processing => "processing",
        CapabilitiesGenerated => "capabilities_generated",
        OrchestrationTriggered => "orchestration_triggered",
        OrchestrationProcessing => "orchestration_processing",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Build record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Building,
    Success,
    Failed,
}

crate::simple_display! {
    BuildPhase {
        Building => "building",
        Success => "success",
        Failed => "failed",
    }
}

/// Deployment record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Starting,
    Running,
    Failed,
}

crate::simple_display! {
    DeployPhase {
        Starting => "starting",
        Running => "running",
        Failed => "failed",
    }
}

/// Status of a version entry in the registry's version history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    Active,
    Archived,
    Failed,
    Building,
}

crate::simple_display! {
    VersionState {
        Active => "active",
        Archived => "archived",
        Failed => "failed",
        Building => "building",
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Naming scheme for orchestration resources.
//!
//! All names embed a seconds-since-epoch timestamp. Two commands for the
//! same agent landing in the same second would collide; the cluster rejects
//! the duplicate name and the second command surfaces that as a build
//! failure, which is the accepted trade-off.
//!
//! Deployment names sort lexicographically in chronological order because
//! the timestamp is the suffix — the reap policy relies on this.

/// Semantic version extracted from a version-qualified agent path.
///
/// Paths look like `/app/agents/<name>/v<semver>`; everything after the
/// last `/v` is taken, with a redundant leading `v` stripped.
pub fn version_from_path(agent_path: &str) -> Option<String> {
    let (_, suffix) = agent_path.rsplit_once("/v")?;
    let version = suffix.strip_prefix('v').unwrap_or(suffix);
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Build job correlation id: `<agent_name>-<timestamp>`.
pub fn job_id(agent_name: &str, timestamp: u64) -> String {
    format!("{agent_name}-{timestamp}")
}

/// Rebuild job correlation id: `<agent_name>-rebuild-<timestamp>`.
pub fn rebuild_job_id(agent_name: &str, timestamp: u64) -> String {
    format!("{agent_name}-rebuild-{timestamp}")
}

/// Cluster job name for a build: `job-<job_id>`.
pub fn build_job_name(job_id: &str) -> String {
    format!("job-{job_id}")
}

/// Immutable image tag minted for deploy and update builds.
pub fn image_tag(timestamp: u64) -> String {
    format!("v{timestamp}")
}

/// Image tag for a rebuild of an existing semantic version.
pub fn rebuild_image_tag(version: &str, timestamp: u64) -> String {
    format!("v{version}-rebuild-{timestamp}")
}

/// Fully qualified image reference in the platform registry.
pub fn image_destination(registry_url: &str, agent_name: &str, tag: &str) -> String {
    format!("{}/{agent_name}:{tag}", registry_url.trim_end_matches('/'))
}

/// Cluster deployment name: `agent-<agent_name>-<timestamp>`.
///
/// This doubles as the stable gateway path segment.
pub fn deployment_name(agent_name: &str, timestamp: u64) -> String {
    format!("agent-{agent_name}-{timestamp}")
}

/// Config-map name for staged agent files: `agent-files-<agent_name>-<timestamp>`.
pub fn files_configmap_name(agent_name: &str, timestamp: u64) -> String {
    format!("agent-files-{agent_name}-{timestamp}")
}

/// Public URL for a deployed agent: `<gateway>/agents/<deployment_name>`.
///
/// Trailing slashes on the gateway are stripped. A gateway of exactly
/// `http://localhost` gets `:8000` appended (local-dev convention).
pub fn public_url(gateway_url: &str, deployment_name: &str) -> String {
    let mut base = gateway_url.trim_end_matches('/').to_string();
    if gateway_url == "http://localhost" {
        base.push_str(":8000");
    }
    format!("{base}/agents/{deployment_name}")
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;

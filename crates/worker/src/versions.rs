// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version engine: semantic-version resolution and the reap policy.
//!
//! Rollback never mints an image tag. It asks the backend for the tag the
//! version's build recorded; only when no mapping exists does it fall back
//! to `v<semver>`, which keeps agents from before version mapping working.

use slipway_adapters::ClusterDriver;
use slipway_backend::BackendApi;

/// Resolve a semantic version to the immutable image tag its build pushed.
///
/// On a mapping miss the fallback tag `v<semver>` is returned and a warning
/// logged.
pub async fn resolve_image_tag<B: BackendApi>(
    backend: &B,
    base_url: &str,
    agent_id: &str,
    semantic_version: &str,
) -> String {
    if let Some(tag) = backend.resolve_version_mapping(base_url, agent_id, semantic_version).await
    {
        tracing::info!(%agent_id, %semantic_version, %tag, "resolved version mapping");
        return tag;
    }

    let fallback = format!("v{semantic_version}");
    tracing::warn!(
        %agent_id,
        %semantic_version,
        %fallback,
        "no version mapping found, using fallback tag"
    );
    fallback
}

/// Outcome of a reap pass. Failures are counted, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReapSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Choose which deployments to reap.
///
/// Version filtering matches names containing `-v<version>-` or ending in
/// `-<version>`. The survivors are sorted lexicographically — chronological,
/// given the timestamp suffix — and the newest `keep_latest` are retained.
pub fn select_for_reaping(
    mut names: Vec<String>,
    version: Option<&str>,
    keep_latest: usize,
) -> Vec<String> {
    if let Some(version) = version {
        let infix = format!("-v{version}-");
        let suffix = format!("-{version}");
        names.retain(|name| name.contains(&infix) || name.ends_with(&suffix));
    }
    names.sort();
    let keep = names.len().saturating_sub(keep_latest);
    names.truncate(keep);
    names
}

/// Delete old deployments for an agent, optionally filtered to one version.
///
/// `keep_latest` newest matches survive. Every outcome is logged; the reap
/// never fails the calling flow.
pub async fn cleanup_old_deployments<K: ClusterDriver>(
    cluster: &K,
    agent_id: Option<&str>,
    version: Option<&str>,
    keep_latest: usize,
) -> ReapSummary {
    let Some(agent_id) = agent_id else {
        return ReapSummary::default();
    };

    let names = match cluster.list_agent_deployments(agent_id).await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(%agent_id, error = %e, "failed to list deployments for cleanup");
            return ReapSummary::default();
        }
    };

    let mut summary = ReapSummary::default();
    for name in select_for_reaping(names, version, keep_latest) {
        match cluster.delete_agent_deployment(&name).await {
            Ok(()) => {
                summary.deleted += 1;
                tracing::info!(deployment = %name, "deleted old deployment");
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(deployment = %name, error = %e, "failed to delete deployment");
            }
        }
    }

    tracing::info!(
        %agent_id,
        deleted = summary.deleted,
        failed = summary.failed,
        "deployment cleanup finished"
    );
    summary
}

#[cfg(test)]
#[path = "versions_tests.rs"]
mod tests;

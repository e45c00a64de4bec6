// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-build observability staging.
//!
//! When injection is enabled, the agent's uploaded sources are pulled down,
//! run through the external tracing injector, and republished as a
//! config-map for the build job to mount instead of the raw upload. Every
//! failure path falls back to the original upload — instrumentation is
//! never allowed to break a deploy.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use thiserror::Error;

use slipway_adapters::subprocess::{run_tool, ToolError};
use slipway_adapters::{ClusterDriver, ClusterError};
use slipway_backend::BackendApi;
use slipway_core::naming;

use crate::config::WorkerConfig;
use crate::staging;

#[derive(Debug, Error)]
enum StagingError {
    #[error("agent tarball unavailable")]
    DownloadFailed,
    #[error("scratch space error: {0}")]
    Io(#[from] std::io::Error),
    #[error("injector error: {0}")]
    Injector(#[from] ToolError),
    #[error("Dockerfile missing or empty after injection")]
    DockerfileCorrupted,
    #[error("config-map publication failed: {0}")]
    Publish(#[from] ClusterError),
}

/// Environment variables exported to deployed agents so their traces land
/// in the platform collector.
pub fn agent_env_vars(config: &WorkerConfig, agent_name: &str) -> BTreeMap<String, String> {
    [
        ("PHOENIX_COLLECTOR_ENDPOINT".to_string(), config.collector_endpoint.clone()),
        ("TRACING_ENABLED".to_string(), config.tracing_enabled.to_string()),
        ("AGENT_PROJECT_NAME".to_string(), agent_name.to_string()),
    ]
    .into()
}

/// Stage instrumented sources for a build, returning the config-map name to
/// use as the build context, or `None` to build from the original upload.
pub async fn stage_instrumented_files<K, B>(
    cluster: &K,
    backend: &B,
    config: &WorkerConfig,
    base_url: &str,
    agent_name: &str,
    agent_path: Option<&str>,
    timestamp: u64,
) -> Option<String>
where
    K: ClusterDriver,
    B: BackendApi,
{
    if !config.injection_enabled {
        tracing::info!(%agent_name, "observability injection disabled, skipping");
        return None;
    }
    if !config.tracing_enabled {
        tracing::info!(%agent_name, "tracing disabled, skipping injection");
        return None;
    }
    let Some(ref injector) = config.injector_bin else {
        tracing::info!(%agent_name, "no tracing injector configured, skipping");
        return None;
    };

    match stage_inner(cluster, backend, config, injector, base_url, agent_name, agent_path, timestamp)
        .await
    {
        Ok(configmap) => {
            tracing::info!(%agent_name, %configmap, "staged instrumented agent files");
            Some(configmap)
        }
        Err(e) => {
            tracing::warn!(%agent_name, error = %e, "observability injection failed, using original files");
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn stage_inner<K, B>(
    cluster: &K,
    backend: &B,
    config: &WorkerConfig,
    injector: &Path,
    base_url: &str,
    agent_name: &str,
    agent_path: Option<&str>,
    timestamp: u64,
) -> Result<String, StagingError>
where
    K: ClusterDriver,
    B: BackendApi,
{
    let version = agent_path.and_then(naming::version_from_path);
    let bytes = backend
        .download_agent_tarball(base_url, agent_name, version.as_deref())
        .await
        .ok_or(StagingError::DownloadFailed)?;

    let scratch = tempfile::tempdir()?;
    staging::extract_tarball(bytes, scratch.path()).await?;

    // The injector edits the Dockerfile and app sources in place.
    let tree = scratch.path().display().to_string();
    run_tool(injector, &[tree.as_str(), agent_name], None).await?;

    // Post-conditions: the injector must leave a usable Dockerfile behind.
    let dockerfile = scratch.path().join("Dockerfile");
    let intact = std::fs::metadata(&dockerfile).map(|m| m.len() > 0).unwrap_or(false);
    if !intact {
        return Err(StagingError::DockerfileCorrupted);
    }

    let files = staging::collect_files(scratch.path()).await?;
    let data: BTreeMap<String, String> = files
        .into_iter()
        .map(|(path, contents)| {
            (configmap_key(&path), base64::engine::general_purpose::STANDARD.encode(contents))
        })
        .collect();

    let configmap = naming::files_configmap_name(agent_name, timestamp);
    cluster.create_configmap_with_files(&configmap, data, &config.namespace).await?;
    Ok(configmap)
}

/// Encode a relative path as a config-map key.
///
/// Keys are base64 of the path with `=` → `_eq_`, `+` → `_plus_`,
/// `/` → `_slash_` so arbitrary paths, dunder-prefixed ones included,
/// survive the store's key constraints.
pub fn configmap_key(rel_path: &str) -> String {
    base64::engine::general_purpose::STANDARD
        .encode(rel_path.as_bytes())
        .replace('=', "_eq_")
        .replace('+', "_plus_")
        .replace('/', "_slash_")
}

#[cfg(test)]
#[path = "observability_tests.rs"]
mod tests;

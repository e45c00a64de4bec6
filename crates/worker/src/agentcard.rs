// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AgentCard resolution.
//!
//! The registry document comes from the agent's own `AgentCard.json` when
//! the upload ships one. Otherwise an external generator analyses the
//! extracted sources — a heavyweight LLM-backed program, so it only runs
//! when an API key is configured and always off the stream loop. When both
//! routes fail the caller falls back to the minimal capability document.

use std::path::Path;

use serde_json::Value;

use slipway_adapters::subprocess::run_tool;
use slipway_backend::BackendApi;
use slipway_core::naming;

use crate::config::WorkerConfig;
use crate::staging;

/// Name of the capability manifest looked for at the tarball root.
const CARD_FILENAME: &str = "AgentCard.json";

/// Fetch and parse the agent's AgentCard, generating one if necessary.
///
/// Returns `None` when no card could be obtained; the caller substitutes
/// the minimal document.
pub async fn resolve_card<B: BackendApi>(
    backend: &B,
    config: &WorkerConfig,
    base_url: &str,
    agent_name: &str,
    agent_path: Option<&str>,
) -> Option<Value> {
    let version = agent_path.and_then(naming::version_from_path);
    let bytes = backend.download_agent_tarball(base_url, agent_name, version.as_deref()).await?;

    let scratch = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(%agent_name, error = %e, "no scratch space for AgentCard resolution");
            return None;
        }
    };
    if let Err(e) = staging::extract_tarball(bytes, scratch.path()).await {
        tracing::warn!(%agent_name, error = %e, "agent tarball extraction failed");
        return None;
    }

    let card_path = scratch.path().join(CARD_FILENAME);
    if card_path.exists() {
        match read_card(&card_path) {
            Ok(card) => {
                tracing::info!(%agent_name, "found AgentCard.json in agent files");
                return Some(card);
            }
            Err(e) => {
                tracing::warn!(%agent_name, error = %e, "AgentCard.json unreadable");
            }
        }
    }

    generate_card(config, agent_name, scratch.path()).await
}

fn read_card(path: &Path) -> std::io::Result<Value> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(std::io::Error::other)
}

/// Run the external AgentCard generator over an extracted source tree.
///
/// The generator prints the card as JSON on stdout.
async fn generate_card(
    config: &WorkerConfig,
    agent_name: &str,
    tree: &Path,
) -> Option<Value> {
    let Some(ref generator) = config.generator_bin else {
        tracing::info!(%agent_name, "no AgentCard generator configured");
        return None;
    };
    if config.llm_api_key.is_none() {
        tracing::warn!(%agent_name, "LLM API key not configured, cannot generate AgentCard");
        return None;
    }

    tracing::info!(%agent_name, "generating AgentCard from agent sources");
    let tree = tree.display().to_string();
    match run_tool(generator, &[tree.as_str(), agent_name], None).await {
        Ok(stdout) => match serde_json::from_str::<Value>(&stdout) {
            Ok(card) => {
                tracing::info!(%agent_name, "generated AgentCard");
                Some(card)
            }
            Err(e) => {
                tracing::warn!(%agent_name, error = %e, "generator produced invalid JSON");
                None
            }
        },
        Err(e) => {
            tracing::warn!(%agent_name, error = %e, "AgentCard generation failed");
            None
        }
    }
}

#[cfg(test)]
#[path = "agentcard_tests.rs"]
mod tests;

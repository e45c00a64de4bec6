// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External tool invocation.
//!
//! The tracing injector and the AgentCard generator are external programs.
//! They run through here so the stream loop is never blocked on them and so
//! their stdout/stderr handling is uniform.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed { tool: String, status: String, stderr: String },
    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },
}

/// Run an external tool and return its stdout on success.
///
/// `timeout` of `None` waits indefinitely — the injector is expected to
/// return within one build cycle, and a hang holds the in-flight command
/// until process restart (accepted trade-off).
pub async fn run_tool(
    program: &Path,
    args: &[&str],
    timeout: Option<Duration>,
) -> Result<String, ToolError> {
    let tool = program.display().to_string();
    tracing::info!(%tool, ?args, "running external tool");

    let mut command = tokio::process::Command::new(program);
    command.args(args).kill_on_drop(true);

    let start = std::time::Instant::now();
    let output = command.output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, output)
            .await
            .map_err(|_| ToolError::TimedOut { tool: tool.clone(), timeout: limit })?,
        None => output.await,
    }
    .map_err(|source| ToolError::Launch { tool: tool.clone(), source })?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    if output.status.success() {
        tracing::info!(%tool, elapsed_ms, "external tool finished");
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::warn!(%tool, elapsed_ms, status = %output.status, "external tool failed");
        Err(ToolError::Failed { tool, status: output.status.to_string(), stderr })
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;

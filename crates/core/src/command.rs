// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration commands and their wire parsing.
//!
//! The stream delivers a flat map of string fields. Parsing turns it into a
//! sum type with one variant per action so each flow's required fields are
//! checked once, up front, instead of ad hoc at every use site.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while interpreting a stream message.
///
/// These are recorded in the status stores and the message is still
/// acknowledged — a malformed command is never redelivered.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
}

/// How an updated agent replaces its predecessor.
///
/// `blue-green` is accepted and logged but executes with the cluster's
/// native rolling semantics; observers must not assume a traffic split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStrategy {
    #[default]
    Rolling,
    BlueGreen,
}

crate::simple_display! {
    UpdateStrategy {
        Rolling => "rolling",
        BlueGreen => "blue-green",
    }
}

impl UpdateStrategy {
    /// Unrecognised strategies fall back to rolling, matching the wire
    /// contract's tolerance for older producers.
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("blue-green") => UpdateStrategy::BlueGreen,
            _ => UpdateStrategy::Rolling,
        }
    }
}

/// Origin of the uploaded agent source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Zip,
    Directory,
    Github,
    AgentUpdate,
    GithubUpdate,
    AgentRollback,
    N8nRegister,
}

crate::simple_display! {
    UploadKind {
        Zip => "zip",
        Directory => "directory",
        Github => "github",
        AgentUpdate => "agent_update",
        GithubUpdate => "github_update",
        AgentRollback => "agent_rollback",
        N8nRegister => "n8n_register",
    }
}

impl UploadKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "zip" => Some(UploadKind::Zip),
            "directory" => Some(UploadKind::Directory),
            "github" => Some(UploadKind::Github),
            "agent_update" => Some(UploadKind::AgentUpdate),
            "github_update" => Some(UploadKind::GithubUpdate),
            "agent_rollback" => Some(UploadKind::AgentRollback),
            "n8n_register" => Some(UploadKind::N8nRegister),
            _ => None,
        }
    }
}

/// Fields shared by every orchestration command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    pub agent_name: String,
    /// Registry identifier; equals `agent_name` unless the producer says otherwise.
    pub agent_id: String,
    /// Backend-resolvable source path, possibly version-qualified (`…/v<semver>`).
    pub agent_path: Option<String>,
    pub owner_id: Option<String>,
    pub upload_id: Option<String>,
    pub upload_type: Option<UploadKind>,
    /// Per-command override of the backend API root.
    pub base_url: Option<String>,
}

/// Deploy a freshly uploaded agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCommand {
    pub header: CommandHeader,
    pub git_url: Option<String>,
    pub webhook_url: Option<String>,
}

/// Build and deploy a new version of an existing agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCommand {
    pub header: CommandHeader,
    pub new_version: String,
    pub previous_version: Option<String>,
    pub strategy: UpdateStrategy,
    pub cleanup_old: bool,
}

/// Redeploy a previously built version without building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackCommand {
    pub header: CommandHeader,
    pub target_version: String,
    pub current_version: Option<String>,
}

/// Rebuild the current version from the same sources (base image refresh).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildCommand {
    pub header: CommandHeader,
    pub version: Option<String>,
}

/// A parsed orchestration command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Deploy(DeployCommand),
    Update(UpdateCommand),
    Rollback(RollbackCommand),
    Rebuild(RebuildCommand),
}

impl Command {
    /// Parse the flat wire fields into a typed command.
    ///
    /// `action` routes; an empty `action` falls back to the legacy `command`
    /// field. Each variant's required fields are validated here so the flows
    /// can assume them.
    pub fn parse(fields: &HashMap<String, String>) -> Result<Self, CommandError> {
        let agent_name =
            non_empty(fields, "agent_name").ok_or(CommandError::MissingField("agent_name"))?;
        let action = non_empty(fields, "action")
            .or_else(|| non_empty(fields, "command"))
            .ok_or(CommandError::MissingField("action"))?;

        let header = CommandHeader {
            agent_id: non_empty(fields, "agent_id").unwrap_or_else(|| agent_name.clone()),
            agent_name,
            agent_path: non_empty(fields, "agent_path"),
            owner_id: non_empty(fields, "owner_id"),
            upload_id: non_empty(fields, "upload_id"),
            upload_type: non_empty(fields, "upload_type").and_then(|v| UploadKind::parse(&v)),
            base_url: non_empty(fields, "base_url"),
        };

        match action.as_str() {
            "deploy_agent" => Ok(Command::Deploy(DeployCommand {
                header,
                git_url: non_empty(fields, "git_url"),
                webhook_url: non_empty(fields, "webhook_url"),
            })),
            "update_agent" => Ok(Command::Update(UpdateCommand {
                header,
                new_version: non_empty(fields, "new_version")
                    .or_else(|| non_empty(fields, "target_version"))
                    .ok_or(CommandError::MissingField("new_version"))?,
                previous_version: non_empty(fields, "previous_version"),
                strategy: UpdateStrategy::parse(fields.get("update_strategy").map(String::as_str)),
                cleanup_old: parse_flag(fields.get("cleanup_old").map(String::as_str), true),
            })),
            "rollback_agent" => Ok(Command::Rollback(RollbackCommand {
                header,
                target_version: non_empty(fields, "target_version")
                    .ok_or(CommandError::MissingField("target_version"))?,
                current_version: non_empty(fields, "current_version")
                    .or_else(|| non_empty(fields, "previous_version")),
            })),
            "rebuild_agent" => Ok(Command::Rebuild(RebuildCommand {
                header,
                version: non_empty(fields, "new_version")
                    .or_else(|| non_empty(fields, "target_version")),
            })),
            other => Err(CommandError::UnknownAction(other.to_string())),
        }
    }

    /// Shared header, whichever variant this is.
    pub fn header(&self) -> &CommandHeader {
        match self {
            Command::Deploy(c) => &c.header,
            Command::Update(c) => &c.header,
            Command::Rollback(c) => &c.header,
            Command::Rebuild(c) => &c.header,
        }
    }

    /// Wire-level action label, for logging and status records.
    pub fn action(&self) -> &'static str {
        match self {
            Command::Deploy(_) => "deploy_agent",
            Command::Update(_) => "update_agent",
            Command::Rollback(_) => "rollback_agent",
            Command::Rebuild(_) => "rebuild_agent",
        }
    }
}

fn non_empty(fields: &HashMap<String, String>, key: &str) -> Option<String> {
    fields.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Parse a wire boolean, defaulting when absent or unrecognised.
fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if ["false", "0", "no"].contains(&v.as_str()) => false,
        Some(v) if ["true", "1", "yes"].contains(&v.as_str()) => true,
        _ => default,
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

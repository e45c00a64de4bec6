// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::dispatcher::test_helpers::{fields, setup, TEST_EPOCH};
use crate::dispatcher::DispatchError;
use slipway_adapters::{ClusterDriver, JobPhase};
use slipway_core::status::{DeployPhase, VersionState};

use std::collections::HashMap;

fn update_fields() -> HashMap<String, String> {
    fields(&[
        ("action", "update_agent"),
        ("agent_name", "myA"),
        ("agent_id", "myA"),
        ("agent_path", "/app/agents/myA/v1.0.1"),
        ("owner_id", "u1"),
        ("upload_id", "up2"),
        ("new_version", "1.0.1"),
        ("previous_version", "1.0.0"),
        ("update_strategy", "rolling"),
        ("cleanup_old", "true"),
    ])
}

#[tokio::test(start_paused = true)]
async fn update_with_cleanup_replaces_the_old_deployment() {
    let ctx = setup();
    // The 1.0.0 deployment predates version-suffixed names, so it matches
    // by `-v<version>-` infix.
    ctx.cluster.push_deployment("agent-myA-v1.0.0-1690000000");

    ctx.dispatcher.dispatch(&update_fields()).await.unwrap();

    // New build record mapped to 1.0.1.
    let builds = ctx.backend.build_records();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].version_mapping.semantic_version, "1.0.1");

    // New deployment running; the old version's deployment is gone.
    let deploy_updates = ctx.backend.deployment_status_updates();
    assert_eq!(deploy_updates[0].1.status, DeployPhase::Running);
    assert_eq!(ctx.cluster.deleted(), vec!["agent-myA-v1.0.0-1690000000"]);
    assert_eq!(
        ctx.cluster.list_agent_deployments("myA").await.unwrap(),
        vec![format!("agent-myA-{TEST_EPOCH}")]
    );

    // Registry version active, progress contract complete.
    assert!(ctx
        .backend
        .version_status_updates()
        .contains(&("myA".to_string(), VersionState::Active)));
    assert_eq!(ctx.backend.progress_for("myA"), vec![95, 95, 96, 97, 98, 100]);

    // Update-specific labels were written, ending in updated.
    let statuses = ctx.status.statuses_for("myA");
    assert!(statuses.contains(&"updating".to_string()));
    assert_eq!(statuses.last().unwrap(), "updated");
}

#[tokio::test(start_paused = true)]
async fn cleanup_false_leaves_old_deployments() {
    let ctx = setup();
    ctx.cluster.push_deployment("agent-myA-v1.0.0-1690000000");

    let mut fields = update_fields();
    fields.insert("cleanup_old".to_string(), "false".to_string());
    ctx.dispatcher.dispatch(&fields).await.unwrap();

    assert!(ctx.cluster.deleted().is_empty());
    let uploads = ctx.backend.upload_updates("myA");
    assert_eq!(uploads.last().unwrap().extra["cleanup_performed"], false);
}

#[tokio::test(start_paused = true)]
async fn unknown_previous_version_cleanup_is_silent() {
    let ctx = setup();
    ctx.cluster.push_deployment("agent-myA-v0.9.0-1680000000");

    ctx.dispatcher.dispatch(&update_fields()).await.unwrap();

    // Nothing matched 1.0.0; nothing deleted, flow still completed.
    assert!(ctx.cluster.deleted().is_empty());
    assert_eq!(ctx.backend.progress_for("myA").last(), Some(&100));
}

#[tokio::test(start_paused = true)]
async fn blue_green_is_accepted_and_runs_rolling() {
    let ctx = setup();
    let mut fields = update_fields();
    fields.insert("update_strategy".to_string(), "blue-green".to_string());

    ctx.dispatcher.dispatch(&fields).await.unwrap();

    let uploads = ctx.backend.upload_updates("myA");
    assert_eq!(uploads.last().unwrap().extra["update_strategy"], "blue-green");
    assert_eq!(ctx.cluster.deployed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn update_build_failure_reports_versions() {
    let ctx = setup();
    ctx.cluster
        .script_job_phases(&format!("job-myA-{TEST_EPOCH}"), &[JobPhase::Failed]);

    let err = ctx.dispatcher.dispatch(&update_fields()).await.unwrap_err();
    assert!(matches!(err, DispatchError::BuildFailed(_)));

    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "update_failed");
    let uploads = ctx.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.progress_percentage, 0);
    assert_eq!(last.extra["failed_version"], "1.0.1");
    assert_eq!(last.extra["previous_version"], "1.0.0");
}

#[tokio::test(start_paused = true)]
async fn github_update_without_path_records_placeholder_filename() {
    let ctx = setup();
    let mut fields = update_fields();
    fields.remove("agent_path");
    fields.insert("upload_type".to_string(), "github_update".to_string());

    ctx.dispatcher.dispatch(&fields).await.unwrap();

    let uploads = ctx.backend.upload_updates("myA");
    assert_eq!(uploads.last().unwrap().extra["filename"], "github-update");
}

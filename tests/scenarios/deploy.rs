// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deploy scenarios: the happy path, build failure, and the missing-owner
//! variant.

use crate::prelude::*;
use slipway_adapters::JobPhase;
use slipway_core::status::{BuildPhase, DeployPhase, VersionState};

fn deploy_command() -> std::collections::HashMap<String, String> {
    fields(&[
        ("action", "deploy_agent"),
        ("agent_name", "myA"),
        ("agent_path", "/app/agents/myA/v1.0.0"),
        ("owner_id", "u1"),
        ("upload_id", "up1"),
        ("upload_type", "zip"),
    ])
}

/// A deploy whose build succeeds quickly ends with every record in its
/// final state: build success with the 1.0.0 mapping, deployment running
/// behind the gateway URL, registry entry owned, permissions granted,
/// upload completed at 100, and the version flipped to active.
#[tokio::test(start_paused = true)]
async fn happy_deploy_end_state() {
    let world = World::new();
    world.cluster.script_job_phases(
        &format!("job-myA-{EPOCH}"),
        &[JobPhase::Pending, JobPhase::Active, JobPhase::Succeeded],
    );

    world.dispatcher.dispatch(&deploy_command()).await.unwrap();

    let builds = world.backend.build_records();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].version_tag, "1.0.0");
    assert_eq!(world.backend.build_status_updates()[0].1.status, BuildPhase::Success);

    let deployments = world.backend.deployment_records();
    assert_eq!(deployments.len(), 1);
    let (_, running) = &world.backend.deployment_status_updates()[0];
    assert_eq!(running.status, DeployPhase::Running);
    assert_eq!(
        running.service_url.as_deref(),
        Some(format!("http://gw.example/agents/agent-myA-{EPOCH}").as_str())
    );

    let registered = world.backend.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].1["owner_id"], "u1");
    assert_eq!(world.auth.grants(), vec![("myA".to_string(), "u1".to_string())]);

    let uploads = world.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.progress_percentage, 100);
    assert_eq!(last.status.to_string(), "completed");

    assert_eq!(
        world.backend.version_status_updates(),
        vec![("myA".to_string(), VersionState::Active)]
    );
}

/// Upload progress on a successful deploy passes through
/// 95, 96, 97, 98, 100 in order and never decreases.
#[tokio::test(start_paused = true)]
async fn progress_is_monotonic_on_success() {
    let world = World::new();

    world.dispatcher.dispatch(&deploy_command()).await.unwrap();

    let progress = world.backend.progress_for("myA");
    assert_eq!(progress, vec![95, 96, 97, 98, 100]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

/// One message produces at most one build record, one deployment record,
/// and one registry upsert.
#[tokio::test(start_paused = true)]
async fn one_message_one_set_of_effects() {
    let world = World::new();

    world.dispatcher.dispatch(&deploy_command()).await.unwrap();

    assert_eq!(world.backend.build_records().len(), 1);
    assert_eq!(world.backend.deployment_records().len(), 1);
    assert_eq!(world.backend.registered().len(), 1);
    assert_eq!(world.cluster.build_jobs().len(), 1);
    assert_eq!(world.cluster.deployed().len(), 1);
}

/// When the build job reports failure at the second poll, the build record
/// flips to failed, no deployment record is created, the upload fails at
/// progress 0 naming the job, and the agent status is the failed variant.
#[tokio::test(start_paused = true)]
async fn build_failure_end_state() {
    let world = World::new();
    world.cluster.script_job_phases(
        &format!("job-myA-{EPOCH}"),
        &[JobPhase::Active, JobPhase::Failed],
    );

    world.dispatcher.dispatch(&deploy_command()).await.unwrap_err();

    let build_updates = world.backend.build_status_updates();
    assert_eq!(build_updates.len(), 1);
    assert_eq!(build_updates[0].1.status, BuildPhase::Failed);

    assert!(world.backend.deployment_records().is_empty());
    assert!(world.cluster.deployed().is_empty());

    let uploads = world.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.status.to_string(), "failed");
    assert_eq!(last.progress_percentage, 0);
    assert_eq!(
        last.extra["error_details"],
        serde_json::json!([format!("Build job job-myA-{EPOCH} failed")])
    );

    assert_eq!(world.status.last_for("myA").unwrap()["status"], "failed");
}

/// Without an owner the permissions step is skipped, everything else
/// completes, and the completion payload records permissions_created=false.
#[tokio::test(start_paused = true)]
async fn missing_owner_skips_permissions() {
    let world = World::new();
    let mut command = deploy_command();
    command.remove("owner_id");

    world.dispatcher.dispatch(&command).await.unwrap();

    assert!(world.auth.grants().is_empty());
    assert_eq!(world.status.last_for("myA").unwrap()["status"], "running");

    let uploads = world.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.status.to_string(), "completed");
    assert_eq!(last.extra["permissions_created"], false);
}

/// URL construction: a normal gateway yields
/// `<gateway>/agents/agent-<name>-<ts>`; the localhost gateway gains :8000.
#[tokio::test(start_paused = true)]
async fn gateway_url_shapes() {
    let world = World::new();
    world.dispatcher.dispatch(&deploy_command()).await.unwrap();
    assert_eq!(
        world.backend.registered()[0].1["url"],
        format!("http://gw.example/agents/agent-myA-{EPOCH}")
    );

    let mut config = slipway_worker::WorkerConfig::for_tests();
    config.gateway_url = "http://localhost".to_string();
    let local = World::with_config(config);
    local.dispatcher.dispatch(&deploy_command()).await.unwrap();
    assert_eq!(
        local.backend.registered()[0].1["url"],
        format!("http://localhost:8000/agents/agent-myA-{EPOCH}")
    );
}

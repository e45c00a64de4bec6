// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::dispatcher::test_helpers::{fields, setup, TEST_EPOCH};
use crate::dispatcher::DispatchError;
use slipway_adapters::{ClusterDriver, JobPhase};

use std::collections::HashMap;

fn rebuild_fields() -> HashMap<String, String> {
    fields(&[
        ("action", "rebuild_agent"),
        ("agent_name", "myA"),
        ("agent_id", "myA"),
        ("agent_path", "/app/agents/myA/v1.2.0"),
        ("owner_id", "u1"),
        ("new_version", "1.2.0"),
    ])
}

#[tokio::test(start_paused = true)]
async fn rebuild_mints_a_rebuild_tag_and_keeps_the_newest() {
    let ctx = setup();
    ctx.cluster.push_deployment("agent-myA-v1.2.0-1690000000");
    ctx.cluster.push_deployment("agent-myA-1.2.0");

    ctx.dispatcher.dispatch(&rebuild_fields()).await.unwrap();

    // Image tag encodes the semver and the rebuild timestamp.
    let builds = ctx.backend.build_records();
    assert_eq!(builds.len(), 1);
    assert_eq!(
        builds[0].image_reference,
        format!("registry.test:5000/myA:v1.2.0-rebuild-{TEST_EPOCH}")
    );
    assert_eq!(builds[0].k8s_job_name, format!("job-myA-rebuild-{TEST_EPOCH}"));
    assert_eq!(builds[0].version_mapping.semantic_version, "1.2.0");

    // keep_latest=1: of the deployments named for 1.2.0, only the newest
    // survives, alongside the deployment just created.
    assert_eq!(ctx.cluster.deleted(), vec!["agent-myA-1.2.0"]);
    let live = ctx.cluster.list_agent_deployments("myA").await.unwrap();
    let version_named: Vec<&String> =
        live.iter().filter(|n| n.contains("-v1.2.0-") || n.ends_with("-1.2.0")).collect();
    assert_eq!(version_named, vec!["agent-myA-v1.2.0-1690000000"]);
    assert!(live.contains(&format!("agent-myA-{TEST_EPOCH}")));

    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "rebuilt");
    assert_eq!(ctx.backend.progress_for("myA"), vec![95, 96, 97, 98, 100]);
}

#[tokio::test(start_paused = true)]
async fn rebuild_version_falls_back_to_the_path() {
    let ctx = setup();
    let mut fields = rebuild_fields();
    fields.remove("new_version");

    ctx.dispatcher.dispatch(&fields).await.unwrap();

    assert_eq!(ctx.backend.build_records()[0].version_tag, "1.2.0");
}

#[tokio::test(start_paused = true)]
async fn rebuild_build_failure_is_recorded() {
    let ctx = setup();
    ctx.cluster
        .script_job_phases(&format!("job-myA-rebuild-{TEST_EPOCH}"), &[JobPhase::Failed]);

    let err = ctx.dispatcher.dispatch(&rebuild_fields()).await.unwrap_err();
    assert!(matches!(err, DispatchError::BuildFailed(_)));
    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "rebuild_failed");
    assert_eq!(ctx.backend.upload_updates("myA").last().unwrap().progress_percentage, 0);
}

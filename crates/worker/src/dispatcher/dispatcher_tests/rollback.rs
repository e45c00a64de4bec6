// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::dispatcher::test_helpers::{fields, setup, TEST_EPOCH};
use crate::dispatcher::DispatchError;
use slipway_core::status::DeployPhase;

use std::collections::HashMap;

fn rollback_fields() -> HashMap<String, String> {
    fields(&[
        ("action", "rollback_agent"),
        ("agent_name", "myA"),
        ("agent_id", "myA"),
        ("agent_path", "/app/agents/myA"),
        ("owner_id", "u1"),
        ("target_version", "1.0.0"),
        ("current_version", "1.0.1"),
    ])
}

#[tokio::test(start_paused = true)]
async fn rollback_deploys_the_mapped_tag() {
    let ctx = setup();
    ctx.backend.map_version("myA", "1.0.0", "v1690000000");
    ctx.cluster.push_deployment("agent-myA-v1.0.1-1695000000");

    ctx.dispatcher.dispatch(&rollback_fields()).await.unwrap();

    // The driver deployed the mapped immutable tag, not a synthesized one.
    let deployed = ctx.cluster.deployed();
    assert_eq!(deployed.len(), 1);
    assert_eq!(deployed[0].image_reference, "registry.test:5000/myA:v1690000000");

    // No build happened.
    assert!(ctx.cluster.build_jobs().is_empty());
    assert!(ctx.backend.build_records().is_empty());
    let records = ctx.backend.deployment_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].build_id, None);

    // The failed current version's deployments are gone.
    assert_eq!(ctx.cluster.deleted(), vec!["agent-myA-v1.0.1-1695000000"]);

    // Registry points at the new URL; statuses flipped.
    let deploy_updates = ctx.backend.deployment_status_updates();
    assert_eq!(deploy_updates[0].1.status, DeployPhase::Running);
    assert_eq!(ctx.backend.registered().len(), 1);
    assert_eq!(
        ctx.backend.registered()[0].1["url"],
        format!("http://gw.example/agents/agent-myA-{TEST_EPOCH}")
    );
    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "rolled_back");
}

#[tokio::test(start_paused = true)]
async fn missing_mapping_falls_back_to_semver_tag() {
    let ctx = setup();

    ctx.dispatcher.dispatch(&rollback_fields()).await.unwrap();

    let deployed = ctx.cluster.deployed();
    assert_eq!(deployed[0].image_reference, "registry.test:5000/myA:v1.0.0");
}

#[tokio::test(start_paused = true)]
async fn rollback_deploy_failure_is_recorded() {
    let ctx = setup();
    ctx.cluster.fail_next_deploy("image missing");

    let err = ctx.dispatcher.dispatch(&rollback_fields()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Deploy(_)));

    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "rollback_failed");
    let uploads = ctx.backend.upload_updates("myA");
    assert_eq!(uploads.last().unwrap().progress_percentage, 0);
    // No cleanup ran: the current version's deployments are untouched.
    assert!(ctx.cluster.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rollback_without_current_version_reaps_nothing() {
    let ctx = setup();
    ctx.backend.map_version("myA", "1.0.0", "v1690000000");
    ctx.cluster.push_deployment("agent-myA-v1.0.1-1695000000");

    let mut fields = rollback_fields();
    fields.remove("current_version");
    ctx.dispatcher.dispatch(&fields).await.unwrap();

    assert!(ctx.cluster.deleted().is_empty());
    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "rolled_back");
}

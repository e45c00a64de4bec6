// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rollback scenarios: mapped-tag resolution and cleanup of the version
//! being rolled away from.

use crate::prelude::*;

fn rollback_command() -> std::collections::HashMap<String, String> {
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

/// Agent myA is at 1.0.1; a build record maps 1.0.0 to `v1700000000`.
/// Rolling back to 1.0.0 deploys exactly that mapped image, updates the
/// registry URL, and removes the 1.0.1 deployment. No build runs.
#[tokio::test(start_paused = true)]
async fn rollback_uses_the_mapped_tag() {
    let world = World::new();
    world.backend.map_version("myA", "1.0.0", "v1700000000");
    world.cluster.push_deployment("agent-myA-v1.0.1-1695000000");

    world.dispatcher.dispatch(&rollback_command()).await.unwrap();

    let deployed = world.cluster.deployed();
    assert_eq!(deployed.len(), 1);
    assert_eq!(deployed[0].image_reference, "registry.test:5000/myA:v1700000000");

    assert!(world.cluster.build_jobs().is_empty());
    assert!(world.backend.build_records().is_empty());

    assert_eq!(
        world.backend.registered()[0].1["url"],
        format!("http://gw.example/agents/agent-myA-{EPOCH}")
    );

    // The failed current version has zero deployments left.
    let live = world.cluster.list_agent_deployments("myA").await.unwrap();
    assert!(live.iter().all(|name| !name.contains("-v1.0.1-") && !name.ends_with("-1.0.1")));
    assert_eq!(world.cluster.deleted(), vec!["agent-myA-v1.0.1-1695000000"]);
}

/// With no mapping recorded for the target version, the deployed tag is
/// the backward-compatible `v<target_version>`.
#[tokio::test(start_paused = true)]
async fn rollback_without_mapping_uses_fallback_tag() {
    let world = World::new();

    world.dispatcher.dispatch(&rollback_command()).await.unwrap();

    assert_eq!(
        world.cluster.deployed()[0].image_reference,
        "registry.test:5000/myA:v1.0.0"
    );
}

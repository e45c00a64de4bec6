// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rebuild scenario: same version, fresh image, older instances reaped.

use crate::prelude::*;

/// Rebuilding 1.2.0 mints a `v1.2.0-rebuild-<ts>` tag, deploys it, and of
/// the deployments named for 1.2.0 keeps only the newest.
#[tokio::test(start_paused = true)]
async fn rebuild_end_state() {
    let world = World::new();
    world.cluster.push_deployment("agent-myA-v1.2.0-1680000000");
    world.cluster.push_deployment("agent-myA-v1.2.0-1690000000");

    world
        .dispatcher
        .dispatch(&fields(&[
            ("action", "rebuild_agent"),
            ("agent_name", "myA"),
            ("agent_id", "myA"),
            ("agent_path", "/app/agents/myA/v1.2.0"),
            ("owner_id", "u1"),
            ("new_version", "1.2.0"),
        ]))
        .await
        .unwrap();

    let builds = world.backend.build_records();
    assert_eq!(builds.len(), 1);
    assert_eq!(
        builds[0].image_reference,
        format!("registry.test:5000/myA:v1.2.0-rebuild-{EPOCH}")
    );

    // Older 1.2.0 instances reaped, newest version-named one retained.
    assert_eq!(world.cluster.deleted(), vec!["agent-myA-v1.2.0-1680000000"]);
    let live = world.cluster.list_agent_deployments("myA").await.unwrap();
    assert!(live.contains(&"agent-myA-v1.2.0-1690000000".to_string()));
    assert!(live.contains(&format!("agent-myA-{EPOCH}")));

    assert_eq!(world.status.last_for("myA").unwrap()["status"], "rebuilt");
    assert_eq!(world.backend.progress_for("myA"), vec![95, 96, 97, 98, 100]);
}

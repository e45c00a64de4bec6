// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update scenario: new version built and deployed, old version reaped.

use crate::prelude::*;
use slipway_core::status::{DeployPhase, VersionState};

/// Agent myA sits at 1.0.0 with one live deployment. An update to 1.0.1
/// with cleanup builds a record mapping 1.0.1, brings up a new running
/// deployment, deletes the old one, flips the registry version to active,
/// and completes the upload at 100.
#[tokio::test(start_paused = true)]
async fn update_with_cleanup_end_state() {
    let world = World::new();
    world.cluster.push_deployment("agent-myA-v1.0.0-1690000000");

    world
        .dispatcher
        .dispatch(&fields(&[
            ("action", "update_agent"),
            ("agent_name", "myA"),
            ("agent_id", "myA"),
            ("agent_path", "/app/agents/myA/v1.0.1"),
            ("owner_id", "u1"),
            ("new_version", "1.0.1"),
            ("previous_version", "1.0.0"),
            ("update_strategy", "rolling"),
            ("cleanup_old", "true"),
        ]))
        .await
        .unwrap();

    let builds = world.backend.build_records();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].version_mapping.semantic_version, "1.0.1");
    assert_eq!(builds[0].version_mapping.image_tag, format!("v{EPOCH}"));

    let deploy_updates = world.backend.deployment_status_updates();
    assert_eq!(deploy_updates.len(), 1);
    assert_eq!(deploy_updates[0].1.status, DeployPhase::Running);

    assert_eq!(world.cluster.deleted(), vec!["agent-myA-v1.0.0-1690000000"]);
    assert_eq!(
        world.cluster.list_agent_deployments("myA").await.unwrap(),
        vec![format!("agent-myA-{EPOCH}")]
    );

    assert!(world
        .backend
        .version_status_updates()
        .contains(&("myA".to_string(), VersionState::Active)));

    let uploads = world.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.status.to_string(), "completed");
    assert_eq!(last.progress_percentage, 100);
    assert_eq!(last.extra["active_version"], "1.0.1");
}

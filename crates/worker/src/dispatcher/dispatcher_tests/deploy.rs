// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::dispatcher::test_helpers::{deploy_fields, setup, setup_with, TEST_EPOCH};
use crate::dispatcher::DispatchError;
use crate::config::WorkerConfig;
use slipway_adapters::{BuildSource, JobPhase};
use slipway_core::status::{BuildPhase, DeployPhase, VersionState};

#[tokio::test(start_paused = true)]
async fn happy_deploy_reaches_every_contract_point() {
    let ctx = setup();
    ctx.backend.put_tarball(
        "myA",
        crate::staging::make_tarball(&[("AgentCard.json", br#"{"name": "My Agent"}"#.as_slice())]),
    );

    ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap();

    // Exactly one build record, carrying the version mapping.
    let builds = ctx.backend.build_records();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].version_tag, "1.0.0");
    assert_eq!(builds[0].version_mapping.semantic_version, "1.0.0");
    assert_eq!(builds[0].version_mapping.image_tag, format!("v{TEST_EPOCH}"));
    assert_eq!(builds[0].k8s_job_name, format!("job-myA-{TEST_EPOCH}"));

    // Build marked successful.
    let build_updates = ctx.backend.build_status_updates();
    assert_eq!(build_updates.len(), 1);
    assert_eq!(build_updates[0].1.status, BuildPhase::Success);

    // Exactly one deployment record, transitioned to running with the URL.
    let deployments = ctx.backend.deployment_records();
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].k8s_deployment_name, format!("agent-myA-{TEST_EPOCH}"));
    let deploy_updates = ctx.backend.deployment_status_updates();
    assert_eq!(deploy_updates.len(), 1);
    assert_eq!(deploy_updates[0].1.status, DeployPhase::Running);
    assert_eq!(
        deploy_updates[0].1.service_url.as_deref(),
        Some(format!("http://gw.example/agents/agent-myA-{TEST_EPOCH}").as_str())
    );

    // Exactly one registry upsert with the owner stamped in.
    let registered = ctx.backend.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].1["owner_id"], "u1");
    assert_eq!(registered[0].1["deployment_type"], "kubernetes");
    assert_eq!(registered[0].1["name"], "My Agent");

    // Permissions created for the owner.
    assert_eq!(ctx.auth.grants(), vec![("myA".to_string(), "u1".to_string())]);

    // Progress passed through the full contract sequence in order.
    assert_eq!(ctx.backend.progress_for("myA"), vec![95, 96, 97, 98, 100]);

    // Registry version flipped to active.
    assert_eq!(
        ctx.backend.version_status_updates(),
        vec![("myA".to_string(), VersionState::Active)]
    );

    // Volatile status ended at running.
    assert_eq!(
        ctx.status.statuses_for("myA"),
        vec!["processing", "building", "deploying", "running"]
    );
}

#[tokio::test(start_paused = true)]
async fn build_failure_marks_all_derived_records() {
    let ctx = setup();
    ctx.cluster.script_job_phases(
        &format!("job-myA-{TEST_EPOCH}"),
        &[JobPhase::Active, JobPhase::Failed],
    );

    let err = ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap_err();
    assert!(matches!(err, DispatchError::BuildFailed(_)));

    // Build record flipped to failed with the job name in the message.
    let build_updates = ctx.backend.build_status_updates();
    assert_eq!(build_updates.len(), 1);
    assert_eq!(build_updates[0].1.status, BuildPhase::Failed);
    assert_eq!(
        build_updates[0].1.error_message.as_deref(),
        Some(format!("Build job job-myA-{TEST_EPOCH} failed").as_str())
    );

    // No deployment record was created.
    assert!(ctx.backend.deployment_records().is_empty());

    // Upload failed at progress 0 with error details.
    let uploads = ctx.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.progress_percentage, 0);
    assert_eq!(last.status.to_string(), "failed");
    assert_eq!(
        last.extra["error_details"][0],
        format!("Build job job-myA-{TEST_EPOCH} failed")
    );

    // Agent status is the failed variant.
    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "failed");
}

#[tokio::test(start_paused = true)]
async fn build_timeout_fails_the_command() {
    let ctx = setup();
    ctx.cluster
        .script_job_phases(&format!("job-myA-{TEST_EPOCH}"), &[JobPhase::Active]);

    let err = ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap_err();
    assert!(matches!(err, DispatchError::BuildTimeout { timeout_secs: 600, .. }));
    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "failed");
}

#[tokio::test(start_paused = true)]
async fn unknown_job_phases_do_not_fail_the_build() {
    let ctx = setup();
    ctx.cluster.script_job_phases(
        &format!("job-myA-{TEST_EPOCH}"),
        &[JobPhase::Unknown, JobPhase::Unknown, JobPhase::Succeeded],
    );

    ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap();
    assert_eq!(ctx.backend.build_status_updates()[0].1.status, BuildPhase::Success);
}

#[tokio::test(start_paused = true)]
async fn missing_owner_skips_permissions_but_completes() {
    let ctx = setup();
    let mut fields = deploy_fields();
    fields.remove("owner_id");

    ctx.dispatcher.dispatch(&fields).await.unwrap();

    assert!(ctx.auth.grants().is_empty());
    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "running");

    let uploads = ctx.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.progress_percentage, 100);
    assert_eq!(last.extra["permissions_created"], false);
    // Registered without an owner field.
    assert!(ctx.backend.registered()[0].1.get("owner_id").is_none());
}

#[tokio::test(start_paused = true)]
async fn registry_failure_blocks_permissions_only() {
    let ctx = setup();
    ctx.backend.fail_register();

    ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap();

    assert!(ctx.auth.grants().is_empty());
    let uploads = ctx.backend.upload_updates("myA");
    let last = uploads.last().unwrap();
    assert_eq!(last.progress_percentage, 100);
    assert_eq!(last.extra["registry_updated"], false);
    assert_eq!(last.extra["permissions_created"], false);
}

#[tokio::test(start_paused = true)]
async fn git_builds_use_the_git_source() {
    let ctx = setup();
    let mut fields = deploy_fields();
    fields.insert("git_url".to_string(), "https://example.com/repo.git".to_string());

    ctx.dispatcher.dispatch(&fields).await.unwrap();

    let jobs = ctx.cluster.build_jobs();
    assert_eq!(jobs.len(), 1);
    assert!(matches!(
        jobs[0].source,
        BuildSource::Git { ref url } if url == "https://example.com/repo.git"
    ));
}

#[tokio::test(start_paused = true)]
async fn deploy_rejection_records_deployment_failure() {
    let ctx = setup();
    ctx.cluster.fail_next_deploy("no capacity");

    let err = ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Deploy(_)));

    let deploy_updates = ctx.backend.deployment_status_updates();
    assert_eq!(deploy_updates.len(), 1);
    assert_eq!(deploy_updates[0].1.status, DeployPhase::Failed);
    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "failed");
}

#[tokio::test(start_paused = true)]
async fn webhook_env_only_for_n8n_uploads() {
    let ctx = setup();
    let mut fields = deploy_fields();
    fields.insert("upload_type".to_string(), "n8n_register".to_string());
    fields.insert("webhook_url".to_string(), "http://hooks.example/myA".to_string());

    ctx.dispatcher.dispatch(&fields).await.unwrap();

    let deployed = ctx.cluster.deployed();
    assert_eq!(deployed[0].env["WEBHOOK_URL"], "http://hooks.example/myA");
    assert_eq!(deployed[0].env["AGENT_NAME"], "myA");
    assert_eq!(deployed[0].env["OWNER_ID"], "u1");
    assert_eq!(deployed[0].port, 5000);
}

#[tokio::test(start_paused = true)]
async fn localhost_gateway_gets_dev_port() {
    let mut config = WorkerConfig::for_tests();
    config.gateway_url = "http://localhost".to_string();
    let ctx = setup_with(config);

    ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap();

    let deploy_updates = ctx.backend.deployment_status_updates();
    assert_eq!(
        deploy_updates[0].1.service_url.as_deref(),
        Some(format!("http://localhost:8000/agents/agent-myA-{TEST_EPOCH}").as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn unconfigured_gateway_fails_the_command() {
    let mut config = WorkerConfig::for_tests();
    config.gateway_url = String::new();
    let ctx = setup_with(config);

    let err = ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap_err();
    assert!(matches!(err, DispatchError::GatewayUnconfigured));
}

#[tokio::test(start_paused = true)]
async fn status_store_outage_does_not_abort_the_flow() {
    let ctx = setup();
    ctx.status.fail_writes();

    ctx.dispatcher.dispatch(&deploy_fields()).await.unwrap();
    assert_eq!(ctx.backend.progress_for("myA"), vec![95, 96, 97, 98, 100]);
}

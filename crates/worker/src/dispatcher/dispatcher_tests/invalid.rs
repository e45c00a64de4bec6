// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::dispatcher::test_helpers::{fields, setup};
use crate::dispatcher::DispatchError;
use slipway_core::CommandError;

#[tokio::test]
async fn unknown_action_is_recorded_and_returned() {
    let ctx = setup();

    let err = ctx
        .dispatcher
        .dispatch(&fields(&[("action", "explode_agent"), ("agent_name", "myA")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Command(CommandError::UnknownAction(ref label)) if label == "explode_agent"
    ));

    // The error status names the failure; no flow side effects happened.
    let last = ctx.status.last_for("myA").unwrap();
    assert_eq!(last["status"], "error");
    assert!(last["message"].contains("explode_agent"));
    assert!(ctx.backend.build_records().is_empty());
    assert!(ctx.cluster.deployed().is_empty());
}

#[tokio::test]
async fn missing_agent_name_writes_no_status() {
    let ctx = setup();

    let err = ctx
        .dispatcher
        .dispatch(&fields(&[("action", "deploy_agent")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Command(CommandError::MissingField("agent_name"))
    ));
    assert!(ctx.status.writes().is_empty());
}

#[tokio::test]
async fn legacy_command_field_still_routes() {
    let ctx = setup();

    ctx.dispatcher
        .dispatch(&fields(&[("command", "deploy_agent"), ("agent_name", "myA")]))
        .await
        .unwrap();

    assert_eq!(ctx.status.last_for("myA").unwrap()["status"], "running");
}

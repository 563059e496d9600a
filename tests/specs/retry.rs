// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery retry, poison, and timeout boundaries.

use crate::prelude::*;
use berth_adapters::{Broker, Subscription};
use berth_core::subject::{SUBJECT_OP_POISON, SUBJECT_REGISTRATION_DONE};
use berth_core::{OpStatus, ProjectPhase};
use berth_engine::test_helpers::TestContext;
use berth_engine::{EngineConfig, EngineError, PoisonRecord};
use std::time::Duration;

#[tokio::test]
async fn transient_publish_failure_retries_without_duplicate_step() {
    let ctx = TestContext::new();
    ctx.platform.start();

    // First attempt to publish the registrar's result fails
    ctx.broker.fail_publish(SUBJECT_REGISTRATION_DONE, 1);

    let (_, outcome) = ctx.platform.create_project(svc_spec()).await.unwrap();
    assert_eq!(outcome.op.status, OpStatus::Done);

    let registrar: Vec<_> = outcome
        .op
        .steps
        .iter()
        .filter(|s| s.worker == "registrar")
        .collect();
    assert_eq!(registrar.len(), 1);
    assert!(registrar[0].ended_at_ms > 0);
    assert!(registrar[0].error.is_empty());
}

#[tokio::test]
async fn persistent_publish_failure_poisons_the_op() {
    let mut config = EngineConfig::fast();
    config.api_wait = Duration::from_millis(500);
    let ctx = TestContext::with_config(config);
    ctx.platform.start();

    let mut poison = ctx
        .broker
        .pull_subscribe(
            SUBJECT_OP_POISON,
            berth_adapters::ConsumerConfig::new("spec-poison"),
        )
        .await
        .unwrap();
    ctx.broker.fail_publish_always(SUBJECT_REGISTRATION_DONE);

    // The caller surfaces a failure; the op record carries the diagnosis
    let err = ctx.platform.create_project(svc_spec()).await.err().unwrap();
    assert_eq!(err.status_code(), 500);

    let delivery = tokio::time::timeout(Duration::from_secs(5), poison.next())
        .await
        .unwrap()
        .unwrap();
    let record: PoisonRecord = serde_json::from_slice(&delivery.payload).unwrap();
    delivery.ack().await;
    assert_eq!(record.subject, SUBJECT_REGISTRATION_DONE);

    let op = ctx.platform.get_op(&record.op_id).await.unwrap();
    assert_eq!(op.status, OpStatus::Error);
    assert!(op.error.contains("worker delivery exhausted retries"));
}

#[tokio::test]
async fn api_timeout_fails_op_but_late_workers_still_record() {
    let mut config = EngineConfig::fast();
    config.api_wait = Duration::from_millis(100);
    let ctx = TestContext::with_config(config);
    // No workers yet: the enqueue must time out

    let err = ctx.platform.create_project(svc_spec()).await.err().unwrap();
    assert!(matches!(err, EngineError::Timeout));

    let project = &ctx.platform.list_projects().await.unwrap()[0];
    let op_id = project.status.last_op_id.clone();
    let op = ctx.platform.get_op(&op_id).await.unwrap();
    assert_eq!(op.status, OpStatus::Error);
    assert_eq!(op.error, "timeout waiting for workers");
    assert_eq!(project.status.phase, ProjectPhase::Error);

    // Workers arriving later still drain the queued message into step
    // records on the stored op
    ctx.platform.start();
    let op = wait_for_op(&ctx, &op_id, |op| {
        op.steps.len() == 4 && op.steps.iter().all(|s| !s.is_open())
    })
    .await;
    assert_eq!(op.status, OpStatus::Error);
}

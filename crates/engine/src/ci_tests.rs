// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::EngineError;
use crate::test_helpers::TestContext;
use berth_core::test_support::sample_spec;
use berth_core::{OpStatus, ProjectPhase};
use std::time::Duration;

async fn ready_project(ctx: &TestContext) -> String {
    let (project, _) = ctx.platform.create_project(sample_spec("svc")).await.unwrap();
    project.id.as_str().to_string()
}

fn push(project_id: &str, commit: &str) -> SourceRepoWebhookEvent {
    SourceRepoWebhookEvent {
        project_id: project_id.to_string(),
        commit: commit.to_string(),
        message: format!("feat: commit {}", commit),
    }
}

/// Poll until the op completes or the deadline passes.
async fn wait_done(ctx: &TestContext, op_id: &str) -> berth_core::Operation {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(op) = ctx.platform.get_op(op_id).await {
            if op.is_terminal() {
                return op;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("ci op {} never finished", op_id);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn webhook_enqueues_ci_starting_at_build() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = ready_project(&ctx).await;

    let outcome = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .unwrap();
    assert!(outcome.accepted);
    let op_id = outcome.op_id.unwrap();

    let op = wait_done(&ctx, &op_id).await;
    assert_eq!(op.kind, berth_core::OpKind::Ci);
    assert_eq!(op.status, OpStatus::Done);
    let workers: Vec<&str> = op.steps.iter().map(|s| s.worker.as_str()).collect();
    assert_eq!(workers, vec!["image-builder", "manifest-renderer"]);

    let project = ctx.platform.get_project(&project_id).await.unwrap();
    assert_eq!(project.status.phase, ProjectPhase::Ready);
}

#[tokio::test]
async fn duplicate_commit_is_ignored() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = ready_project(&ctx).await;

    let first = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .unwrap();
    wait_done(&ctx, &first.op_id.clone().unwrap()).await;

    let second = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .unwrap();
    assert!(!second.accepted);
    assert_eq!(second.reason, REASON_COMMIT_SEEN);
    assert!(second.op_id.is_none());
}

#[tokio::test]
async fn concurrent_triggers_for_same_commit_yield_one_op() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = ready_project(&ctx).await;

    // Webhook and watcher racing on the same commit
    let (a, b) = tokio::join!(
        ctx.platform.trigger_source_repo_ci(push(&project_id, "c1")),
        ctx.platform.trigger_source_repo_ci(push(&project_id, "c1")),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let accepted: Vec<&CiTriggerOutcome> = [&a, &b].into_iter().filter(|o| o.accepted).collect();
    assert_eq!(accepted.len(), 1);
    let loser = if a.accepted { &b } else { &a };
    assert_eq!(loser.reason, REASON_COMMIT_SEEN);

    let op = wait_done(&ctx, accepted[0].op_id.as_deref().unwrap()).await;
    assert_eq!(op.status, OpStatus::Done);
}

#[tokio::test]
async fn platform_sync_commits_are_ignored() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = ready_project(&ctx).await;

    let outcome = ctx
        .platform
        .trigger_source_repo_ci(SourceRepoWebhookEvent {
            project_id: project_id.clone(),
            commit: "c9".to_string(),
            message: "platform-sync: bootstrap".to_string(),
        })
        .await
        .unwrap();
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, REASON_PLATFORM_SYNC);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let err = ctx
        .platform
        .trigger_source_repo_ci(push("ghost", "c1"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::ProjectNotFound(_)));
}

#[tokio::test]
async fn trigger_during_running_op_conflicts_and_rolls_back() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = ready_project(&ctx).await;

    let _held = ctx.platform.try_lock_project(&project_id).unwrap();
    let err = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Conflict(_)));
    drop(_held);

    // The reservation was rolled back, so the commit can trigger later
    let retry = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .unwrap();
    assert!(retry.accepted);
}

#[tokio::test]
async fn successful_ci_promotes_commit_in_ledger() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = ready_project(&ctx).await;

    let outcome = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .unwrap();
    wait_done(&ctx, outcome.op_id.as_deref().unwrap()).await;

    // Ledger settlement happens in the finalizer; allow it a beat
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let state = ctx.platform.ledger.load(&project_id).unwrap();
        if state.last_successful_commit == "c1" && state.pending_by_op_id.is_empty() {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("ledger never promoted c1: {:?}", state);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

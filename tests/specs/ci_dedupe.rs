// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CI dedupe under webhook + watcher races.

use crate::prelude::*;
use berth_core::{OpKind, OpStatus};
use berth_engine::test_helpers::TestContext;
use berth_engine::{SourceRepoWebhookEvent, SourceWatcher, REASON_COMMIT_SEEN};
use std::time::Duration;

fn push(project_id: &str, commit: &str) -> SourceRepoWebhookEvent {
    SourceRepoWebhookEvent {
        project_id: project_id.to_string(),
        commit: commit.to_string(),
        message: format!("feat: {}", commit),
    }
}

#[tokio::test]
async fn webhook_and_watcher_race_creates_one_ci_op() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let (project, _) = ctx.platform.create_project(svc_spec()).await.unwrap();
    let project_id = project.id.as_str().to_string();

    // The watcher sees the same commit the webhook reports
    let repo = ctx
        .artifacts
        .path(&project_id, berth_adapters::artifacts::REPO_SOURCE_DIR);
    ctx.git.set_head(&repo, "c1", "feat: c1");

    let watcher = SourceWatcher::new(ctx.platform.clone(), Duration::from_millis(20));
    let webhook = ctx.platform.trigger_source_repo_ci(push(&project_id, "c1"));
    let (webhook_outcome, ()) = tokio::join!(webhook, watcher.tick());
    let webhook_outcome = webhook_outcome.unwrap();

    // Exactly one path created the op; the other saw the commit as
    // already processed
    if let Some(op_id) = &webhook_outcome.op_id {
        assert!(webhook_outcome.accepted);
        let op = wait_terminal(&ctx, op_id).await;
        assert_eq!(op.kind, OpKind::Ci);
        assert_eq!(op.status, OpStatus::Done);
    } else {
        assert!(!webhook_outcome.accepted);
        assert_eq!(webhook_outcome.reason, REASON_COMMIT_SEEN);
    }

    // Ledger converges on the single successful build
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let state = ctx.platform.ci_state(&project_id).unwrap();
        if state.last_successful_commit == "c1" && state.pending_by_op_id.is_empty() {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("dedupe state never converged: {:?}", state);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn second_webhook_for_same_commit_is_ignored() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let (project, _) = ctx.platform.create_project(svc_spec()).await.unwrap();
    let project_id = project.id.as_str().to_string();

    let first = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .unwrap();
    assert!(first.accepted);
    wait_terminal(&ctx, first.op_id.as_deref().unwrap()).await;

    let second = ctx
        .platform
        .trigger_source_repo_ci(push(&project_id, "c1"))
        .await
        .unwrap();
    assert!(!second.accepted);
    assert_eq!(second.reason, REASON_COMMIT_SEEN);

    // A new commit still goes through. The finished CI op releases its
    // project slot a moment after turning terminal, so tolerate a
    // transient conflict.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let third = loop {
        match ctx
            .platform
            .trigger_source_repo_ci(push(&project_id, "c2"))
            .await
        {
            Ok(outcome) => break outcome,
            Err(e) if e.status_code() == 409 && tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(e) => panic!("unexpected trigger failure: {}", e),
        }
    };
    assert!(third.accepted);
    wait_terminal(&ctx, third.op_id.as_deref().unwrap()).await;
}

#[tokio::test]
async fn ci_runs_build_and_render_only() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let (project, _) = ctx.platform.create_project(svc_spec()).await.unwrap();

    let outcome = ctx
        .platform
        .trigger_source_repo_ci(push(project.id.as_str(), "c1"))
        .await
        .unwrap();
    let op = wait_terminal(&ctx, outcome.op_id.as_deref().unwrap()).await;

    let workers: Vec<&str> = op.steps.iter().map(|s| s.worker.as_str()).collect();
    assert_eq!(workers, vec!["image-builder", "manifest-renderer"]);
    assert_eq!(op.status, OpStatus::Done);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deploy, promote, and release ordering.

use crate::prelude::*;
use berth_core::{OpKind, OpStatus};
use berth_engine::test_helpers::TestContext;
use berth_engine::RunOptions;

async fn delivery_project(ctx: &TestContext) -> String {
    let (project, _) = ctx
        .platform
        .create_project(svc_spec_with_envs(&["staging", "prod"]))
        .await
        .unwrap();
    project.id.as_str().to_string()
}

#[tokio::test]
async fn promote_writes_promotion_paths_only() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = delivery_project(&ctx).await;

    let outcome = ctx
        .platform
        .trigger_delivery(
            &project_id,
            OpKind::Promote,
            RunOptions {
                from_env: Some("dev".to_string()),
                to_env: Some("staging".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.op.kind, OpKind::Promote);
    assert_eq!(outcome.op.status, OpStatus::Done);

    let artifacts = outcome.op.artifacts();
    assert!(artifacts.contains(&"deploy/staging/rendered.yaml".to_string()));
    assert!(artifacts.contains(&"promotions/dev-to-staging/rendered.yaml".to_string()));
    assert!(!artifacts.iter().any(|a| a.starts_with("releases/")));

    assert!(ctx
        .artifacts
        .exists(&project_id, "promotions/dev-to-staging/rendered.yaml"));
    assert!(!ctx.artifacts.exists(&project_id, "releases/dev-to-staging/rendered.yaml"));
}

#[tokio::test]
async fn release_after_promote_writes_releases_path() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = delivery_project(&ctx).await;

    ctx.platform
        .trigger_delivery(
            &project_id,
            OpKind::Promote,
            RunOptions {
                from_env: Some("dev".to_string()),
                to_env: Some("staging".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let release = ctx
        .platform
        .trigger_delivery(
            &project_id,
            OpKind::Release,
            RunOptions {
                from_env: Some("dev".to_string()),
                to_env: Some("prod".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(release.op.kind, OpKind::Release);
    let artifacts = release.op.artifacts();
    assert!(artifacts.contains(&"releases/dev-to-prod/rendered.yaml".to_string()));
    assert!(!artifacts.iter().any(|a| a.starts_with("promotions/dev-to-prod")));
    assert!(ctx
        .artifacts
        .exists(&project_id, "releases/dev-to-prod/rendered.yaml"));
}

#[tokio::test]
async fn deploy_runs_renderer_then_deployer() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = delivery_project(&ctx).await;

    let outcome = ctx
        .platform
        .trigger_delivery(
            &project_id,
            OpKind::Deploy,
            RunOptions {
                deploy_env: Some("staging".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.op.status, OpStatus::Done);
    let workers: Vec<&str> = outcome.op.steps.iter().map(|s| s.worker.as_str()).collect();
    assert_eq!(workers, vec!["manifest-renderer", "deployer"]);
    assert!(ctx
        .artifacts
        .exists(&project_id, "deploy/staging/deployed.txt"));
}

#[tokio::test]
async fn promoted_manifest_carries_source_image() {
    let ctx = TestContext::new();
    ctx.platform.start();
    let project_id = delivery_project(&ctx).await;

    let image = ctx
        .artifacts
        .read(&project_id, "build/image.txt")
        .unwrap()
        .unwrap();

    ctx.platform
        .trigger_delivery(
            &project_id,
            OpKind::Promote,
            RunOptions {
                from_env: Some("dev".to_string()),
                to_env: Some("staging".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let promoted = ctx
        .artifacts
        .read(&project_id, "promotions/dev-to-staging/rendered.yaml")
        .unwrap()
        .unwrap();
    assert!(promoted.contains(image.trim()));
    assert!(promoted.contains("environment: staging"));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Create happy path: full chain from declarative spec to rendered
//! manifests.

use crate::prelude::*;
use berth_core::{OpEventName, OpStatus, ProjectPhase};
use berth_engine::test_helpers::TestContext;

#[tokio::test]
async fn create_reaches_ready_with_ordered_steps() {
    let ctx = TestContext::new();
    ctx.platform.start();

    let (project, outcome) = ctx.platform.create_project(svc_spec()).await.unwrap();

    assert_eq!(outcome.op.status, OpStatus::Done);
    let workers: Vec<&str> = outcome.op.steps.iter().map(|s| s.worker.as_str()).collect();
    assert_eq!(
        workers,
        vec!["registrar", "repo-bootstrap", "image-builder", "manifest-renderer"]
    );

    let project = ctx.platform.get_project(project.id.as_str()).await.unwrap();
    assert_eq!(project.status.phase, ProjectPhase::Ready);
    assert_eq!(project.spec.name, "svc");
}

#[tokio::test]
async fn create_emits_exactly_one_completed_event() {
    let ctx = TestContext::new();
    ctx.platform.start();

    let (_, outcome) = ctx.platform.create_project(svc_spec()).await.unwrap();

    let stream = ctx
        .platform
        .subscribe_op_events(outcome.op.id.as_str(), None)
        .await
        .unwrap();
    let terminal: Vec<_> = stream
        .replay
        .iter()
        .filter(|e| e.name.is_terminal())
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].name, OpEventName::Completed);
}

#[tokio::test]
async fn create_writes_nonempty_image_artifact() {
    let ctx = TestContext::new();
    ctx.platform.start();

    let (project, outcome) = ctx.platform.create_project(svc_spec()).await.unwrap();
    assert!(outcome
        .op
        .artifacts()
        .contains(&"build/image.txt".to_string()));

    let image = ctx
        .artifacts
        .read(project.id.as_str(), "build/image.txt")
        .unwrap()
        .unwrap();
    assert!(!image.trim().is_empty());
    assert!(image.trim().starts_with("sha256:"));
}

#[tokio::test]
async fn create_renders_manifest_for_each_environment() {
    let ctx = TestContext::new();
    ctx.platform.start();

    let (project, _) = ctx.platform.create_project(svc_spec()).await.unwrap();
    let rendered = ctx
        .artifacts
        .read(project.id.as_str(), "deploy/dev/rendered.yaml")
        .unwrap()
        .unwrap();
    assert!(rendered.contains("name: svc"));
    assert!(rendered.contains("runtime: go_1.26"));
    assert!(rendered.contains("LOG_LEVEL"));
}

#[tokio::test]
async fn projects_list_sorted_by_creation() {
    let ctx = TestContext::new();
    ctx.platform.start();

    let mut first = svc_spec();
    first.name = "alpha".to_string();
    ctx.platform.create_project(first).await.unwrap();
    ctx.clock.advance_ms(1_000);
    let mut second = svc_spec();
    second.name = "beta".to_string();
    ctx.platform.create_project(second).await.unwrap();

    let names: Vec<String> = ctx
        .platform
        .list_projects()
        .await
        .unwrap()
        .iter()
        .map(|p| p.spec.name.clone())
        .collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::worker_runtime::{WorkerAction, WorkerContext};
use berth_adapters::{ArtifactStore, EmbeddedKv, FakeGitClient};
use berth_core::test_support::{sample_spec, sample_spec_with_envs};
use berth_core::{Delivery, DeliveryStage, FakeClock, OpKind, Project, ProjectId};
use berth_storage::Store;
use std::sync::Arc;

struct Fixture {
    ctx: WorkerContext<FakeClock>,
    _dir: tempfile::TempDir,
}

async fn fixture(spec: berth_core::ProjectSpec) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = Store::new(
        Arc::new(EmbeddedKv::new("projects", 25)),
        Arc::new(EmbeddedKv::new("ops", 50)),
        clock.clone(),
    );
    let ctx = WorkerContext {
        store: store.clone(),
        artifacts: ArtifactStore::new(dir.path()),
        git: Arc::new(FakeGitClient::new()),
        clock,
    };
    let project = Project::new(ProjectId::new("p1"), spec, 1_000);
    store.put_project(project).await.unwrap();
    Fixture { ctx, _dir: dir }
}

fn msg(kind: OpKind, delivery: Option<Delivery>) -> berth_core::ProjectOpMsg {
    berth_core::ProjectOpMsg {
        op_id: "op-1".to_string(),
        kind,
        project_id: "p1".to_string(),
        spec: None,
        deploy_env: None,
        from_env: None,
        to_env: None,
        delivery,
        err: String::new(),
        at: 1_000,
    }
}

fn seed_image(fx: &Fixture) {
    fx.ctx
        .artifacts
        .write("p1", super::super::build::IMAGE_FILE, "sha256:abc\n")
        .unwrap();
}

// ── Manifest body ────────────────────────────────────────────────────────────

#[test]
fn manifest_contains_spec_fields() {
    let spec = sample_spec("svc");
    let env = spec.environments.get("dev").unwrap();
    let yaml = render_manifest(&spec, "dev", env, "sha256:abc");
    assert!(yaml.contains("name: svc"));
    assert!(yaml.contains("environment: dev"));
    assert!(yaml.contains("runtime: go_1.26"));
    assert!(yaml.contains("image: sha256:abc"));
    assert!(yaml.contains("LOG_LEVEL: \"info\""));
    assert!(yaml.contains("ingress: internal"));
}

#[test]
fn manifest_image_round_trips() {
    let spec = sample_spec("svc");
    let env = spec.environments.get("dev").unwrap();
    let yaml = render_manifest(&spec, "dev", env, "sha256:abc");
    assert_eq!(manifest_image(&yaml).as_deref(), Some("sha256:abc"));
    assert_eq!(manifest_image("no image here"), None);
}

// ── Full chain ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn renders_every_declared_environment() {
    let fx = fixture(sample_spec_with_envs("svc", &["dev", "staging"])).await;
    seed_image(&fx);

    let outcome = RenderManifests
        .run(&fx.ctx, &msg(OpKind::Create, None))
        .await
        .unwrap();
    assert_eq!(
        outcome.artifacts,
        vec!["deploy/dev/rendered.yaml", "deploy/staging/rendered.yaml"]
    );
    assert!(fx.ctx.artifacts.exists("p1", "deploy/dev/rendered.yaml"));
    assert!(fx.ctx.artifacts.exists("p1", "deploy/staging/rendered.yaml"));
}

#[tokio::test]
async fn render_without_image_fails() {
    let fx = fixture(sample_spec("svc")).await;
    let err = RenderManifests
        .run(&fx.ctx, &msg(OpKind::Create, None))
        .await
        .err()
        .unwrap();
    assert!(err.contains("no built image"));
}

// ── Delete teardown ──────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_record_and_tree() {
    let fx = fixture(sample_spec("svc")).await;
    seed_image(&fx);

    let outcome = RenderManifests
        .run(&fx.ctx, &msg(OpKind::Delete, None))
        .await
        .unwrap();
    assert_eq!(outcome.message, "project deleted");
    assert!(fx.ctx.store.get_project("p1").await.is_err());
    assert!(!fx.ctx.artifacts.exists("p1", super::super::build::IMAGE_FILE));
}

// ── Transitions ──────────────────────────────────────────────────────────────

fn promote_delivery(from: &str, to: &str, stage: DeliveryStage) -> Option<Delivery> {
    Some(Delivery {
        stage,
        environment: None,
        from_env: Some(from.to_string()),
        to_env: Some(to.to_string()),
    })
}

#[tokio::test]
async fn promote_carries_image_from_source_env() {
    let fx = fixture(sample_spec_with_envs("svc", &["dev", "staging"])).await;
    seed_image(&fx);
    RenderManifests
        .run(&fx.ctx, &msg(OpKind::Create, None))
        .await
        .unwrap();

    let outcome = RenderManifests
        .run(
            &fx.ctx,
            &msg(
                OpKind::Promote,
                promote_delivery("dev", "staging", DeliveryStage::Promote),
            ),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.artifacts,
        vec![
            "deploy/staging/rendered.yaml",
            "promotions/dev-to-staging/rendered.yaml"
        ]
    );
    let promoted = fx
        .ctx
        .artifacts
        .read("p1", "promotions/dev-to-staging/rendered.yaml")
        .unwrap()
        .unwrap();
    assert_eq!(manifest_image(&promoted).as_deref(), Some("sha256:abc"));
    assert!(promoted.contains("environment: staging"));
}

#[tokio::test]
async fn release_writes_releases_path() {
    let fx = fixture(sample_spec_with_envs("svc", &["dev", "prod"])).await;
    seed_image(&fx);
    RenderManifests
        .run(&fx.ctx, &msg(OpKind::Create, None))
        .await
        .unwrap();

    let outcome = RenderManifests
        .run(
            &fx.ctx,
            &msg(
                OpKind::Release,
                promote_delivery("dev", "prod", DeliveryStage::Release),
            ),
        )
        .await
        .unwrap();
    assert!(outcome
        .artifacts
        .contains(&"releases/dev-to-prod/rendered.yaml".to_string()));
    assert!(!outcome.artifacts.iter().any(|a| a.starts_with("promotions/")));
}

#[tokio::test]
async fn promote_from_unrendered_env_fails() {
    let fx = fixture(sample_spec_with_envs("svc", &["dev", "staging"])).await;
    seed_image(&fx);

    let err = RenderManifests
        .run(
            &fx.ctx,
            &msg(
                OpKind::Promote,
                promote_delivery("dev", "staging", DeliveryStage::Promote),
            ),
        )
        .await
        .err()
        .unwrap();
    assert!(err.contains("has no rendered manifests"));
}

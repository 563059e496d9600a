// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers for behavioral specifications.

#![allow(dead_code)]

use berth_core::project::Environment;
use berth_core::{NetworkPolicies, Operation, ProjectSpec};
use berth_engine::test_helpers::TestContext;
use indexmap::IndexMap;
use std::time::Duration;

pub const SPEC_POLL_INTERVAL_MS: u64 = 10;
pub const SPEC_WAIT_MAX_MS: u64 = 5_000;

/// The project spec from the create happy-path scenario.
pub fn svc_spec() -> ProjectSpec {
    let mut vars = IndexMap::new();
    vars.insert("LOG_LEVEL".to_string(), "info".to_string());
    let mut environments = IndexMap::new();
    environments.insert("dev".to_string(), Environment { vars });
    ProjectSpec {
        api_version: "berth.dev/v1".to_string(),
        kind: "Project".to_string(),
        name: "svc".to_string(),
        runtime: "go_1.26".to_string(),
        capabilities: Vec::new(),
        environments,
        network_policies: NetworkPolicies::default(),
    }
}

/// Same spec with extra empty environments.
pub fn svc_spec_with_envs(envs: &[&str]) -> ProjectSpec {
    let mut spec = svc_spec();
    for env in envs {
        spec.environments
            .entry(env.to_string())
            .or_insert_with(Environment::default);
    }
    spec
}

/// Poll the stored op until `pred` holds or the spec wait budget runs out.
pub async fn wait_for_op<F>(ctx: &TestContext, op_id: &str, pred: F) -> Operation
where
    F: Fn(&Operation) -> bool,
{
    let deadline =
        tokio::time::Instant::now() + Duration::from_millis(SPEC_WAIT_MAX_MS);
    loop {
        if let Ok(op) = ctx.platform.get_op(op_id).await {
            if pred(&op) {
                return op;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("op {} never satisfied predicate within budget", op_id);
        }
        tokio::time::sleep(Duration::from_millis(SPEC_POLL_INTERVAL_MS)).await;
    }
}

/// Poll until the op is terminal.
pub async fn wait_terminal(ctx: &TestContext, op_id: &str) -> Operation {
    wait_for_op(ctx, op_id, |op| op.is_terminal()).await
}

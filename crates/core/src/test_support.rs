// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates (behind the `test-support` feature).

use indexmap::IndexMap;

use crate::project::{Environment, NetworkPolicies, ProjectSpec, API_VERSION, PROJECT_KIND};

/// A minimal valid spec with one `dev` environment.
pub fn sample_spec(name: &str) -> ProjectSpec {
    let mut vars = IndexMap::new();
    vars.insert("LOG_LEVEL".to_string(), "info".to_string());
    let mut environments = IndexMap::new();
    environments.insert("dev".to_string(), Environment { vars });
    ProjectSpec {
        api_version: API_VERSION.to_string(),
        kind: PROJECT_KIND.to_string(),
        name: name.to_string(),
        runtime: "go_1.26".to_string(),
        capabilities: Vec::new(),
        environments,
        network_policies: NetworkPolicies::default(),
    }
}

/// A spec with the given environments (no vars).
pub fn sample_spec_with_envs(name: &str, envs: &[&str]) -> ProjectSpec {
    let mut spec = sample_spec(name);
    spec.environments = envs
        .iter()
        .map(|e| (e.to_string(), Environment::default()))
        .collect();
    spec
}

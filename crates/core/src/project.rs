// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project record, declarative spec, and spec validation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::op::OpKind;

crate::define_id! {
    /// Unique identifier for a project.
    ///
    /// Opaque 128-bit value rendered as 32 lowercase hex characters.
    #[derive(Default)]
    pub struct ProjectId;
}

/// Maximum length of a project name (DNS label).
pub const MAX_NAME_LEN: usize = 63;

/// Maximum length of an environment name.
pub const MAX_ENV_NAME_LEN: usize = 32;

/// Maximum byte length of an environment variable value.
pub const MAX_ENV_VAR_LEN: usize = 4096;

/// Spec validation failures.
///
/// Surfaced synchronously at the API boundary; a spec that fails
/// validation is never enqueued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("project name {0:?} is not a valid dns label (lowercase alphanumeric and '-', max {MAX_NAME_LEN} chars)")]
    InvalidName(String),
    #[error("runtime {0:?} is not of the form token_version (e.g. go_1.26)")]
    InvalidRuntime(String),
    #[error("environment name {0:?} is not a valid dns label (max {MAX_ENV_NAME_LEN} chars)")]
    InvalidEnvName(String),
    #[error("environment variable name {0:?} is not upper snake case")]
    InvalidEnvVarName(String),
    #[error("environment variable {name} exceeds {MAX_ENV_VAR_LEN} bytes")]
    EnvVarTooLong { name: String },
    #[error("at least one environment is required")]
    NoEnvironments,
    #[error("network policy {0:?} must be one of: internal, none")]
    InvalidNetworkPolicy(String),
    #[error("unknown environment {0:?}")]
    UnknownEnvironment(String),
    #[error("delivery op is missing its target environment(s)")]
    MissingDeliveryTarget,
    #[error("unsupported apiVersion {0:?}")]
    UnsupportedApiVersion(String),
    #[error("unsupported kind {0:?}")]
    UnsupportedKind(String),
}

/// Traffic policy for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPolicy {
    /// Reachable from other workloads on the local platform
    #[default]
    Internal,
    /// No traffic allowed
    None,
}

impl fmt::Display for NetworkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkPolicy::Internal => write!(f, "internal"),
            NetworkPolicy::None => write!(f, "none"),
        }
    }
}

/// Ingress/egress pair for a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicies {
    #[serde(default)]
    pub ingress: NetworkPolicy,
    #[serde(default)]
    pub egress: NetworkPolicy,
}

/// Per-environment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment variables, upper-snake names to values (≤4096 bytes each)
    #[serde(default)]
    pub vars: IndexMap<String, String>,
}

/// The user-declared application record.
///
/// Mapping fields preserve declaration order; `capabilities` is a
/// deduplicated ordered set after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub name: String,
    /// Runtime token and version joined by `_`, e.g. `go_1.26`
    pub runtime: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub environments: IndexMap<String, Environment>,
    #[serde(rename = "networkPolicies", default)]
    pub network_policies: NetworkPolicies,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    PROJECT_KIND.to_string()
}

/// The only apiVersion this platform understands.
pub const API_VERSION: &str = "berth.dev/v1";

/// The only declarative kind this platform understands.
pub const PROJECT_KIND: &str = "Project";

impl ProjectSpec {
    /// Normalize a spec in place: trim and lowercase name/runtime, dedup
    /// capabilities preserving first occurrence, default empty
    /// apiVersion/kind.
    ///
    /// Idempotent: `normalize(normalize(x)) == normalize(x)`.
    pub fn normalize(mut self) -> Self {
        self.name = self.name.trim().to_ascii_lowercase();
        self.runtime = self.runtime.trim().to_ascii_lowercase();
        if self.api_version.trim().is_empty() {
            self.api_version = API_VERSION.to_string();
        } else {
            self.api_version = self.api_version.trim().to_string();
        }
        if self.kind.trim().is_empty() {
            self.kind = PROJECT_KIND.to_string();
        } else {
            self.kind = self.kind.trim().to_string();
        }

        let mut seen = Vec::with_capacity(self.capabilities.len());
        for cap in self.capabilities.drain(..) {
            let cap = cap.trim().to_ascii_lowercase();
            if !cap.is_empty() && !seen.contains(&cap) {
                seen.push(cap);
            }
        }
        self.capabilities = seen;
        self
    }

    /// Validate a normalized spec.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_version != API_VERSION {
            return Err(ValidationError::UnsupportedApiVersion(
                self.api_version.clone(),
            ));
        }
        if self.kind != PROJECT_KIND {
            return Err(ValidationError::UnsupportedKind(self.kind.clone()));
        }
        if !is_dns_label(&self.name, MAX_NAME_LEN) {
            return Err(ValidationError::InvalidName(self.name.clone()));
        }
        if !is_runtime(&self.runtime) {
            return Err(ValidationError::InvalidRuntime(self.runtime.clone()));
        }
        if self.environments.is_empty() {
            return Err(ValidationError::NoEnvironments);
        }
        for (env_name, env) in &self.environments {
            if !is_dns_label(env_name, MAX_ENV_NAME_LEN) {
                return Err(ValidationError::InvalidEnvName(env_name.clone()));
            }
            for (var_name, value) in &env.vars {
                if !is_env_var_name(var_name) {
                    return Err(ValidationError::InvalidEnvVarName(var_name.clone()));
                }
                if value.len() > MAX_ENV_VAR_LEN {
                    return Err(ValidationError::EnvVarTooLong {
                        name: var_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// DNS label: lowercase alphanumeric and `-`, no leading/trailing `-`.
fn is_dns_label(s: &str, max: usize) -> bool {
    if s.is_empty() || s.len() > max {
        return false;
    }
    if s.starts_with('-') || s.ends_with('-') {
        return false;
    }
    s.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Runtime: `token_version` where token is `[a-z][a-z0-9_]*` and version
/// starts with a digit (e.g. `go_1.26`, `node_22`, `python_3.13`).
fn is_runtime(s: &str) -> bool {
    let Some((token, version)) = s.split_once('_') else {
        return false;
    };
    let token_ok = token
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_lowercase())
        && token.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    let version_ok = version.bytes().next().is_some_and(|b| b.is_ascii_digit())
        && version
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'));
    token_ok && version_ok
}

/// Env var name: `[A-Z][A-Z0-9_]*`.
fn is_env_var_name(s: &str) -> bool {
    s.bytes().next().is_some_and(|b| b.is_ascii_uppercase())
        && s.bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Lifecycle phase of a project.
///
/// Transitions: `Reconciling → Ready` on non-delete done, `* → Error` on
/// error, `* → Deleting` when a delete op starts running, record removed
/// on successful delete. Any new op returns the phase to `Reconciling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectPhase {
    Reconciling,
    Ready,
    Deleting,
    Error,
}

impl fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectPhase::Reconciling => write!(f, "Reconciling"),
            ProjectPhase::Ready => write!(f, "Ready"),
            ProjectPhase::Deleting => write!(f, "Deleting"),
            ProjectPhase::Error => write!(f, "Error"),
        }
    }
}

/// Observed status mirrored onto the project by op bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub phase: ProjectPhase,
    pub updated_at_ms: u64,
    #[serde(default)]
    pub last_op_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_op_kind: Option<OpKind>,
    #[serde(default)]
    pub message: String,
}

impl ProjectStatus {
    pub fn new(phase: ProjectPhase, at_ms: u64) -> Self {
        Self {
            phase,
            updated_at_ms: at_ms,
            last_op_id: String::new(),
            last_op_kind: None,
            message: String::new(),
        }
    }
}

/// A stored project record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub spec: ProjectSpec,
    pub status: ProjectStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Project {
    /// Create a new project record in the `Reconciling` phase.
    pub fn new(id: ProjectId, spec: ProjectSpec, at_ms: u64) -> Self {
        Self {
            id,
            spec,
            status: ProjectStatus::new(ProjectPhase::Reconciling, at_ms),
            created_at_ms: at_ms,
            updated_at_ms: at_ms,
        }
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire messages carried on pipeline subjects.

use serde::{Deserialize, Serialize};

use crate::op::{Delivery, OpKind};
use crate::project::ProjectSpec;

/// Start/stage message published on every pipeline subject.
///
/// A non-empty `err` marks the op as failed upstream: downstream workers
/// skip their action and forward the message so the chain still drains to
/// the finalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectOpMsg {
    pub op_id: String,
    pub kind: OpKind,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ProjectSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,
    /// Epoch milliseconds when the message was published
    pub at: u64,
}

impl ProjectOpMsg {
    pub fn failed_upstream(&self) -> bool {
        !self.err.is_empty()
    }
}

/// Result message: the start payload plus the producing worker's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResultMsg {
    #[serde(flatten)]
    pub op: ProjectOpMsg,
    pub worker: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

#[cfg(test)]
#[path = "msg_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation record and step state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an operation.
    ///
    /// Each unit of pipeline work gets a unique ID that can be used to
    /// track its steps, query its status, and subscribe to its events.
    #[derive(Default)]
    pub struct OpId;
}

/// The kind of work an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Update,
    Delete,
    Ci,
    Deploy,
    Promote,
    Release,
}

impl OpKind {
    /// True for deploy/promote/release ops, which carry a [`Delivery`]
    /// block and run the delivery chain instead of the full pipeline.
    pub fn is_delivery(&self) -> bool {
        matches!(self, OpKind::Deploy | OpKind::Promote | OpKind::Release)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Create => write!(f, "create"),
            OpKind::Update => write!(f, "update"),
            OpKind::Delete => write!(f, "delete"),
            OpKind::Ci => write!(f, "ci"),
            OpKind::Deploy => write!(f, "deploy"),
            OpKind::Promote => write!(f, "promote"),
            OpKind::Release => write!(f, "release"),
        }
    }
}

/// Stage of a delivery operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStage {
    Deploy,
    Promote,
    Release,
}

impl fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStage::Deploy => write!(f, "deploy"),
            DeliveryStage::Promote => write!(f, "promote"),
            DeliveryStage::Release => write!(f, "release"),
        }
    }
}

/// Delivery lifecycle block on deploy/promote/release ops.
///
/// Deploys target a single `environment`; promotes and releases move
/// between `from_env` and `to_env`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub stage: DeliveryStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_env: Option<String>,
}

/// Operation status through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl OpStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OpStatus::Done | OpStatus::Error)
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpStatus::Queued => write!(f, "queued"),
            OpStatus::Running => write!(f, "running"),
            OpStatus::Done => write!(f, "done"),
            OpStatus::Error => write!(f, "error"),
        }
    }
}

/// One worker's contribution to an operation.
///
/// `ended_at_ms == 0` encodes an open (in-progress) step. There is at most
/// one open step per worker at any instant, even under redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpStep {
    pub worker: String,
    pub started_at_ms: u64,
    #[serde(default)]
    pub ended_at_ms: u64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl OpStep {
    pub fn is_open(&self) -> bool {
        self.ended_at_ms == 0
    }
}

/// One unit of work against a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OpId,
    pub project_id: String,
    pub kind: OpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    pub status: OpStatus,
    pub requested_at_ms: u64,
    /// Zero until the op reaches a terminal status
    #[serde(default)]
    pub finished_at_ms: u64,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub steps: Vec<OpStep>,
}

impl Operation {
    /// Create a freshly queued operation.
    pub fn new(id: OpId, project_id: impl Into<String>, kind: OpKind, at_ms: u64) -> Self {
        Self {
            id,
            project_id: project_id.into(),
            kind,
            delivery: None,
            status: OpStatus::Queued,
            requested_at_ms: at_ms,
            finished_at_ms: 0,
            error: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// The most recent open step for `worker`, if any.
    pub fn open_step_mut(&mut self, worker: &str) -> Option<&mut OpStep> {
        self.steps
            .iter_mut()
            .rev()
            .find(|s| s.worker == worker && s.is_open())
    }

    /// Begin a step for `worker`, reusing an existing slot.
    ///
    /// Within one op a worker passes at most once, so redelivery of the
    /// same message must not append a duplicate entry: an open slot is
    /// refreshed, a closed slot (the publish failed after the step ended)
    /// is left untouched. Returns false in the latter case.
    pub fn start_step(&mut self, worker: &str, at_ms: u64, message: &str) -> bool {
        if let Some(open) = self.open_step_mut(worker) {
            open.message = message.to_string();
            return true;
        }
        if self.steps.iter().any(|s| s.worker == worker) {
            return false;
        }
        self.steps.push(OpStep {
            worker: worker.to_string(),
            started_at_ms: at_ms,
            ended_at_ms: 0,
            message: message.to_string(),
            error: String::new(),
            artifacts: Vec::new(),
        });
        true
    }

    /// Close the open step for `worker`.
    ///
    /// Returns false when no open step exists (already closed by an
    /// earlier delivery).
    pub fn end_step(
        &mut self,
        worker: &str,
        at_ms: u64,
        message: &str,
        error: &str,
        artifacts: Vec<String>,
    ) -> bool {
        match self.open_step_mut(worker) {
            Some(step) => {
                step.ended_at_ms = at_ms;
                step.message = message.to_string();
                step.error = error.to_string();
                step.artifacts = artifacts;
                true
            }
            None => false,
        }
    }

    /// Number of closed steps.
    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_open()).count()
    }

    /// All artifacts recorded across steps, in step order.
    pub fn artifacts(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|s| s.artifacts.iter().cloned())
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "op_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-operation lifecycle events.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::op::{Delivery, OpKind, OpStatus};

/// Name of a lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpEventName {
    /// Op record created and queued
    Queued,
    /// Non-terminal status change
    Status,
    /// A worker opened its step
    StepStart,
    /// A worker closed its step
    StepEnd,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed,
    /// Keep-alive for long-lived subscriber connections
    Heartbeat,
    /// Synthetic snapshot for subscribers past the replay window
    Bootstrap,
}

impl OpEventName {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OpEventName::Completed | OpEventName::Failed)
    }
}

impl fmt::Display for OpEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpEventName::Queued => write!(f, "queued"),
            OpEventName::Status => write!(f, "status"),
            OpEventName::StepStart => write!(f, "step_start"),
            OpEventName::StepEnd => write!(f, "step_end"),
            OpEventName::Completed => write!(f, "completed"),
            OpEventName::Failed => write!(f, "failed"),
            OpEventName::Heartbeat => write!(f, "heartbeat"),
            OpEventName::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

/// Event payload shared by every lifecycle notification.
///
/// Most fields are situational; absent values serialize away so API
/// clients see a sparse body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpEventPayload {
    pub op_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OpKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OpStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub worker: String,
    /// 1-based position of the worker in the chain for this op kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    /// Human guidance for late subscribers (bootstrap events)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hint: String,
    /// Epoch milliseconds when the event was published
    pub at: u64,
}

/// One lifecycle notification, sequenced per op.
///
/// `id` is assigned at publish time and is strictly increasing within an
/// op's stream; it doubles as the Last-Event-ID value for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpEvent {
    pub id: u64,
    pub name: OpEventName,
    pub payload: OpEventPayload,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Op and project record bookkeeping, paired with event emission.
//!
//! All mutations of an op's steps and status flow through here so the
//! invariants hold: at most one open step per (op, worker), and exactly
//! one terminal event per op.

use crate::error::EngineError;
use crate::event_hub::EventHub;
use berth_core::chain;
use berth_core::{Clock, OpEvent, OpEventName, OpEventPayload, OpKind, OpStatus, Operation};
use berth_storage::Store;
use tracing::{debug, warn};

/// Step and status bookkeeping for ops; cheap to clone.
pub struct Bookkeeper<C: Clock> {
    store: Store<C>,
    hub: EventHub<C>,
    clock: C,
}

impl<C: Clock> Clone for Bookkeeper<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            hub: self.hub.clone(),
            clock: self.clock.clone(),
        }
    }
}

fn progress_percent(op: &Operation) -> u8 {
    let total = chain::total_steps(op.kind).max(1);
    let completed = op.completed_steps().min(total);
    ((100 * completed) / total) as u8
}

fn base_payload(op: &Operation) -> OpEventPayload {
    OpEventPayload {
        op_id: op.id.as_str().to_string(),
        project_id: op.project_id.clone(),
        kind: Some(op.kind),
        status: Some(op.status),
        ..Default::default()
    }
}

impl<C: Clock> Bookkeeper<C> {
    pub fn new(store: Store<C>, hub: EventHub<C>, clock: C) -> Self {
        Self { store, hub, clock }
    }

    pub fn hub(&self) -> &EventHub<C> {
        &self.hub
    }

    pub fn store(&self) -> &Store<C> {
        &self.store
    }

    /// Open a step for `(op, worker)` and emit `step_start`.
    ///
    /// Idempotent under redelivery: an already-open step for the worker
    /// is reused rather than duplicated.
    pub async fn mark_op_step_start(
        &self,
        op_id: &str,
        worker: &str,
        message: &str,
    ) -> Result<(), EngineError> {
        let mut op = self.store.get_op(op_id).await?;
        if op.status == OpStatus::Done {
            debug!(op_id, worker, "ignoring step start for completed op");
            return Ok(());
        }
        if op.status == OpStatus::Queued {
            op.status = OpStatus::Running;
        }
        if !op.start_step(worker, self.clock.epoch_ms(), message) {
            debug!(op_id, worker, "step already recorded; redelivery after close");
            return Ok(());
        }
        self.store.put_op(&op).await?;

        let mut payload = base_payload(&op);
        payload.worker = worker.to_string();
        payload.step_index = chain::step_index(op.kind, worker);
        payload.total_steps = Some(chain::total_steps(op.kind));
        payload.progress_percent = Some(progress_percent(&op));
        payload.message = message.to_string();
        self.hub.publish(OpEventName::StepStart, payload);
        Ok(())
    }

    /// Close the open step for `(op, worker)` and emit `step_end`.
    ///
    /// A non-empty `err` flips the op to its terminal error state and
    /// emits the one `failed` event.
    pub async fn mark_op_step_end(
        &self,
        op_id: &str,
        worker: &str,
        message: &str,
        err: &str,
        artifacts: Vec<String>,
    ) -> Result<(), EngineError> {
        let mut op = self.store.get_op(op_id).await?;
        let now = self.clock.epoch_ms();
        let started_at = op
            .steps
            .iter()
            .rev()
            .find(|s| s.worker == worker && s.is_open())
            .map(|s| s.started_at_ms);
        if !op.end_step(worker, now, message, err, artifacts.clone()) {
            debug!(op_id, worker, "no open step to close; stale redelivery");
            return Ok(());
        }

        let was_terminal = op.is_terminal();
        if !err.is_empty() && !was_terminal {
            op.status = OpStatus::Error;
            op.error = err.to_string();
            op.finished_at_ms = now;
        }
        self.store.put_op(&op).await?;

        let mut payload = base_payload(&op);
        payload.worker = worker.to_string();
        payload.step_index = chain::step_index(op.kind, worker);
        payload.total_steps = Some(chain::total_steps(op.kind));
        payload.progress_percent = Some(progress_percent(&op));
        payload.duration_ms = started_at.map(|s| now.saturating_sub(s));
        payload.message = message.to_string();
        payload.error = err.to_string();
        payload.artifacts = artifacts;
        self.hub.publish(OpEventName::StepEnd, payload);

        if op.is_terminal() && !was_terminal {
            let mut terminal = base_payload(&op);
            terminal.error = op.error.clone();
            terminal.message = "operation failed".to_string();
            self.hub.publish(OpEventName::Failed, terminal);
        }
        Ok(())
    }

    /// Move an op to `status` and mirror the outcome onto its project.
    ///
    /// Emits at most one of `completed`/`failed` over the op's lifetime;
    /// calls against an already-terminal op only log.
    pub async fn finalize_op(
        &self,
        op_id: &str,
        project_id: &str,
        kind: OpKind,
        status: OpStatus,
        err_msg: &str,
    ) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        let mut op = self.store.get_op(op_id).await?;
        let was_terminal = op.is_terminal();
        if was_terminal {
            debug!(op_id, ?status, "finalize on terminal op; keeping first outcome");
            return Ok(());
        }

        match status {
            OpStatus::Queued => {}
            OpStatus::Running => op.status = OpStatus::Running,
            OpStatus::Done => {
                op.status = OpStatus::Done;
                op.finished_at_ms = now;
            }
            OpStatus::Error => {
                op.status = OpStatus::Error;
                op.error = err_msg.to_string();
                op.finished_at_ms = now;
            }
        }
        self.store.put_op(&op).await?;

        if op.is_terminal() {
            let mut payload = base_payload(&op);
            match op.status {
                OpStatus::Done => {
                    payload.message = format!("{} complete", kind);
                    payload.artifacts = op.artifacts();
                    self.hub.publish(OpEventName::Completed, payload);
                }
                _ => {
                    payload.error = op.error.clone();
                    payload.message = "operation failed".to_string();
                    self.hub.publish(OpEventName::Failed, payload);
                }
            }
        }

        self.mirror_project(op_id, project_id, kind, status, err_msg)
            .await;
        Ok(())
    }

    /// Reflect an op outcome onto the project record.
    ///
    /// Best-effort: the project may legitimately be gone (successful
    /// delete), and a mirror failure must not fail the op path.
    async fn mirror_project(
        &self,
        op_id: &str,
        project_id: &str,
        kind: OpKind,
        status: OpStatus,
        err_msg: &str,
    ) {
        use berth_core::ProjectPhase;

        if status == OpStatus::Done && kind == OpKind::Delete {
            // Record was deleted by the final worker
            return;
        }
        let mut project = match self.store.get_project(project_id).await {
            Ok(p) => p,
            Err(e) => {
                debug!(project_id, op_id, error = %e, "project unavailable for mirror");
                return;
            }
        };
        match status {
            OpStatus::Running if kind == OpKind::Delete => {
                project.status.phase = ProjectPhase::Deleting;
                project.status.message = "deleting".to_string();
            }
            OpStatus::Done => {
                project.status.phase = ProjectPhase::Ready;
                project.status.message = format!("{} complete", kind);
            }
            OpStatus::Error => {
                project.status.phase = ProjectPhase::Error;
                project.status.message = err_msg.to_string();
            }
            _ => return,
        }
        project.status.last_op_id = op_id.to_string();
        project.status.last_op_kind = Some(kind);
        if let Err(e) = self.store.put_project(project).await {
            warn!(project_id, op_id, error = %e, "failed to mirror op outcome onto project");
        }
    }

    /// Synthesize a `bootstrap` event from a stored op for subscribers
    /// whose Last-Event-ID fell behind the retained window.
    pub fn new_op_bootstrap_snapshot(&self, op: &Operation) -> OpEvent {
        let running_step = op
            .steps
            .iter()
            .enumerate()
            .rev()
            .find(|(_, s)| s.is_open())
            .or_else(|| op.steps.iter().enumerate().next_back());
        let (step_index, worker, step_message) = match running_step {
            Some((i, step)) => (Some(i + 1), step.worker.clone(), step.message.clone()),
            None => (None, String::new(), String::new()),
        };

        let message = if op.status == OpStatus::Error {
            "operation failed".to_string()
        } else {
            step_message
        };
        let hint = match op.status {
            OpStatus::Queued => "operation queued; waiting for workers",
            OpStatus::Running => "operation in progress; live events follow",
            OpStatus::Done => "operation completed; see artifacts",
            OpStatus::Error => "operation failed; inspect step errors",
        };

        let mut payload = base_payload(op);
        payload.worker = worker;
        payload.step_index = step_index;
        payload.total_steps = Some(chain::total_steps(op.kind));
        payload.progress_percent = Some(progress_percent(op));
        payload.message = message;
        payload.error = op.error.clone();
        payload.artifacts = op.artifacts();
        payload.delivery = op.delivery.clone();
        payload.hint = hint.to_string();
        payload.at = self.clock.epoch_ms();

        OpEvent {
            id: 0,
            name: OpEventName::Bootstrap,
            payload,
        }
    }

    /// Emit the `queued` event for a freshly created op.
    pub fn emit_queued(&self, op: &Operation, message: &str) {
        let mut payload = base_payload(op);
        payload.message = message.to_string();
        payload.total_steps = Some(chain::total_steps(op.kind));
        payload.delivery = op.delivery.clone();
        self.hub.publish(OpEventName::Queued, payload);
    }
}

#[cfg(test)]
#[path = "bookkeeping_tests.rs"]
mod tests;

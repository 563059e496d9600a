// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline head: verifies the stored record and stamps registration.

use crate::worker_runtime::{WorkerAction, WorkerContext, WorkerOutcome};
use berth_core::{Clock, OpKind, ProjectOpMsg, WORKER_REGISTRAR};

/// Registration artifact, relative to the project dir.
pub const REGISTRATION_FILE: &str = "registration.json";

pub struct Register;

#[async_trait::async_trait]
impl<C: Clock> WorkerAction<C> for Register {
    fn name(&self) -> &'static str {
        WORKER_REGISTRAR
    }

    async fn run(
        &self,
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        let project = ctx
            .store
            .get_project(&msg.project_id)
            .await
            .map_err(|e| format!("project lookup failed: {}", e))?;

        if msg.kind == OpKind::Delete {
            return Ok(WorkerOutcome::new("delete acknowledged"));
        }

        let record = serde_json::json!({
            "id": project.id.as_str(),
            "name": project.spec.name,
            "runtime": project.spec.runtime,
            "registered_at_ms": ctx.clock.epoch_ms(),
        });
        let raw = serde_json::to_string_pretty(&record)
            .map_err(|e| format!("registration encode failed: {}", e))?;
        ctx.artifacts
            .write(&msg.project_id, REGISTRATION_FILE, &raw)
            .map_err(|e| format!("registration write failed: {}", e))?;

        Ok(WorkerOutcome::new("project registered")
            .with_artifacts(vec![REGISTRATION_FILE.to_string()]))
    }
}

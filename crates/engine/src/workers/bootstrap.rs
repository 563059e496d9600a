// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Creates the project's source and deploy repositories.

use crate::worker_runtime::{WorkerAction, WorkerContext, WorkerOutcome};
use berth_adapters::artifacts::{REPO_DEPLOY_DIR, REPO_SOURCE_DIR};
use berth_core::{Clock, OpKind, ProjectOpMsg, WORKER_REPO_BOOTSTRAP};

pub struct BootstrapRepos;

#[async_trait::async_trait]
impl<C: Clock> WorkerAction<C> for BootstrapRepos {
    fn name(&self) -> &'static str {
        WORKER_REPO_BOOTSTRAP
    }

    async fn run(
        &self,
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        if msg.kind == OpKind::Delete {
            return Ok(WorkerOutcome::new("skipped for delete"));
        }

        let source = ctx.artifacts.path(&msg.project_id, REPO_SOURCE_DIR);
        // Updates rerun the chain; an existing repo is kept as-is
        if !ctx.artifacts.exists(&msg.project_id, "repos/source/.git") {
            ctx.git
                .init_repo(&source)
                .await
                .map_err(|e| format!("source repo init failed: {}", e))?;
        }
        ctx.artifacts
            .ensure_dir(&msg.project_id, REPO_DEPLOY_DIR)
            .map_err(|e| format!("deploy repo create failed: {}", e))?;

        Ok(WorkerOutcome::new("repositories bootstrapped").with_artifacts(vec![
            REPO_SOURCE_DIR.to_string(),
            REPO_DEPLOY_DIR.to_string(),
        ]))
    }
}

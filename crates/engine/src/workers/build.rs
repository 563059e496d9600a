// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the project image.
//!
//! At the contract level a build is a deterministic digest over project
//! identity, runtime, and source commit, recorded to `build/image.txt`.

use super::resolve_spec;
use crate::worker_runtime::{WorkerAction, WorkerContext, WorkerOutcome};
use berth_adapters::artifacts::REPO_SOURCE_DIR;
use berth_core::{Clock, OpKind, ProjectOpMsg, WORKER_IMAGE_BUILDER};
use sha2::{Digest, Sha256};

/// Image digest artifact, relative to the project dir.
pub const IMAGE_FILE: &str = "build/image.txt";

pub struct BuildImage;

#[async_trait::async_trait]
impl<C: Clock> WorkerAction<C> for BuildImage {
    fn name(&self) -> &'static str {
        WORKER_IMAGE_BUILDER
    }

    async fn run(
        &self,
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        if msg.kind == OpKind::Delete {
            return Ok(WorkerOutcome::new("skipped for delete"));
        }

        let spec = resolve_spec(ctx, msg).await?;
        // Commit is best-effort: a project can build before its first
        // user commit lands
        let source = ctx.artifacts.path(&msg.project_id, REPO_SOURCE_DIR);
        let commit = ctx.git.head_commit(&source).await.unwrap_or_default();

        let digest = Sha256::digest(
            format!("{}\n{}\n{}", msg.project_id, spec.runtime, commit).as_bytes(),
        );
        let image = format!("sha256:{:x}", digest);
        ctx.artifacts
            .write(&msg.project_id, IMAGE_FILE, &format!("{}\n", image))
            .map_err(|e| format!("image write failed: {}", e))?;

        Ok(
            WorkerOutcome::new(format!("image built for {}", spec.runtime))
                .with_artifacts(vec![IMAGE_FILE.to_string()]),
        )
    }
}

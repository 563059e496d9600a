// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CI trigger funnel.
//!
//! Webhook deliveries and watcher ticks both land here, under one
//! process-wide lock, so a commit triggers at most one CI op no matter
//! how many paths observe it.

use crate::error::EngineError;
use crate::orchestrator::{Platform, RunOptions};
use berth_adapters::git::PLATFORM_SYNC_PREFIX;
use berth_core::{Clock, IdGen, OpKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Reason reported when a commit was already processed.
pub const REASON_COMMIT_SEEN: &str = "ignored: commit already processed";

/// Reason reported for commits the platform made itself.
pub const REASON_PLATFORM_SYNC: &str = "ignored: platform-sync commit";

/// A new-commit notification, from the webhook or the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepoWebhookEvent {
    pub project_id: String,
    pub commit: String,
    /// Subject line of the commit, when the sender knows it
    #[serde(default)]
    pub message: String,
}

/// Outcome of a CI trigger: accepted (op enqueued, 202 at the boundary)
/// or ignored with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiTriggerOutcome {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_id: Option<String>,
}

impl CiTriggerOutcome {
    fn ignored(reason: &str) -> Self {
        Self {
            accepted: false,
            reason: reason.to_string(),
            op_id: None,
        }
    }
}

impl<C: Clock, G: IdGen> Platform<C, G> {
    /// De-duplicate and enqueue a CI op for a source commit.
    ///
    /// Returns immediately after the op is published (async acceptance);
    /// a background task waits out the result while holding the
    /// per-project lock so later ops stay serialized behind the CI run.
    pub async fn trigger_source_repo_ci(
        &self,
        event: SourceRepoWebhookEvent,
    ) -> Result<CiTriggerOutcome, EngineError> {
        let _funnel = self.ci_mu.lock().await;

        if event.message.starts_with(PLATFORM_SYNC_PREFIX) {
            return Ok(CiTriggerOutcome::ignored(REASON_PLATFORM_SYNC));
        }
        self.store.get_project(&event.project_id).await?;

        if !self
            .ledger
            .mark_source_commit_seen(&event.project_id, &event.commit)?
        {
            debug!(
                project_id = %event.project_id,
                commit = %event.commit,
                "duplicate ci trigger ignored"
            );
            return Ok(CiTriggerOutcome::ignored(REASON_COMMIT_SEEN));
        }

        let lock = match self.try_lock_project(&event.project_id) {
            Ok(lock) => lock,
            Err(e) => {
                self.rollback_reservation(&event);
                return Err(e);
            }
        };
        let begun = match self
            .begin_op(
                lock,
                OpKind::Ci,
                &event.project_id,
                None,
                RunOptions::default(),
                "queued ci from source webhook",
            )
            .await
        {
            Ok(begun) => begun,
            Err(e) => {
                self.rollback_reservation(&event);
                return Err(e);
            }
        };

        // Best-effort: a confirm failure is logged and the op proceeds
        if let Err(e) = self.ledger.confirm_source_commit_pending_op(
            &event.project_id,
            &event.commit,
            &begun.op_id,
        ) {
            warn!(
                project_id = %event.project_id,
                commit = %event.commit,
                error = %e,
                "ci ledger confirm failed; proceeding"
            );
        }

        info!(
            project_id = %event.project_id,
            commit = %event.commit,
            op_id = %begun.op_id,
            "ci op queued for source commit"
        );

        let op_id = begun.op_id.clone();
        let platform = self.clone();
        tokio::spawn(async move {
            // Holds the per-project lock until the op settles; the
            // ledger is finalized by the terminal-subject consumer
            if let Err(e) = platform.await_result(begun).await {
                debug!(error = %e, "ci op ended with error");
            }
        });

        Ok(CiTriggerOutcome {
            accepted: true,
            reason: String::new(),
            op_id: Some(op_id),
        })
    }

    fn rollback_reservation(&self, event: &SourceRepoWebhookEvent) {
        if let Err(e) = self
            .ledger
            .rollback_source_commit_pending_enqueue(&event.project_id, &event.commit)
        {
            warn!(
                project_id = %event.project_id,
                commit = %event.commit,
                error = %e,
                "ci reservation rollback failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "ci_tests.rs"]
mod tests;

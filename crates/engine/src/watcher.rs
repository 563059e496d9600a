// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source commit watcher.
//!
//! Optional in-process poller that reads each project's source repo HEAD
//! and funnels fresh commits through the same CI trigger path as the
//! webhook, so hook-vs-watcher races resolve in the dedupe ledger.

use crate::ci::SourceRepoWebhookEvent;
use crate::error::EngineError;
use crate::orchestrator::Platform;
use berth_adapters::artifacts::REPO_SOURCE_DIR;
use berth_adapters::git::PLATFORM_SYNC_PREFIX;
use berth_core::{Clock, IdGen};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls source repos and triggers CI for new commits.
pub struct SourceWatcher<C: Clock, G: IdGen> {
    platform: Platform<C, G>,
    interval: Duration,
}

impl<C: Clock, G: IdGen> SourceWatcher<C, G> {
    pub fn new(platform: Platform<C, G>, interval: Duration) -> Self {
        Self { platform, interval }
    }

    /// Poll until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_ms = self.interval.as_millis() as u64, "source watcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        info!("source watcher stopped");
    }

    /// One pass over all known projects.
    pub async fn tick(&self) {
        let projects = match self.platform.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "watcher could not list projects");
                return;
            }
        };

        for project in projects {
            let project_id = project.id.as_str();
            let repo = self.platform.artifacts().path(project_id, REPO_SOURCE_DIR);
            // Projects without a bootstrapped repo simply have nothing
            // to watch yet
            let commit = match self.platform.git().head_commit(&repo).await {
                Ok(commit) => commit,
                Err(_) => continue,
            };
            let message = self
                .platform
                .git()
                .head_message(&repo)
                .await
                .unwrap_or_default();
            if message.starts_with(PLATFORM_SYNC_PREFIX) {
                continue;
            }

            let event = SourceRepoWebhookEvent {
                project_id: project_id.to_string(),
                commit: commit.clone(),
                message,
            };
            match self.platform.trigger_source_repo_ci(event).await {
                Ok(outcome) if outcome.accepted => {
                    info!(project_id, %commit, op_id = ?outcome.op_id, "watcher queued ci");
                }
                Ok(outcome) => {
                    debug!(project_id, %commit, reason = %outcome.reason, "watcher skipped commit");
                }
                Err(EngineError::Conflict(_)) => {
                    debug!(project_id, %commit, "watcher deferred; another op in progress");
                }
                Err(e) => {
                    warn!(project_id, %commit, error = %e, "watcher ci trigger failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;

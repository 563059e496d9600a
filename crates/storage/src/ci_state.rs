// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CI commit dedupe ledger.
//!
//! Per-project JSON state file at `repos/source/.berth/ci-commit-state.json`
//! tracking the last successfully built commit and in-flight CI ops. A
//! commit counts as seen when it equals `last_successful_commit`, equals
//! the reserved `pending_enqueue_commit`, or appears under an op with
//! status `enqueued` — regardless of which of hook, watcher, or replay
//! delivered it.
//!
//! Projects that predate the JSON file may carry a legacy single-line
//! `last-ci-commit.txt`; it is migrated in on first read and superseded by
//! the next persisted write.

use berth_adapters::artifacts::{ArtifactStore, CI_LEGACY_FILE, CI_STATE_FILE};
use berth_adapters::ArtifactError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum CiStateError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("decode ci state: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("encode ci state: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Status of an in-flight CI op for a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOpStatus {
    Enqueued,
    Failed,
}

/// One in-flight or failed CI op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOp {
    pub commit: String,
    pub status: PendingOpStatus,
}

/// Persisted dedupe state for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiCommitState {
    #[serde(default)]
    pub last_successful_commit: String,
    #[serde(default)]
    pub pending_enqueue_commit: String,
    #[serde(default)]
    pub pending_by_op_id: HashMap<String, PendingOp>,
}

impl CiCommitState {
    /// A commit is seen when any of the three tracking slots holds it.
    pub fn has_seen(&self, commit: &str) -> bool {
        if !commit.is_empty()
            && (self.last_successful_commit == commit || self.pending_enqueue_commit == commit)
        {
            return true;
        }
        self.pending_by_op_id
            .values()
            .any(|p| p.commit == commit && p.status == PendingOpStatus::Enqueued)
    }
}

/// Ledger over the per-project state files.
///
/// Every read-modify-write cycle runs under one process-wide mutex; the
/// legacy-file migration makes per-project locking unsafe for now.
#[derive(Clone)]
pub struct CiCommitLedger {
    artifacts: ArtifactStore,
    mu: Arc<Mutex<()>>,
}

impl CiCommitLedger {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            artifacts,
            mu: Arc::new(Mutex::new(())),
        }
    }

    /// Snapshot of the current state for a project.
    pub fn load(&self, project_id: &str) -> Result<CiCommitState, CiStateError> {
        let _guard = self.mu.lock();
        self.read(project_id)
    }

    /// Reserve `commit` for enqueueing.
    ///
    /// Returns `false` when the commit is already seen (duplicate; the
    /// caller must not enqueue).
    pub fn mark_source_commit_seen(
        &self,
        project_id: &str,
        commit: &str,
    ) -> Result<bool, CiStateError> {
        let _guard = self.mu.lock();
        let mut state = self.read(project_id)?;
        if state.has_seen(commit) {
            return Ok(false);
        }
        state.pending_enqueue_commit = commit.to_string();
        self.persist(project_id, &state)?;
        Ok(true)
    }

    /// Drop the reservation iff it still holds `commit` (publish failed
    /// after the reservation was taken).
    pub fn rollback_source_commit_pending_enqueue(
        &self,
        project_id: &str,
        commit: &str,
    ) -> Result<(), CiStateError> {
        let _guard = self.mu.lock();
        let mut state = self.read(project_id)?;
        if state.pending_enqueue_commit != commit {
            return Ok(());
        }
        state.pending_enqueue_commit = String::new();
        self.persist(project_id, &state)
    }

    /// Move the reserved commit into the per-op table as `enqueued`.
    ///
    /// Stale failed entries for the same commit are dropped so a
    /// retry-after-fix does not accumulate dead rows.
    pub fn confirm_source_commit_pending_op(
        &self,
        project_id: &str,
        commit: &str,
        op_id: &str,
    ) -> Result<(), CiStateError> {
        let _guard = self.mu.lock();
        let mut state = self.read(project_id)?;
        state
            .pending_by_op_id
            .retain(|_, p| !(p.commit == commit && p.status == PendingOpStatus::Failed));
        state.pending_by_op_id.insert(
            op_id.to_string(),
            PendingOp {
                commit: commit.to_string(),
                status: PendingOpStatus::Enqueued,
            },
        );
        if state.pending_enqueue_commit == commit {
            state.pending_enqueue_commit = String::new();
        }
        self.persist(project_id, &state)
    }

    /// Settle the op's entry: promote its commit to
    /// `last_successful_commit` on success, or keep it as `failed` so a
    /// fixed pipeline can run the commit again.
    pub fn finalize_source_commit_pending_op(
        &self,
        project_id: &str,
        op_id: &str,
        successful: bool,
    ) -> Result<(), CiStateError> {
        let _guard = self.mu.lock();
        let mut state = self.read(project_id)?;
        let Some(entry) = state.pending_by_op_id.get(op_id).cloned() else {
            return Ok(());
        };
        if successful {
            state.last_successful_commit = entry.commit.clone();
            state.pending_by_op_id.retain(|id, p| {
                id != op_id && !(p.commit == entry.commit && p.status == PendingOpStatus::Failed)
            });
        } else if let Some(p) = state.pending_by_op_id.get_mut(op_id) {
            p.status = PendingOpStatus::Failed;
        }
        self.persist(project_id, &state)
    }

    fn read(&self, project_id: &str) -> Result<CiCommitState, CiStateError> {
        if let Some(raw) = self.artifacts.read(project_id, CI_STATE_FILE)? {
            return serde_json::from_str(&raw).map_err(CiStateError::Decode);
        }
        // Migrate the legacy single-line file on first read; it is
        // superseded once the JSON state is persisted.
        if let Some(raw) = self.artifacts.read(project_id, CI_LEGACY_FILE)? {
            let commit = raw.trim().to_string();
            if !commit.is_empty() {
                info!(project_id, %commit, "migrating legacy ci commit file");
                return Ok(CiCommitState {
                    last_successful_commit: commit,
                    ..Default::default()
                });
            }
        }
        Ok(CiCommitState::default())
    }

    fn persist(&self, project_id: &str, state: &CiCommitState) -> Result<(), CiStateError> {
        let raw = serde_json::to_string_pretty(state).map_err(CiStateError::Encode)?;
        self.artifacts
            .write_atomic(project_id, CI_STATE_FILE, &raw)?;
        // Best-effort: the legacy file is dead weight once JSON exists
        let legacy = self.artifacts.path(project_id, CI_LEGACY_FILE);
        let _ = std::fs::remove_file(legacy);
        Ok(())
    }
}

#[cfg(test)]
#[path = "ci_state_tests.rs"]
mod tests;

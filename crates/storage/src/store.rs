// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable store facade over the KV substrate.
//!
//! Two buckets: `berth_projects` (keys `project/{id}`) and `berth_ops`
//! (keys `op/{id}`). Project writes stamp `updated_at_ms`; op writes are
//! pure round-trips.

use berth_core::{Clock, Operation, Project};
use berth_adapters::{KvBucket, KvError};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Bucket holding project records.
pub const PROJECTS_BUCKET: &str = "berth_projects";

/// Bucket holding operation records.
pub const OPS_BUCKET: &str = "berth_ops";

/// Revisions retained per project key.
pub const PROJECTS_HISTORY: usize = 25;

/// Revisions retained per op key.
pub const OPS_HISTORY: usize = 50;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("op not found: {0}")]
    OpNotFound(String),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error("decode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode: {0}")]
    Encode(#[source] serde_json::Error),
}

fn project_key(id: &str) -> String {
    format!("project/{}", id)
}

fn op_key(id: &str) -> String {
    format!("op/{}", id)
}

/// Record store over the two KV buckets.
#[derive(Clone)]
pub struct Store<C: Clock> {
    projects: Arc<dyn KvBucket>,
    ops: Arc<dyn KvBucket>,
    clock: C,
}

impl<C: Clock> Store<C> {
    pub fn new(projects: Arc<dyn KvBucket>, ops: Arc<dyn KvBucket>, clock: C) -> Self {
        Self {
            projects,
            ops,
            clock,
        }
    }

    /// Write a project record, stamping `updated_at_ms`.
    pub async fn put_project(&self, mut project: Project) -> Result<Project, StoreError> {
        project.updated_at_ms = self.clock.epoch_ms();
        project.status.updated_at_ms = project.updated_at_ms;
        let key = project_key(project.id.as_str());
        let bytes = serde_json::to_vec(&project).map_err(StoreError::Encode)?;
        self.projects.put(&key, bytes).await?;
        Ok(project)
    }

    pub async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        let key = project_key(id);
        let entry = self
            .projects
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))?;
        serde_json::from_slice(&entry.value).map_err(|source| StoreError::Decode { key, source })
    }

    /// All project records, sorted by creation time ascending.
    ///
    /// Individual records that fail to decode are skipped with a warning;
    /// a corrupt entry must not hide the rest of the listing.
    pub async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let keys = self.projects.keys("project/").await?;
        let mut projects = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(entry) = self.projects.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<Project>(&entry.value) {
                Ok(project) => projects.push(project),
                Err(e) => warn!(%key, error = %e, "skipping undecodable project record"),
            }
        }
        projects.sort_by_key(|p| p.created_at_ms);
        Ok(projects)
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        self.projects.delete(&project_key(id)).await?;
        Ok(())
    }

    pub async fn put_op(&self, op: &Operation) -> Result<(), StoreError> {
        let key = op_key(op.id.as_str());
        let bytes = serde_json::to_vec(op).map_err(StoreError::Encode)?;
        self.ops.put(&key, bytes).await?;
        Ok(())
    }

    pub async fn get_op(&self, id: &str) -> Result<Operation, StoreError> {
        let key = op_key(id);
        let entry = self
            .ops
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::OpNotFound(id.to_string()))?;
        serde_json::from_slice(&entry.value).map_err(|source| StoreError::Decode { key, source })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

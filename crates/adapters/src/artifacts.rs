// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem artifact store.
//!
//! Every project owns a directory tree under the platform data dir:
//!
//! ```text
//! projects/{id}/repos/source        project source checkout
//! projects/{id}/repos/deploy        rendered-manifest repo
//! projects/{id}/build               image digest and build metadata
//! projects/{id}/deploy/{env}        per-environment manifests
//! projects/{id}/promotions/{a}-to-{b}
//! projects/{id}/releases/{a}-to-{b}
//! ```

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Source repo directory, relative to the project dir.
pub const REPO_SOURCE_DIR: &str = "repos/source";

/// Deploy repo directory, relative to the project dir.
pub const REPO_DEPLOY_DIR: &str = "repos/deploy";

/// CI commit dedupe state file, relative to the project dir.
pub const CI_STATE_FILE: &str = "repos/source/.berth/ci-commit-state.json";

/// Legacy single-line commit file, migrated into [`CI_STATE_FILE`].
pub const CI_LEGACY_FILE: &str = "repos/source/.berth/last-ci-commit.txt";

/// Errors from artifact filesystem operations
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Filesystem store rooted at the platform data dir.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owning all artifacts of one project.
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join("projects").join(project_id)
    }

    /// Absolute path of an artifact inside a project tree.
    pub fn path(&self, project_id: &str, rel: &str) -> PathBuf {
        self.project_dir(project_id).join(rel)
    }

    /// Write an artifact, creating parent directories.
    pub fn write(&self, project_id: &str, rel: &str, contents: &str) -> Result<(), ArtifactError> {
        let path = self.path(project_id, rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }
        std::fs::write(&path, contents).map_err(|e| ArtifactError::io(&path, e))
    }

    /// Read an artifact; a missing file maps to `None`.
    pub fn read(&self, project_id: &str, rel: &str) -> Result<Option<String>, ArtifactError> {
        let path = self.path(project_id, rel);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactError::io(&path, e)),
        }
    }

    pub fn exists(&self, project_id: &str, rel: &str) -> bool {
        self.path(project_id, rel).exists()
    }

    /// Create a directory inside a project tree.
    pub fn ensure_dir(&self, project_id: &str, rel: &str) -> Result<(), ArtifactError> {
        let path = self.path(project_id, rel);
        std::fs::create_dir_all(&path).map_err(|e| ArtifactError::io(&path, e))
    }

    /// Remove a project's entire artifact tree. Missing tree is fine.
    pub fn remove_project(&self, project_id: &str) -> Result<(), ArtifactError> {
        let path = self.project_dir(project_id);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArtifactError::io(&path, e)),
        }
    }

    /// Atomically replace an artifact via a temp file and rename.
    pub fn write_atomic(
        &self,
        project_id: &str,
        rel: &str,
        contents: &str,
    ) -> Result<(), ArtifactError> {
        let path = self.path(project_id, rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents).map_err(|e| ArtifactError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| ArtifactError::io(&path, e))
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;

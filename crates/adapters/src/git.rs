// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git operations as opaque shell-outs.
//!
//! Commits the platform makes itself carry the `platform-sync:` message
//! prefix so the source watcher can tell them apart from user commits.

use crate::subprocess::{run_with_timeout, GIT_OP_TIMEOUT, GIT_READ_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

/// Message prefix on commits created by the platform itself.
pub const PLATFORM_SYNC_PREFIX: &str = "platform-sync:";

/// Errors from git shell-outs
#[derive(Debug, Error)]
pub enum GitError {
    #[error("{0}")]
    Command(String),
    #[error("git exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
}

/// Git access used by repo bootstrap and the source watcher.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Initialize a repo with an initial platform-sync commit.
    async fn init_repo(&self, repo: &Path) -> Result<(), GitError>;

    /// `HEAD` commit hash of the repo.
    async fn head_commit(&self, repo: &Path) -> Result<String, GitError>;

    /// Subject line of the `HEAD` commit.
    async fn head_message(&self, repo: &Path) -> Result<String, GitError>;
}

/// Shell-out git client.
#[derive(Debug, Clone, Default)]
pub struct ShellGitClient;

impl ShellGitClient {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        repo: &Path,
        args: &[&str],
        timeout: std::time::Duration,
        description: &str,
    ) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(repo).args(args);
        let output = run_with_timeout(cmd, timeout, description)
            .await
            .map_err(GitError::Command)?;
        if !output.status.success() {
            return Err(GitError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl GitClient for ShellGitClient {
    async fn init_repo(&self, repo: &Path) -> Result<(), GitError> {
        std::fs::create_dir_all(repo)
            .map_err(|e| GitError::Command(format!("create {} failed: {}", repo.display(), e)))?;
        Self::run(repo, &["init", "-q"], GIT_OP_TIMEOUT, "git init").await?;
        Self::run(
            repo,
            &[
                "-c",
                "user.name=berth",
                "-c",
                "user.email=berth@localhost",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                &format!("{} bootstrap", PLATFORM_SYNC_PREFIX),
            ],
            GIT_OP_TIMEOUT,
            "git commit",
        )
        .await?;
        Ok(())
    }

    async fn head_commit(&self, repo: &Path) -> Result<String, GitError> {
        Self::run(repo, &["rev-parse", "HEAD"], GIT_READ_TIMEOUT, "git rev-parse").await
    }

    async fn head_message(&self, repo: &Path) -> Result<String, GitError> {
        Self::run(
            repo,
            &["log", "-1", "--format=%s"],
            GIT_READ_TIMEOUT,
            "git log",
        )
        .await
    }
}

/// In-memory git client for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeGitClient {
    repos: std::sync::Arc<parking_lot::Mutex<std::collections::HashMap<std::path::PathBuf, (String, String)>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeGitClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HEAD commit and message for a repo path.
    pub fn set_head(&self, repo: &Path, commit: &str, message: &str) {
        self.repos
            .lock()
            .insert(repo.to_path_buf(), (commit.to_string(), message.to_string()));
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl GitClient for FakeGitClient {
    async fn init_repo(&self, repo: &Path) -> Result<(), GitError> {
        self.set_head(
            repo,
            "0000000000000000000000000000000000000000",
            &format!("{} bootstrap", PLATFORM_SYNC_PREFIX),
        );
        Ok(())
    }

    async fn head_commit(&self, repo: &Path) -> Result<String, GitError> {
        self.repos
            .lock()
            .get(repo)
            .map(|(commit, _)| commit.clone())
            .ok_or_else(|| GitError::Command(format!("no repo at {}", repo.display())))
    }

    async fn head_message(&self, repo: &Path) -> Result<String, GitError> {
        self.repos
            .lock()
            .get(repo)
            .map(|(_, message)| message.clone())
            .ok_or_else(|| GitError::Command(format!("no repo at {}", repo.display())))
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;

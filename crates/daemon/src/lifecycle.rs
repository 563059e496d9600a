// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: config resolution, single-instance lock, platform
//! wiring over the embedded substrate.

use berth_adapters::{ArtifactStore, Broker, EmbeddedBroker, EmbeddedKv, ShellGitClient};
use berth_core::{HexIdGen, SystemClock};
use berth_engine::{EngineConfig, Platform};
use berth_storage::{Store, OPS_BUCKET, OPS_HISTORY, PROJECTS_BUCKET, PROJECTS_HISTORY};
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors during daemon startup and shutdown
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot resolve a state directory (set BERTH_STATE_DIR)")]
    NoStateDir,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("another daemon holds the lock at {0}")]
    LockFailed(PathBuf),
}

/// Resolved daemon paths.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    /// Artifact store root (project trees live underneath)
    pub data_dir: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;
        Ok(Self {
            data_dir: state_dir.join("data"),
            log_path: state_dir.join("logs/daemon.log"),
            lock_path: state_dir.join("daemon.lock"),
            state_dir,
        })
    }
}

/// Engine tuning with env overrides applied.
pub fn engine_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(api_wait) = crate::env::api_wait() {
        config.api_wait = api_wait;
    }
    if let Some(interval) = crate::env::watch_interval() {
        config.watch_interval = interval;
    }
    config.watcher_enabled = crate::env::watcher_enabled();
    config
}

/// Everything `main` needs after startup.
pub struct StartupResult {
    pub platform: Platform<SystemClock, HexIdGen>,
    pub broker: EmbeddedBroker,
    /// Held for the daemon's lifetime; dropping releases the lock
    pub lock_file: File,
}

/// Acquire the single-instance lock and wire the platform.
pub fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let lock_file = acquire_lock(config)?;

    let broker = EmbeddedBroker::new();
    let clock = SystemClock;
    let store = Store::new(
        Arc::new(EmbeddedKv::new(PROJECTS_BUCKET, PROJECTS_HISTORY)),
        Arc::new(EmbeddedKv::new(OPS_BUCKET, OPS_HISTORY)),
        clock.clone(),
    );
    let platform = Platform::new(
        Arc::new(broker.clone()) as Arc<dyn Broker>,
        store,
        ArtifactStore::new(&config.data_dir),
        Arc::new(ShellGitClient::new()),
        clock,
        HexIdGen,
        engine_config(),
    );

    Ok(StartupResult {
        platform,
        broker,
        lock_file,
    })
}

/// Take the advisory lock, writing our pid for diagnostics.
fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(LifecycleError::LockFailed(config.lock_path.clone()));
    }
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

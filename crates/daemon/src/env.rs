// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: BERTH_STATE_DIR > XDG_STATE_HOME/berth >
/// ~/.local/state/berth
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("BERTH_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("berth"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/berth"))
}

/// `enqueue_op` wait override (BERTH_API_WAIT_MS)
pub fn api_wait() -> Option<Duration> {
    duration_ms("BERTH_API_WAIT_MS")
}

/// Watcher poll interval override (BERTH_WATCH_INTERVAL_MS)
pub fn watch_interval() -> Option<Duration> {
    duration_ms("BERTH_WATCH_INTERVAL_MS")
}

/// Whether the in-process source commit watcher runs (BERTH_SOURCE_WATCHER=1)
pub fn watcher_enabled() -> bool {
    std::env::var("BERTH_SOURCE_WATCHER")
        .map(|v| v == "1")
        .unwrap_or(false)
}

fn duration_ms(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

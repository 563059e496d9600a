// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Berth Daemon (berthd)
//!
//! Background process that owns the embedded substrate and runs the
//! operation pipeline: worker chain, finalizers, and the optional
//! source commit watcher.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod env;
mod lifecycle;

use berth_engine::SourceWatcher;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::lifecycle::{Config, LifecycleError, StartupResult};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("berthd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("berthd {}", env!("CARGO_PKG_VERSION"));
                println!("Berth Daemon - runs the application delivery pipeline");
                println!();
                println!("USAGE:");
                println!("    berthd");
                println!();
                println!("Configuration is taken from the environment:");
                println!("    BERTH_STATE_DIR          state directory");
                println!("    BERTH_API_WAIT_MS        enqueue wait budget");
                println!("    BERTH_SOURCE_WATCHER     1 enables the commit watcher");
                println!("    BERTH_WATCH_INTERVAL_MS  watcher poll interval");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: berthd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Rotate log file if it has grown too large
    rotate_log_if_needed(&config.log_path);

    let log_guard = setup_logging(&config)?;
    info!("starting berth daemon");

    let StartupResult {
        platform,
        broker,
        lock_file,
    } = match lifecycle::startup(&config) {
        Ok(result) => result,
        Err(LifecycleError::LockFailed(path)) => {
            let pid = std::fs::read_to_string(&path).unwrap_or_default();
            eprintln!("berthd is already running");
            if !pid.trim().is_empty() {
                eprintln!("  pid: {}", pid.trim());
            }
            drop(log_guard);
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let worker_handles = platform.start();
    info!(workers = worker_handles.len(), "pipeline workers started");

    let watcher_cancel = CancellationToken::new();
    if platform.config().watcher_enabled {
        let watcher = SourceWatcher::new(platform.clone(), platform.config().watch_interval);
        tokio::spawn(watcher.run(watcher_cancel.clone()));
    }

    // Signal ready for parent process (e.g. systemd, CLI waiting for startup)
    println!("READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    // Graceful shutdown: stop the watcher, then the substrate; workers
    // drain and exit as their subscriptions close
    watcher_cancel.cancel();
    broker.shutdown();
    for handle in worker_handles {
        let _ = handle.await;
    }
    drop(lock_file);
    info!("daemon stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently
/// ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = config.log_path.parent().ok_or(LifecycleError::NoStateDir)?;
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(
        log_dir,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

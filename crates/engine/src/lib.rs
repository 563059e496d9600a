// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! berth-engine: the operation orchestration engine.
//!
//! Moves a declarative project operation through an ordered chain of
//! workers over the broker substrate, with exactly-once step effects,
//! per-project serialization, live progress events, and CI trigger
//! dedupe.

mod bookkeeping;
mod ci;
mod config;
mod error;
mod event_hub;
mod orchestrator;
mod waiters;
mod watcher;
mod worker_runtime;
pub mod workers;

pub use bookkeeping::Bookkeeper;
pub use ci::{CiTriggerOutcome, SourceRepoWebhookEvent, REASON_COMMIT_SEEN, REASON_PLATFORM_SYNC};
pub use config::EngineConfig;
pub use error::EngineError;
pub use event_hub::{EventHub, EventStream};
pub use orchestrator::{EnqueueOutcome, Platform, RunOptions};
pub use waiters::WaiterHub;
pub use watcher::SourceWatcher;
pub use worker_runtime::{PoisonRecord, WorkerAction, WorkerContext, WorkerOutcome, WorkerRuntime};

#[cfg(any(test, feature = "test-support"))]
pub mod test_helpers;

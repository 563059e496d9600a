// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixture: a full platform over the embedded substrate.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

#![allow(clippy::expect_used)]

use crate::config::EngineConfig;
use crate::orchestrator::Platform;
use berth_adapters::{ArtifactStore, Broker, FakeGitClient, FlakyBroker};
use berth_core::{FakeClock, SequentialIdGen};
use berth_storage::{Store, OPS_BUCKET, OPS_HISTORY, PROJECTS_BUCKET, PROJECTS_HISTORY};
use std::sync::Arc;

/// Everything a scenario needs, wired over tempdir + embedded substrate.
pub struct TestContext {
    pub platform: Platform<FakeClock, SequentialIdGen>,
    pub broker: FlakyBroker,
    pub clock: FakeClock,
    pub artifacts: ArtifactStore,
    pub git: FakeGitClient,
    /// Keeps the artifact root alive for the duration of the test
    pub dir: tempfile::TempDir,
}

impl TestContext {
    /// Build a platform with fast test timings. Call
    /// `ctx.platform.start()` inside a tokio runtime to run the workers.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::fast())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir for test context");
        let clock = FakeClock::new();
        let broker = FlakyBroker::new();
        let git = FakeGitClient::new();
        let artifacts = ArtifactStore::new(dir.path());
        let store = Store::new(
            Arc::new(berth_adapters::EmbeddedKv::new(
                PROJECTS_BUCKET,
                PROJECTS_HISTORY,
            )),
            Arc::new(berth_adapters::EmbeddedKv::new(OPS_BUCKET, OPS_HISTORY)),
            clock.clone(),
        );
        let platform = Platform::new(
            Arc::new(broker.clone()) as Arc<dyn Broker>,
            store,
            artifacts.clone(),
            Arc::new(git.clone()),
            clock.clone(),
            SequentialIdGen::new("id"),
            config,
        );
        Self {
            platform,
            broker,
            clock,
            artifacts,
            git,
            dir,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

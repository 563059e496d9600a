// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: broker substrate, KV buckets, artifact
//! filesystem, and git shell-outs.

pub mod artifacts;
pub mod broker;
pub mod git;
pub mod kv;
pub mod subprocess;

pub use artifacts::{ArtifactError, ArtifactStore};
pub use broker::{
    Broker, BrokerError, ConsumerConfig, Delivery, EmbeddedBroker, Subscription,
};
pub use git::{GitClient, GitError, ShellGitClient};
pub use kv::{EmbeddedKv, KvBucket, KvEntry, KvError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use broker::FlakyBroker;
#[cfg(any(test, feature = "test-support"))]
pub use git::FakeGitClient;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key-value substrate interface.
//!
//! Buckets provide versioned entries with a bounded per-key history,
//! compare-and-swap updates, and prefix scans. The store facade in
//! `berth-storage` is built on this interface.

mod embedded;

pub use embedded::EmbeddedKv;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from KV bucket operations
#[derive(Debug, Error)]
pub enum KvError {
    #[error("wrong last revision for {key}: expected {expected}, found {found}")]
    WrongRevision {
        key: String,
        expected: u64,
        found: u64,
    },
    #[error("bucket {0} is unavailable: {1}")]
    Unavailable(String, String),
}

/// A versioned value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Vec<u8>,
    /// Bucket-wide monotonically increasing revision
    pub revision: u64,
}

/// One durable bucket.
#[async_trait]
pub trait KvBucket: Send + Sync {
    /// Snapshot read of the latest entry for `key`.
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError>;

    /// Unconditional write. Returns the new revision.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError>;

    /// Compare-and-swap write: succeeds only when the latest revision for
    /// `key` equals `expected` (0 for a key that must not exist yet).
    async fn update(&self, key: &str, value: Vec<u8>, expected: u64) -> Result<u64, KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

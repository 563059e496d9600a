// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process KV bucket with bounded per-key history.

use super::{KvBucket, KvEntry, KvError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Embedded bucket; cheap to clone, all clones share state.
#[derive(Clone)]
pub struct EmbeddedKv {
    name: String,
    history: usize,
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    /// Per-key history, oldest first; last entry is current
    entries: HashMap<String, Vec<KvEntry>>,
    revision: u64,
}

impl EmbeddedKv {
    /// Create a bucket retaining up to `history` revisions per key.
    pub fn new(name: impl Into<String>, history: usize) -> Self {
        Self {
            name: name.into(),
            history: history.max(1),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retained history for `key`, oldest first.
    pub fn history(&self, key: &str) -> Vec<KvEntry> {
        let inner = self.inner.lock();
        inner.entries.get(key).cloned().unwrap_or_default()
    }

    fn write(&self, inner: &mut Inner, key: &str, value: Vec<u8>) -> u64 {
        inner.revision += 1;
        let revision = inner.revision;
        let history = inner.entries.entry(key.to_string()).or_default();
        history.push(KvEntry { value, revision });
        if history.len() > self.history {
            let excess = history.len() - self.history;
            history.drain(..excess);
        }
        revision
    }
}

#[async_trait]
impl KvBucket for EmbeddedKv {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        let inner = self.inner.lock();
        Ok(inner.entries.get(key).and_then(|h| h.last().cloned()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError> {
        let mut inner = self.inner.lock();
        Ok(self.write(&mut inner, key, value))
    }

    async fn update(&self, key: &str, value: Vec<u8>, expected: u64) -> Result<u64, KvError> {
        let mut inner = self.inner.lock();
        let found = inner
            .entries
            .get(key)
            .and_then(|h| h.last())
            .map(|e| e.revision)
            .unwrap_or(0);
        if found != expected {
            return Err(KvError::WrongRevision {
                key: key.to_string(),
                expected,
                found,
            });
        }
        Ok(self.write(&mut inner, key, value))
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut inner = self.inner.lock();
        inner.entries.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
#[path = "embedded_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waiter hub: wakes the caller that enqueued an op when the final
//! worker result lands.

use berth_core::WorkerResultMsg;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Map of op id to the single-slot channel its enqueuer waits on.
#[derive(Clone, Default)]
pub struct WaiterHub {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<WorkerResultMsg>>>>,
}

impl WaiterHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `op_id`, replacing any stale entry.
    pub fn register(&self, op_id: &str) -> oneshot::Receiver<WorkerResultMsg> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(op_id.to_string(), tx);
        rx
    }

    /// Deliver the final result to the registered waiter.
    ///
    /// Non-blocking; silently dropped when nobody is waiting (the caller
    /// timed out or never registered).
    pub fn deliver(&self, op_id: &str, msg: WorkerResultMsg) {
        let waiter = self.inner.lock().remove(op_id);
        if let Some(tx) = waiter {
            let _ = tx.send(msg);
        }
    }

    pub fn unregister(&self, op_id: &str) {
        self.inner.lock().remove(op_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "waiters_tests.rs"]
mod tests;

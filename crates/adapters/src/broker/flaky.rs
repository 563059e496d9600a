// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fault-injecting broker wrapper for tests.

use super::{Broker, BrokerError, ConsumerConfig, EmbeddedBroker, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Wraps an [`EmbeddedBroker`] and fails publishes on demand.
#[derive(Clone, Default)]
pub struct FlakyBroker {
    inner: EmbeddedBroker,
    /// Remaining publish failures per subject (`u32::MAX` = always fail)
    failures: Arc<Mutex<HashMap<String, u32>>>,
}

impl FlakyBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` publishes to `subject`.
    pub fn fail_publish(&self, subject: &str, times: u32) {
        self.failures.lock().insert(subject.to_string(), times);
    }

    /// Fail every publish to `subject` until cleared.
    pub fn fail_publish_always(&self, subject: &str) {
        self.fail_publish(subject, u32::MAX);
    }

    pub fn clear_failures(&self, subject: &str) {
        self.failures.lock().remove(subject);
    }

    pub fn embedded(&self) -> &EmbeddedBroker {
        &self.inner
    }

    fn should_fail(&self, subject: &str) -> bool {
        let mut failures = self.failures.lock();
        let Some(remaining) = failures.get_mut(subject) else {
            return false;
        };
        if *remaining == 0 {
            return false;
        }
        if *remaining != u32::MAX {
            *remaining -= 1;
        }
        true
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.should_fail(subject) {
            return Err(BrokerError::Publish {
                subject: subject.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.publish(subject, payload).await
    }

    async fn pull_subscribe(
        &self,
        subject: &str,
        config: ConsumerConfig,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        self.inner.pull_subscribe(subject, config).await
    }
}

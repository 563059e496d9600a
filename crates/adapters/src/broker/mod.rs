// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker substrate interface.
//!
//! Models the JetStream-class semantics the engine relies on: subjects
//! with at-least-once delivery to a single durable pull consumer each,
//! per-message delivery counts, redelivery of unacknowledged messages
//! after `ack_wait`, scheduled redelivery on negative acknowledgment, and
//! a terminal acknowledgment that stops redelivery for good.

mod embedded;
#[cfg(any(test, feature = "test-support"))]
mod flaky;

pub use embedded::EmbeddedBroker;
#[cfg(any(test, feature = "test-support"))]
pub use flaky::FlakyBroker;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("subject {0} already has a durable consumer")]
    ConsumerExists(String),
    #[error("broker is shut down")]
    Closed,
}

/// Default redelivery ceiling per message.
pub const DEFAULT_MAX_DELIVER: u32 = 5;

/// Default window before an unacknowledged delivery is redelivered.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

/// Durable consumer tuning.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Durable consumer name (stable across reconnects)
    pub durable_name: String,
    /// Deliveries per message before it is dead
    pub max_deliver: u32,
    /// Redelivery window for unacknowledged messages
    pub ack_wait: Duration,
    /// Backoff table indexed by delivery count for nak redelivery
    pub backoff: Vec<Duration>,
}

impl ConsumerConfig {
    pub fn new(durable_name: impl Into<String>) -> Self {
        Self {
            durable_name: durable_name.into(),
            max_deliver: DEFAULT_MAX_DELIVER,
            ack_wait: DEFAULT_ACK_WAIT,
            backoff: default_backoff(),
        }
    }

    /// Redelivery delay for a message on its `delivered`-th delivery.
    pub fn backoff_for(&self, delivered: u32) -> Duration {
        let idx = (delivered.saturating_sub(1)) as usize;
        self.backoff
            .get(idx)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::from_millis(500))
    }
}

/// Exponential backoff: 250ms, 500ms, 1s, 2s, 4s.
fn default_backoff() -> Vec<Duration> {
    vec![
        Duration::from_millis(250),
        Duration::from_millis(500),
        Duration::from_secs(1),
        Duration::from_secs(2),
        Duration::from_secs(4),
    ]
}

/// One delivery of a message to a consumer.
///
/// The consumer must settle every delivery with exactly one of
/// [`ack`](Delivery::ack), [`nak`](Delivery::nak), or
/// [`term`](Delivery::term); an unsettled delivery is redelivered after
/// the consumer's `ack_wait`.
pub struct Delivery {
    pub payload: Vec<u8>,
    /// 1-based count of deliveries of this message, this one included
    pub delivered: u32,
    pub(crate) acker: Box<dyn Acker>,
}

impl Delivery {
    /// Positive acknowledgment: the message is done.
    pub async fn ack(self) {
        self.acker.ack().await;
    }

    /// Negative acknowledgment: redeliver after `delay`.
    pub async fn nak(self, delay: Duration) {
        self.acker.nak(delay).await;
    }

    /// Terminal acknowledgment: never redeliver.
    pub async fn term(self) {
        self.acker.term().await;
    }
}

#[async_trait]
pub(crate) trait Acker: Send + Sync {
    async fn ack(&self);
    async fn nak(&self, delay: Duration);
    async fn term(&self);
}

/// A durable pull subscription on one subject.
#[async_trait]
pub trait Subscription: Send {
    /// Next delivery. Returns `None` when the broker shuts down.
    async fn next(&mut self) -> Option<Delivery>;
}

/// The broker substrate the pipeline runs on.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Create the durable pull consumer for `subject`.
    ///
    /// Each subject carries at most one consumer; a second subscription
    /// on the same subject is refused.
    async fn pull_subscribe(
        &self,
        subject: &str,
        config: ConsumerConfig,
    ) -> Result<Box<dyn Subscription>, BrokerError>;
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process broker substrate.
//!
//! Berth is local-first: the broker lives inside the daemon process. The
//! implementation keeps one queue per subject and honors the consumer
//! contract — delivery counts, `ack_wait` redelivery, nak backoff, and
//! terminal acks.

use super::{Acker, Broker, BrokerError, ConsumerConfig, Delivery, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Embedded broker; cheap to clone, all clones share state.
#[derive(Clone, Default)]
pub struct EmbeddedBroker {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    subjects: HashMap<String, SubjectState>,
    next_msg_id: u64,
    closed: bool,
}

#[derive(Default)]
struct SubjectState {
    /// Message ids available for immediate delivery, in arrival order
    ready: VecDeque<u64>,
    /// Nak'd messages waiting out their backoff
    delayed: Vec<(u64, Instant)>,
    /// Unsettled deliveries and their redelivery deadlines
    inflight: HashMap<u64, Instant>,
    messages: HashMap<u64, Message>,
    wake: Option<mpsc::Sender<()>>,
}

struct Message {
    payload: Vec<u8>,
    delivered: u32,
}

impl SubjectState {
    /// Move due delayed and expired inflight messages back to ready.
    fn promote_due(&mut self, now: Instant) {
        let mut due = Vec::new();
        self.delayed.retain(|(id, at)| {
            if *at <= now {
                due.push(*id);
                false
            } else {
                true
            }
        });
        let mut expired = Vec::new();
        self.inflight.retain(|id, deadline| {
            if *deadline <= now {
                expired.push(*id);
                false
            } else {
                true
            }
        });
        for id in due.into_iter().chain(expired) {
            self.ready.push_back(id);
        }
    }

    /// Earliest instant at which a delayed or inflight message comes due.
    fn next_due(&self) -> Option<Instant> {
        let delayed = self.delayed.iter().map(|(_, at)| *at).min();
        let inflight = self.inflight.values().copied().min();
        match (delayed, inflight) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

impl EmbeddedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop delivery: wakes every consumer, which then observes the
    /// closed flag and returns `None` from `next()`.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        for state in inner.subjects.values_mut() {
            if let Some(wake) = state.wake.take() {
                let _ = wake.try_send(());
            }
        }
    }

    /// Number of undelivered or unsettled messages on a subject.
    pub fn pending(&self, subject: &str) -> usize {
        let inner = self.inner.lock();
        inner
            .subjects
            .get(subject)
            .map(|s| s.messages.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for EmbeddedBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(BrokerError::Closed);
        }
        inner.next_msg_id += 1;
        let id = inner.next_msg_id;
        let state = inner.subjects.entry(subject.to_string()).or_default();
        state.messages.insert(
            id,
            Message {
                payload,
                delivered: 0,
            },
        );
        state.ready.push_back(id);
        if let Some(wake) = &state.wake {
            // Non-blocking wake - if the channel is full, the consumer is
            // already awake
            let _ = wake.try_send(());
        }
        Ok(())
    }

    async fn pull_subscribe(
        &self,
        subject: &str,
        config: ConsumerConfig,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(BrokerError::Closed);
        }
        let state = inner.subjects.entry(subject.to_string()).or_default();
        if state.wake.is_some() {
            return Err(BrokerError::ConsumerExists(subject.to_string()));
        }
        let (wake_tx, wake_rx) = mpsc::channel(1);
        state.wake = Some(wake_tx);
        Ok(Box::new(EmbeddedSubscription {
            inner: Arc::clone(&self.inner),
            subject: subject.to_string(),
            wake_rx,
            config,
        }))
    }
}

struct EmbeddedSubscription {
    inner: Arc<Mutex<Inner>>,
    subject: String,
    wake_rx: mpsc::Receiver<()>,
    config: ConsumerConfig,
}

enum Poll {
    Deliver(Delivery),
    /// A dead message was dropped; look again immediately
    Retry,
    Wait(Option<Instant>),
    Closed,
}

impl EmbeddedSubscription {
    fn poll_available(&self) -> Poll {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Poll::Closed;
        }
        let now = Instant::now();
        let Some(state) = inner.subjects.get_mut(&self.subject) else {
            return Poll::Wait(None);
        };
        state.promote_due(now);
        let Some(id) = state.ready.pop_front() else {
            return Poll::Wait(state.next_due());
        };
        let Some(msg) = state.messages.get_mut(&id) else {
            return Poll::Retry;
        };
        msg.delivered += 1;
        if msg.delivered > self.config.max_deliver {
            tracing::warn!(
                subject = %self.subject,
                msg_id = id,
                max_deliver = self.config.max_deliver,
                "message exhausted deliveries, dropping"
            );
            state.messages.remove(&id);
            return Poll::Retry;
        }
        let delivered = msg.delivered;
        let payload = msg.payload.clone();
        state.inflight.insert(id, now + self.config.ack_wait);
        Poll::Deliver(Delivery {
            payload,
            delivered,
            acker: Box::new(EmbeddedAcker {
                inner: Arc::clone(&self.inner),
                subject: self.subject.clone(),
                msg_id: id,
            }),
        })
    }
}

#[async_trait]
impl Subscription for EmbeddedSubscription {
    async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.poll_available() {
                Poll::Deliver(delivery) => return Some(delivery),
                Poll::Closed => return None,
                Poll::Retry => continue,
                Poll::Wait(deadline) => match deadline {
                    Some(due) => {
                        let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(due));
                        tokio::select! {
                            _ = sleep => {}
                            _ = self.wake_rx.recv() => {}
                        }
                    }
                    None => {
                        if self.wake_rx.recv().await.is_none() {
                            // Sender dropped on shutdown
                            return None;
                        }
                    }
                },
            }
        }
    }
}

struct EmbeddedAcker {
    inner: Arc<Mutex<Inner>>,
    subject: String,
    msg_id: u64,
}

impl EmbeddedAcker {
    fn settle(&self, redeliver_after: Option<Duration>) {
        let mut inner = self.inner.lock();
        let Some(state) = inner.subjects.get_mut(&self.subject) else {
            return;
        };
        if state.inflight.remove(&self.msg_id).is_none() {
            // Deadline already passed and the message was requeued;
            // settling a stale delivery is a no-op
            return;
        }
        match redeliver_after {
            Some(delay) => {
                state.delayed.push((self.msg_id, Instant::now() + delay));
                if let Some(wake) = &state.wake {
                    let _ = wake.try_send(());
                }
            }
            None => {
                state.messages.remove(&self.msg_id);
            }
        }
    }
}

#[async_trait]
impl Acker for EmbeddedAcker {
    async fn ack(&self) {
        self.settle(None);
    }

    async fn nak(&self, delay: Duration) {
        self.settle(Some(delay));
    }

    async fn term(&self) {
        self.settle(None);
    }
}

#[cfg(test)]
#[path = "embedded_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process pub/sub of per-operation lifecycle events.
//!
//! Each op owns a bounded ring of recent events plus a list of live
//! subscribers. Publishing never blocks: slow subscribers lose events
//! (their channel is bounded and full sends are dropped). Terminal
//! streams are swept after a TTL so the map stays bounded.

use berth_core::{Clock, OpEvent, OpEventName, OpEventPayload};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Buffered events per live subscriber before drops kick in.
const SUBSCRIBER_BUFFER: usize = 64;

/// Hub of per-op event streams; cheap to clone.
pub struct EventHub<C: Clock> {
    inner: Arc<Mutex<HubInner>>,
    clock: C,
    ring: usize,
    ttl_ms: u64,
}

impl<C: Clock> Clone for EventHub<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: self.clock.clone(),
            ring: self.ring,
            ttl_ms: self.ttl_ms,
        }
    }
}

#[derive(Default)]
struct HubInner {
    streams: HashMap<String, OpStream>,
    next_sub_id: u64,
}

#[derive(Default)]
struct OpStream {
    /// Last assigned sequence for this op
    seq: u64,
    ring: VecDeque<OpEvent>,
    subs: Vec<HubSub>,
    /// Set when the terminal event was published; starts the TTL
    terminal_at_ms: Option<u64>,
}

struct HubSub {
    id: u64,
    tx: mpsc::Sender<OpEvent>,
}

/// Replay plus live tail for one op's events.
pub struct EventStream {
    /// Events after the caller's Last-Event-ID, oldest first
    pub replay: Vec<OpEvent>,
    /// Live channel; closed when the stream is swept
    pub live: mpsc::Receiver<OpEvent>,
    /// True when the Last-Event-ID fell behind the retained window; the
    /// caller materializes a synthetic bootstrap event from the stored op
    pub needs_bootstrap: bool,
    inner: Arc<Mutex<HubInner>>,
    op_id: String,
    sub_id: u64,
}

impl EventStream {
    /// Remove this subscriber from the hub.
    fn remove(&self) {
        let mut inner = self.inner.lock();
        if let Some(stream) = inner.streams.get_mut(&self.op_id) {
            stream.subs.retain(|s| s.id != self.sub_id);
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.remove();
    }
}

impl<C: Clock> EventHub<C> {
    pub fn new(clock: C, ring: usize, ttl: std::time::Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner::default())),
            clock,
            ring: ring.max(1),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    /// Publish an event for `payload.op_id`.
    ///
    /// Assigns the next per-op sequence, appends to the ring, fans out to
    /// live subscribers, and sweeps expired terminal streams.
    pub fn publish(&self, name: OpEventName, mut payload: OpEventPayload) -> OpEvent {
        let now_ms = self.clock.epoch_ms();
        payload.at = now_ms;
        let op_id = payload.op_id.clone();

        let mut inner = self.inner.lock();
        let stream = inner.streams.entry(op_id).or_default();
        stream.seq += 1;
        let event = OpEvent {
            id: stream.seq,
            name,
            payload,
        };

        stream.ring.push_back(event.clone());
        if stream.ring.len() > self.ring {
            stream.ring.pop_front();
        }
        if name.is_terminal() {
            stream.terminal_at_ms = Some(now_ms);
        }
        stream
            .subs
            .retain(|sub| match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow subscriber: drop the event, keep the channel
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });

        self.sweep(&mut inner, now_ms);
        event
    }

    /// Subscribe to an op's events from `last_event_id` (exclusive).
    pub fn subscribe(&self, op_id: &str, last_event_id: Option<u64>) -> EventStream {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut inner = self.inner.lock();
        inner.next_sub_id += 1;
        let sub_id = inner.next_sub_id;

        let stream = inner.streams.entry(op_id.to_string()).or_default();
        let oldest = stream.seq - stream.ring.len() as u64 + 1;

        // An absent Last-Event-ID is a fresh subscriber: everything
        // retained, never a bootstrap. An explicit one that predates the
        // oldest retained record means the client has a gap only the
        // stored op can fill.
        let (replay, needs_bootstrap) = match last_event_id {
            None => (stream.ring.iter().cloned().collect(), false),
            Some(last) if last >= stream.seq => (Vec::new(), false),
            Some(last) if !stream.ring.is_empty() && last + 1 >= oldest => {
                let replay = stream.ring.iter().filter(|e| e.id > last).cloned().collect();
                (replay, false)
            }
            Some(_) => (Vec::new(), true),
        };

        stream.subs.push(HubSub { id: sub_id, tx });
        EventStream {
            replay,
            live: rx,
            needs_bootstrap,
            inner: Arc::clone(&self.inner),
            op_id: op_id.to_string(),
            sub_id,
        }
    }

    /// Number of live subscribers across all streams.
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.streams.values().map(|s| s.subs.len()).sum()
    }

    /// Drop streams whose terminal event is older than the TTL.
    fn sweep(&self, inner: &mut HubInner, now_ms: u64) {
        let ttl_ms = self.ttl_ms;
        inner.streams.retain(|_, stream| match stream.terminal_at_ms {
            Some(t) => now_ms.saturating_sub(t) < ttl_ms,
            None => true,
        });
    }
}

#[cfg(test)]
#[path = "event_hub_tests.rs"]
mod tests;

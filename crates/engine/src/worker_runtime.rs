// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic worker consumer loop.
//!
//! Each worker consumes one subject and produces on the next. The loop
//! decodes the op message, skips work when an upstream worker already
//! failed, runs the action with idempotent step bookkeeping, and settles
//! the delivery from the publish outcome: ack on success, nak with
//! backoff while retries remain, poison + terminate when they run out.

use crate::bookkeeping::Bookkeeper;
use crate::config::EngineConfig;
use crate::error::EngineError;
use berth_adapters::{ArtifactStore, Broker, ConsumerConfig, Delivery, GitClient, Subscription};
use berth_core::subject::SUBJECT_OP_POISON;
use berth_core::{Clock, OpKind, OpStatus, ProjectOpMsg, WorkerResultMsg};
use berth_storage::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Dependencies handed to every worker action.
pub struct WorkerContext<C: Clock> {
    pub store: Store<C>,
    pub artifacts: ArtifactStore,
    pub git: Arc<dyn GitClient>,
    pub clock: C,
}

impl<C: Clock> Clone for WorkerContext<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            artifacts: self.artifacts.clone(),
            git: Arc::clone(&self.git),
            clock: self.clock.clone(),
        }
    }
}

/// What a worker action produced.
#[derive(Debug, Clone, Default)]
pub struct WorkerOutcome {
    pub message: String,
    pub artifacts: Vec<String>,
}

impl WorkerOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// One stage of the pipeline.
///
/// Errors are plain strings: an action failure is op data (recorded on
/// the step and forwarded downstream), not a typed engine fault.
#[async_trait::async_trait]
pub trait WorkerAction<C: Clock>: Send + Sync + 'static {
    /// Stable worker name recorded on op steps.
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String>;
}

/// Dead-letter record published when a delivery exhausts its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonRecord {
    pub subject: String,
    pub op_id: String,
    pub project_id: String,
    pub kind: OpKind,
    pub worker: String,
    pub reason: String,
    pub at: u64,
}

/// Drives worker actions against the broker.
pub struct WorkerRuntime<C: Clock> {
    broker: Arc<dyn Broker>,
    book: Bookkeeper<C>,
    ctx: WorkerContext<C>,
    config: EngineConfig,
}

impl<C: Clock> Clone for WorkerRuntime<C> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            book: self.book.clone(),
            ctx: self.ctx.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: Clock> WorkerRuntime<C> {
    pub fn new(
        broker: Arc<dyn Broker>,
        book: Bookkeeper<C>,
        ctx: WorkerContext<C>,
        config: EngineConfig,
    ) -> Self {
        Self {
            broker,
            book,
            ctx,
            config,
        }
    }

    /// Consume `inbound` with `action`, producing on `outbound`, until
    /// the broker shuts down.
    pub async fn run<A: WorkerAction<C>>(
        &self,
        action: A,
        inbound: &'static str,
        outbound: &'static str,
    ) -> Result<(), EngineError> {
        let mut consumer_config = ConsumerConfig::new(action.name());
        consumer_config.max_deliver = self.config.max_deliver;
        consumer_config.ack_wait = self.config.ack_wait;
        consumer_config.backoff = self.config.backoff.clone();

        let mut sub = self
            .broker
            .pull_subscribe(inbound, consumer_config.clone())
            .await
            .map_err(|e| EngineError::Internal(format!("subscribe {}: {}", inbound, e)))?;

        info!(worker = action.name(), inbound, outbound, "worker started");
        while let Some(delivery) = sub.next().await {
            self.process(&action, &consumer_config, outbound, delivery)
                .await;
        }
        info!(worker = action.name(), "worker stopped");
        Ok(())
    }

    async fn process<A: WorkerAction<C>>(
        &self,
        action: &A,
        consumer_config: &ConsumerConfig,
        outbound: &str,
        delivery: Delivery,
    ) {
        let worker = action.name();
        let msg: ProjectOpMsg = match serde_json::from_slice(&delivery.payload) {
            Ok(msg) => msg,
            Err(e) => {
                error!(worker, error = %e, "undecodable message; terminating delivery");
                delivery.term().await;
                return;
            }
        };

        let mut result = if msg.failed_upstream() {
            // Forward without acting so the chain drains to the finalizer
            WorkerResultMsg {
                op: msg.clone(),
                worker: worker.to_string(),
                message: "skipped due to upstream error".to_string(),
                artifacts: Vec::new(),
            }
        } else {
            self.act(action, &msg).await
        };
        result.op.at = self.ctx.clock.epoch_ms();

        let payload = match serde_json::to_vec(&result) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(worker, op_id = %msg.op_id, error = %e, "result encode failed");
                delivery.term().await;
                return;
            }
        };

        match self.broker.publish(outbound, payload).await {
            Ok(()) => delivery.ack().await,
            Err(publish_err) if delivery.delivered < consumer_config.max_deliver => {
                let delay = consumer_config.backoff_for(delivery.delivered);
                warn!(
                    worker,
                    op_id = %msg.op_id,
                    delivered = delivery.delivered,
                    error = %publish_err,
                    "publish failed; scheduling redelivery"
                );
                delivery.nak(delay).await;
            }
            Err(publish_err) => {
                self.poison(outbound, worker, &result, &publish_err.to_string())
                    .await;
                delivery.term().await;
            }
        }
    }

    /// Run the action with step bookkeeping around it.
    async fn act<A: WorkerAction<C>>(&self, action: &A, msg: &ProjectOpMsg) -> WorkerResultMsg {
        let worker = action.name();
        if let Err(e) = self
            .book
            .mark_op_step_start(&msg.op_id, worker, &format!("{} running", worker))
            .await
        {
            warn!(worker, op_id = %msg.op_id, error = %e, "step start bookkeeping failed");
        }

        match action.run(&self.ctx, msg).await {
            Ok(outcome) => {
                if let Err(e) = self
                    .book
                    .mark_op_step_end(
                        &msg.op_id,
                        worker,
                        &outcome.message,
                        "",
                        outcome.artifacts.clone(),
                    )
                    .await
                {
                    warn!(worker, op_id = %msg.op_id, error = %e, "step end bookkeeping failed");
                }
                WorkerResultMsg {
                    op: msg.clone(),
                    worker: worker.to_string(),
                    message: outcome.message,
                    artifacts: outcome.artifacts,
                }
            }
            Err(action_err) => {
                if let Err(e) = self
                    .book
                    .mark_op_step_end(&msg.op_id, worker, "worker failed", &action_err, Vec::new())
                    .await
                {
                    warn!(worker, op_id = %msg.op_id, error = %e, "step end bookkeeping failed");
                }
                let mut failed = msg.clone();
                failed.err = action_err;
                WorkerResultMsg {
                    op: failed,
                    worker: worker.to_string(),
                    message: "worker failed".to_string(),
                    artifacts: Vec::new(),
                }
            }
        }
    }

    /// Dead-letter the message and finalize the op as failed.
    async fn poison(&self, outbound: &str, worker: &str, result: &WorkerResultMsg, reason: &str) {
        error!(
            worker,
            op_id = %result.op.op_id,
            outbound,
            reason,
            "delivery exhausted retries; poisoning"
        );
        let record = PoisonRecord {
            subject: outbound.to_string(),
            op_id: result.op.op_id.clone(),
            project_id: result.op.project_id.clone(),
            kind: result.op.kind,
            worker: worker.to_string(),
            reason: reason.to_string(),
            at: self.ctx.clock.epoch_ms(),
        };
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = self.broker.publish(SUBJECT_OP_POISON, bytes).await {
                    warn!(op_id = %result.op.op_id, error = %e, "poison publish failed");
                }
            }
            Err(e) => warn!(op_id = %result.op.op_id, error = %e, "poison encode failed"),
        }

        let diagnostic = format!(
            "worker delivery exhausted retries on {}: {}",
            outbound, reason
        );
        if let Err(e) = self
            .book
            .finalize_op(
                &result.op.op_id,
                &result.op.project_id,
                result.op.kind,
                OpStatus::Error,
                &diagnostic,
            )
            .await
        {
            warn!(op_id = %result.op.op_id, error = %e, "poison finalize failed");
        }
    }
}

#[cfg(test)]
#[path = "worker_runtime_tests.rs"]
mod tests;

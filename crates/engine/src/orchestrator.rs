// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The operation orchestrator and engine facade.
//!
//! `enqueue_op` serializes concurrent operations per project, writes the
//! initial records, registers a waiter, publishes the start message on
//! the kind-appropriate subject, and waits (bounded) for the final
//! worker result. Finalizer consumers on the terminal subjects settle
//! records and wake the waiter.

use crate::bookkeeping::Bookkeeper;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event_hub::{EventHub, EventStream};
use crate::waiters::WaiterHub;
use crate::worker_runtime::{WorkerContext, WorkerRuntime};
use crate::workers::{BootstrapRepos, BuildImage, Deployer, Promoter, Register, RenderManifests};
use berth_adapters::{ArtifactStore, Broker, ConsumerConfig, GitClient, Subscription};
use berth_core::subject::{
    SUBJECT_BOOTSTRAP_DONE, SUBJECT_BUILD_DONE, SUBJECT_DEPLOYMENT_DONE,
    SUBJECT_DEPLOYMENT_RENDERED, SUBJECT_DEPLOYMENT_START, SUBJECT_DEPLOY_DONE,
    SUBJECT_OP_START, SUBJECT_PROMOTION_DONE, SUBJECT_PROMOTION_RENDERED,
    SUBJECT_PROMOTION_START, SUBJECT_REGISTRATION_DONE,
};
use berth_core::{
    start_subject, Clock, Delivery, DeliveryStage, IdGen, OpId, OpKind, OpStatus, Operation,
    Project, ProjectId, ProjectOpMsg, ProjectPhase, ProjectSpec, ValidationError,
    WorkerResultMsg,
};
use berth_storage::{CiCommitLedger, Store};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Targets for delivery ops.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub deploy_env: Option<String>,
    pub from_env: Option<String>,
    pub to_env: Option<String>,
}

/// What a completed enqueue returns: the refreshed op record and the
/// final worker's result message.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub op: Operation,
    pub result: WorkerResultMsg,
}

/// Releases the per-project serialization slot on drop.
pub(crate) struct ProjectLock {
    active: Arc<Mutex<HashSet<String>>>,
    project_id: String,
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        self.active.lock().remove(&self.project_id);
    }
}

/// An op that has been recorded and published; awaiting its result.
pub(crate) struct BegunOp {
    pub(crate) op_id: String,
    project_id: String,
    kind: OpKind,
    rx: oneshot::Receiver<WorkerResultMsg>,
    _lock: ProjectLock,
}

/// The engine facade: everything the API layer calls.
pub struct Platform<C: Clock, G: IdGen> {
    pub(crate) store: Store<C>,
    pub(crate) hub: EventHub<C>,
    pub(crate) waiters: WaiterHub,
    pub(crate) book: Bookkeeper<C>,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) artifacts: ArtifactStore,
    pub(crate) git: Arc<dyn GitClient>,
    pub(crate) ledger: CiCommitLedger,
    pub(crate) clock: C,
    pub(crate) idgen: G,
    pub(crate) config: EngineConfig,
    active: Arc<Mutex<HashSet<String>>>,
    /// Process-wide CI trigger lock (hook and watcher funnel through it)
    pub(crate) ci_mu: Arc<tokio::sync::Mutex<()>>,
}

impl<C: Clock, G: IdGen> Clone for Platform<C, G> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            hub: self.hub.clone(),
            waiters: self.waiters.clone(),
            book: self.book.clone(),
            broker: Arc::clone(&self.broker),
            artifacts: self.artifacts.clone(),
            git: Arc::clone(&self.git),
            ledger: self.ledger.clone(),
            clock: self.clock.clone(),
            idgen: self.idgen.clone(),
            config: self.config.clone(),
            active: Arc::clone(&self.active),
            ci_mu: Arc::clone(&self.ci_mu),
        }
    }
}

impl<C: Clock, G: IdGen> Platform<C, G> {
    pub fn new(
        broker: Arc<dyn Broker>,
        store: Store<C>,
        artifacts: ArtifactStore,
        git: Arc<dyn GitClient>,
        clock: C,
        idgen: G,
        config: EngineConfig,
    ) -> Self {
        let hub = EventHub::new(clock.clone(), config.event_ring, config.event_ttl);
        let book = Bookkeeper::new(store.clone(), hub.clone(), clock.clone());
        let ledger = CiCommitLedger::new(artifacts.clone());
        Self {
            store,
            hub,
            waiters: WaiterHub::new(),
            book,
            broker,
            artifacts,
            git,
            ledger,
            clock,
            idgen,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
            ci_mu: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn git(&self) -> &Arc<dyn GitClient> {
        &self.git
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of a project's CI commit dedupe state.
    pub fn ci_state(
        &self,
        project_id: &str,
    ) -> Result<berth_storage::CiCommitState, EngineError> {
        Ok(self.ledger.load(project_id)?)
    }

    // ── Worker + finalizer startup ──────────────────────────────────────────

    /// Spawn the worker chain and the finalizer consumers.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let runtime = WorkerRuntime::new(
            Arc::clone(&self.broker),
            self.book.clone(),
            WorkerContext {
                store: self.store.clone(),
                artifacts: self.artifacts.clone(),
                git: Arc::clone(&self.git),
                clock: self.clock.clone(),
            },
            self.config.clone(),
        );

        let mut handles = Vec::new();
        handles.push(spawn_worker(
            runtime.clone(),
            Register,
            SUBJECT_OP_START,
            SUBJECT_REGISTRATION_DONE,
        ));
        handles.push(spawn_worker(
            runtime.clone(),
            BootstrapRepos,
            SUBJECT_REGISTRATION_DONE,
            SUBJECT_BOOTSTRAP_DONE,
        ));
        handles.push(spawn_worker(
            runtime.clone(),
            BuildImage,
            SUBJECT_BOOTSTRAP_DONE,
            SUBJECT_BUILD_DONE,
        ));
        handles.push(spawn_worker(
            runtime.clone(),
            RenderManifests,
            SUBJECT_BUILD_DONE,
            SUBJECT_DEPLOY_DONE,
        ));
        handles.push(spawn_worker(
            runtime.clone(),
            RenderManifests,
            SUBJECT_DEPLOYMENT_START,
            SUBJECT_DEPLOYMENT_RENDERED,
        ));
        handles.push(spawn_worker(
            runtime.clone(),
            Deployer,
            SUBJECT_DEPLOYMENT_RENDERED,
            SUBJECT_DEPLOYMENT_DONE,
        ));
        handles.push(spawn_worker(
            runtime.clone(),
            RenderManifests,
            SUBJECT_PROMOTION_START,
            SUBJECT_PROMOTION_RENDERED,
        ));
        handles.push(spawn_worker(
            runtime,
            Promoter,
            SUBJECT_PROMOTION_RENDERED,
            SUBJECT_PROMOTION_DONE,
        ));

        for subject in [
            SUBJECT_DEPLOY_DONE,
            SUBJECT_DEPLOYMENT_DONE,
            SUBJECT_PROMOTION_DONE,
        ] {
            let platform = self.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = platform.run_finalizer(subject).await {
                    error!(subject, error = %e, "finalizer exited");
                }
            }));
        }
        handles
    }

    /// Consume a terminal subject: settle records, notify the waiter.
    async fn run_finalizer(&self, subject: &'static str) -> Result<(), EngineError> {
        let mut config = ConsumerConfig::new(format!("finalizer-{}", subject));
        config.max_deliver = self.config.max_deliver;
        config.ack_wait = self.config.ack_wait;
        let mut sub = self
            .broker
            .pull_subscribe(subject, config)
            .await
            .map_err(|e| EngineError::Internal(format!("subscribe {}: {}", subject, e)))?;

        while let Some(delivery) = sub.next().await {
            let result: WorkerResultMsg = match serde_json::from_slice(&delivery.payload) {
                Ok(result) => result,
                Err(e) => {
                    error!(subject, error = %e, "undecodable final result; terminating");
                    delivery.term().await;
                    continue;
                }
            };

            let successful = result.op.err.is_empty();
            let (status, err_msg) = if successful {
                (OpStatus::Done, String::new())
            } else {
                (OpStatus::Error, result.op.err.clone())
            };
            if let Err(e) = self
                .book
                .finalize_op(
                    &result.op.op_id,
                    &result.op.project_id,
                    result.op.kind,
                    status,
                    &err_msg,
                )
                .await
            {
                warn!(op_id = %result.op.op_id, error = %e, "finalize bookkeeping failed");
            }

            // CI ledger settlement is best-effort; the op outcome stands
            // regardless
            if result.op.kind == OpKind::Ci {
                if let Err(e) = self.ledger.finalize_source_commit_pending_op(
                    &result.op.project_id,
                    &result.op.op_id,
                    successful,
                ) {
                    warn!(op_id = %result.op.op_id, error = %e, "ci ledger finalize failed");
                }
            }

            let op_id = result.op.op_id.clone();
            self.waiters.deliver(&op_id, result);
            delivery.ack().await;
        }
        Ok(())
    }

    // ── Project CRUD surface ────────────────────────────────────────────────

    /// Validate, record, and run the create pipeline for a new project.
    pub async fn create_project(
        &self,
        spec: ProjectSpec,
    ) -> Result<(Project, EnqueueOutcome), EngineError> {
        let spec = spec.normalize();
        spec.validate()?;
        let id = ProjectId::new(self.idgen.next());
        let project = Project::new(id.clone(), spec.clone(), self.clock.epoch_ms());
        let project = self.store.put_project(project).await?;
        let outcome = self
            .enqueue_op(OpKind::Create, id.as_str(), Some(spec), RunOptions::default())
            .await?;
        Ok((project, outcome))
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        spec: ProjectSpec,
    ) -> Result<EnqueueOutcome, EngineError> {
        let spec = spec.normalize();
        spec.validate()?;
        let mut project = self.store.get_project(project_id).await?;
        project.spec = spec.clone();
        self.store.put_project(project).await?;
        self.enqueue_op(OpKind::Update, project_id, Some(spec), RunOptions::default())
            .await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<EnqueueOutcome, EngineError> {
        let project = self.store.get_project(project_id).await?;
        self.enqueue_op(
            OpKind::Delete,
            project_id,
            Some(project.spec),
            RunOptions::default(),
        )
        .await
    }

    /// Run a deploy/promote/release against a project.
    pub async fn trigger_delivery(
        &self,
        project_id: &str,
        kind: OpKind,
        opts: RunOptions,
    ) -> Result<EnqueueOutcome, EngineError> {
        if !kind.is_delivery() {
            return Err(EngineError::Internal(format!(
                "{} is not a delivery kind",
                kind
            )));
        }
        let project = self.store.get_project(project_id).await?;
        for env in [&opts.deploy_env, &opts.from_env, &opts.to_env]
            .into_iter()
            .flatten()
        {
            if !project.spec.environments.contains_key(env) {
                return Err(ValidationError::UnknownEnvironment(env.clone()).into());
            }
        }
        self.enqueue_op(kind, project_id, None, opts).await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project, EngineError> {
        Ok(self.store.get_project(project_id).await?)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, EngineError> {
        Ok(self.store.list_projects().await?)
    }

    pub async fn get_op(&self, op_id: &str) -> Result<Operation, EngineError> {
        Ok(self.store.get_op(op_id).await?)
    }

    // ── Event surface ───────────────────────────────────────────────────────

    /// Replay + live events for an op.
    ///
    /// Subscribers whose Last-Event-ID fell behind the retained window
    /// (or who arrive after the stream was swept) get one synthetic
    /// bootstrap event reconstructed from the stored op.
    pub async fn subscribe_op_events(
        &self,
        op_id: &str,
        last_event_id: Option<u64>,
    ) -> Result<EventStream, EngineError> {
        let mut stream = self.hub.subscribe(op_id, last_event_id);
        if stream.needs_bootstrap || stream.replay.is_empty() {
            let op = self.store.get_op(op_id).await?;
            if stream.needs_bootstrap || op.is_terminal() {
                stream.replay = vec![self.book.new_op_bootstrap_snapshot(&op)];
                stream.needs_bootstrap = true;
            }
        }
        Ok(stream)
    }

    // ── Orchestration core ──────────────────────────────────────────────────

    /// Run one operation end to end, serialized per project.
    pub async fn enqueue_op(
        &self,
        kind: OpKind,
        project_id: &str,
        spec: Option<ProjectSpec>,
        opts: RunOptions,
    ) -> Result<EnqueueOutcome, EngineError> {
        let lock = self.try_lock_project(project_id)?;
        let begun = self
            .begin_op(lock, kind, project_id, spec, opts, "queued")
            .await?;
        self.await_result(begun).await
    }

    pub(crate) fn try_lock_project(&self, project_id: &str) -> Result<ProjectLock, EngineError> {
        let mut active = self.active.lock();
        if !active.insert(project_id.to_string()) {
            return Err(EngineError::Conflict(project_id.to_string()));
        }
        Ok(ProjectLock {
            active: Arc::clone(&self.active),
            project_id: project_id.to_string(),
        })
    }

    /// Create records, register the waiter, publish the start message.
    pub(crate) async fn begin_op(
        &self,
        lock: ProjectLock,
        kind: OpKind,
        project_id: &str,
        spec: Option<ProjectSpec>,
        opts: RunOptions,
        queued_message: &str,
    ) -> Result<BegunOp, EngineError> {
        let op_id = self.idgen.next();
        let delivery = delivery_for(kind, &opts)?;
        let mut op = Operation::new(
            OpId::new(op_id.clone()),
            project_id,
            kind,
            self.clock.epoch_ms(),
        );
        if let Some(d) = delivery.clone() {
            op = op.with_delivery(d);
        }
        self.store.put_op(&op).await?;
        self.book.emit_queued(&op, queued_message);

        if kind == OpKind::Delete {
            // Flips the project into Deleting
            self.book
                .finalize_op(&op_id, project_id, kind, OpStatus::Running, "")
                .await?;
        } else {
            let mut project = self.store.get_project(project_id).await?;
            project.status.phase = ProjectPhase::Reconciling;
            project.status.last_op_id = op_id.clone();
            project.status.last_op_kind = Some(kind);
            project.status.message = queued_message.to_string();
            self.store.put_project(project).await?;
        }

        let rx = self.waiters.register(&op_id);
        let msg = ProjectOpMsg {
            op_id: op_id.clone(),
            kind,
            project_id: project_id.to_string(),
            spec,
            deploy_env: opts.deploy_env,
            from_env: opts.from_env,
            to_env: opts.to_env,
            delivery,
            err: String::new(),
            at: self.clock.epoch_ms(),
        };
        let bytes = serde_json::to_vec(&msg)
            .map_err(|e| EngineError::Internal(format!("start message encode: {}", e)))?;
        if let Err(e) = self.broker.publish(start_subject(kind), bytes).await {
            self.waiters.unregister(&op_id);
            let _ = self
                .book
                .finalize_op(
                    &op_id,
                    project_id,
                    kind,
                    OpStatus::Error,
                    &format!("publish failed: {}", e),
                )
                .await;
            return Err(EngineError::Publish(e.to_string()));
        }

        Ok(BegunOp {
            op_id,
            project_id: project_id.to_string(),
            kind,
            rx,
            _lock: lock,
        })
    }

    /// Wait for the final result with the API timeout; finalize on
    /// timeout. The per-project lock is held until this returns.
    pub(crate) async fn await_result(
        &self,
        begun: BegunOp,
    ) -> Result<EnqueueOutcome, EngineError> {
        let BegunOp {
            op_id,
            project_id,
            kind,
            rx,
            _lock,
        } = begun;

        let result = match tokio::time::timeout(self.config.api_wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_closed)) => {
                self.waiters.unregister(&op_id);
                let _ = self
                    .book
                    .finalize_op(&op_id, &project_id, kind, OpStatus::Error, "waiter channel closed")
                    .await;
                return Err(EngineError::Internal("waiter channel closed".to_string()));
            }
            Err(_elapsed) => {
                self.waiters.unregister(&op_id);
                self.book
                    .finalize_op(
                        &op_id,
                        &project_id,
                        kind,
                        OpStatus::Error,
                        "timeout waiting for workers",
                    )
                    .await?;
                return Err(EngineError::Timeout);
            }
        };
        self.waiters.unregister(&op_id);

        if !result.op.err.is_empty() {
            // Normally settled by the finalizer already; keep the call
            // idempotent for direct delivery paths
            let _ = self
                .book
                .finalize_op(&op_id, &project_id, kind, OpStatus::Error, &result.op.err)
                .await;
        }
        let op = self.store.get_op(&op_id).await?;
        Ok(EnqueueOutcome { op, result })
    }
}

/// Delivery block for the op, derived from kind and options.
fn delivery_for(kind: OpKind, opts: &RunOptions) -> Result<Option<Delivery>, EngineError> {
    match kind {
        OpKind::Deploy => {
            let environment = opts
                .deploy_env
                .clone()
                .ok_or(ValidationError::MissingDeliveryTarget)?;
            Ok(Some(Delivery {
                stage: DeliveryStage::Deploy,
                environment: Some(environment),
                from_env: None,
                to_env: None,
            }))
        }
        OpKind::Promote | OpKind::Release => {
            let from_env = opts
                .from_env
                .clone()
                .ok_or(ValidationError::MissingDeliveryTarget)?;
            let to_env = opts
                .to_env
                .clone()
                .ok_or(ValidationError::MissingDeliveryTarget)?;
            let stage = if kind == OpKind::Release {
                DeliveryStage::Release
            } else {
                DeliveryStage::Promote
            };
            Ok(Some(Delivery {
                stage,
                environment: None,
                from_env: Some(from_env),
                to_env: Some(to_env),
            }))
        }
        _ => Ok(None),
    }
}

fn spawn_worker<C, A>(
    runtime: WorkerRuntime<C>,
    action: A,
    inbound: &'static str,
    outbound: &'static str,
) -> JoinHandle<()>
where
    C: Clock,
    A: crate::worker_runtime::WorkerAction<C>,
{
    tokio::spawn(async move {
        if let Err(e) = runtime.run(action, inbound, outbound).await {
            error!(inbound, outbound, error = %e, "worker exited");
        }
    })
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;

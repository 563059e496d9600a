// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subject constants for the pipeline substrate.

use crate::op::OpKind;

/// Pipeline head: consumed by the registrar.
pub const SUBJECT_OP_START: &str = "berth.project.op.start";
/// Registrar output: consumed by the repo bootstrapper.
pub const SUBJECT_REGISTRATION_DONE: &str = "berth.project.op.registration.done";
/// Bootstrap output: consumed by the image builder. CI ops start here.
pub const SUBJECT_BOOTSTRAP_DONE: &str = "berth.project.op.bootstrap.done";
/// Build output: consumed by the manifest renderer.
pub const SUBJECT_BUILD_DONE: &str = "berth.project.op.build.done";
/// Full-chain terminal: consumed by the finalizer.
pub const SUBJECT_DEPLOY_DONE: &str = "berth.project.op.deploy.done";

/// Standalone deployment chain.
pub const SUBJECT_DEPLOYMENT_START: &str = "berth.project.process.deployment.start";
pub const SUBJECT_DEPLOYMENT_RENDERED: &str = "berth.project.process.deployment.rendered";
pub const SUBJECT_DEPLOYMENT_DONE: &str = "berth.project.process.deployment.done";

/// Standalone promotion/release chain.
pub const SUBJECT_PROMOTION_START: &str = "berth.project.process.promotion.start";
pub const SUBJECT_PROMOTION_RENDERED: &str = "berth.project.process.promotion.rendered";
pub const SUBJECT_PROMOTION_DONE: &str = "berth.project.process.promotion.done";

/// Dead-letter subject for deliveries that exhausted their retries.
pub const SUBJECT_OP_POISON: &str = "berth.project.op.poison";

/// Subject an op of the given kind starts on.
///
/// CI skips registration and bootstrap and joins at the build stage.
pub fn start_subject(kind: OpKind) -> &'static str {
    match kind {
        OpKind::Create | OpKind::Update | OpKind::Delete => SUBJECT_OP_START,
        OpKind::Ci => SUBJECT_BOOTSTRAP_DONE,
        OpKind::Deploy => SUBJECT_DEPLOYMENT_START,
        OpKind::Promote | OpKind::Release => SUBJECT_PROMOTION_START,
    }
}

/// Terminal subject the finalizer consumes for ops of the given kind.
pub fn final_subject(kind: OpKind) -> &'static str {
    match kind {
        OpKind::Create | OpKind::Update | OpKind::Delete | OpKind::Ci => SUBJECT_DEPLOY_DONE,
        OpKind::Deploy => SUBJECT_DEPLOYMENT_DONE,
        OpKind::Promote | OpKind::Release => SUBJECT_PROMOTION_DONE,
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete pipeline workers.
//!
//! Full chain: registrar → repo bootstrap → image builder → manifest
//! renderer. Delivery chains reuse the renderer and finish with the
//! deployer or promoter.

mod bootstrap;
mod build;
mod deliver;
mod registrar;
mod render;

pub use bootstrap::BootstrapRepos;
pub use build::{BuildImage, IMAGE_FILE};
pub use deliver::{Deployer, Promoter};
pub use registrar::{Register, REGISTRATION_FILE};
pub use render::{manifest_path, RenderManifests};

use crate::worker_runtime::WorkerContext;
use berth_core::{Clock, ProjectOpMsg, ProjectSpec};

/// Spec carried on the message, falling back to the stored project.
///
/// CI and delivery ops travel without a spec; the stored record is
/// authoritative for them.
pub(crate) async fn resolve_spec<C: Clock>(
    ctx: &WorkerContext<C>,
    msg: &ProjectOpMsg,
) -> Result<ProjectSpec, String> {
    if let Some(spec) = &msg.spec {
        return Ok(spec.clone());
    }
    ctx.store
        .get_project(&msg.project_id)
        .await
        .map(|p| p.spec)
        .map_err(|e| format!("project lookup failed: {}", e))
}

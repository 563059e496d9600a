// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery chain tails: deployer and promoter.

use super::render::{manifest_image, manifest_path};
use crate::worker_runtime::{WorkerAction, WorkerContext, WorkerOutcome};
use berth_core::{Clock, OpKind, ProjectOpMsg, WORKER_DEPLOYER, WORKER_PROMOTER};

pub struct Deployer;

#[async_trait::async_trait]
impl<C: Clock> WorkerAction<C> for Deployer {
    fn name(&self) -> &'static str {
        WORKER_DEPLOYER
    }

    async fn run(
        &self,
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        let env = msg
            .delivery
            .as_ref()
            .and_then(|d| d.environment.clone())
            .or_else(|| msg.deploy_env.clone())
            .ok_or_else(|| "deploy op without target environment".to_string())?;

        let manifest = ctx
            .artifacts
            .read(&msg.project_id, &manifest_path(&env))
            .map_err(|e| format!("manifest read failed: {}", e))?
            .ok_or_else(|| format!("environment {} has no rendered manifests", env))?;
        let image = manifest_image(&manifest).unwrap_or_default();

        let marker = format!("deploy/{}/deployed.txt", env);
        let body = format!("image: {}\ndeployed_at_ms: {}\n", image, ctx.clock.epoch_ms());
        ctx.artifacts
            .write(&msg.project_id, &marker, &body)
            .map_err(|e| format!("deploy marker write failed: {}", e))?;

        Ok(WorkerOutcome::new(format!("deployed to {}", env)).with_artifacts(vec![marker]))
    }
}

pub struct Promoter;

#[async_trait::async_trait]
impl<C: Clock> WorkerAction<C> for Promoter {
    fn name(&self) -> &'static str {
        WORKER_PROMOTER
    }

    async fn run(
        &self,
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        let delivery = msg
            .delivery
            .as_ref()
            .ok_or_else(|| "transition op without delivery block".to_string())?;
        let from = delivery
            .from_env
            .clone()
            .or_else(|| msg.from_env.clone())
            .ok_or_else(|| "transition op without from_env".to_string())?;
        let to = delivery
            .to_env
            .clone()
            .or_else(|| msg.to_env.clone())
            .ok_or_else(|| "transition op without to_env".to_string())?;

        let (dir, verb, marker_name) = if msg.kind == OpKind::Release {
            ("releases", "released", "released.txt")
        } else {
            ("promotions", "promoted", "promoted.txt")
        };

        let rendered = format!("{}/{}-to-{}/rendered.yaml", dir, from, to);
        if !ctx.artifacts.exists(&msg.project_id, &rendered) {
            return Err(format!("no rendered manifests for {} to {}", from, to));
        }

        let marker = format!("{}/{}-to-{}/{}", dir, from, to, marker_name);
        let body = format!("{} {} to {} at_ms: {}\n", verb, from, to, ctx.clock.epoch_ms());
        ctx.artifacts
            .write(&msg.project_id, &marker, &body)
            .map_err(|e| format!("{} marker write failed: {}", verb, e))?;

        Ok(WorkerOutcome::new(format!("{} {} to {}", verb, from, to))
            .with_artifacts(vec![marker]))
    }
}

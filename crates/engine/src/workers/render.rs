// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Renders deployment manifests.
//!
//! For the full chain the renderer writes one manifest per declared
//! environment. For delivery ops it targets the delivery environment:
//! deploys render fresh from the spec, promotes and releases carry the
//! image already live in `from_env` and additionally record the movement
//! under `promotions/` or `releases/`. For deletes the renderer is the
//! final worker and tears the project down.

use super::resolve_spec;
use crate::worker_runtime::{WorkerAction, WorkerContext, WorkerOutcome};
use berth_core::project::Environment;
use berth_core::{Clock, OpKind, ProjectOpMsg, ProjectSpec, WORKER_MANIFEST_RENDERER};

pub struct RenderManifests;

/// Manifest path for an environment, relative to the project dir.
pub fn manifest_path(env: &str) -> String {
    format!("deploy/{}/rendered.yaml", env)
}

/// Rendered manifest body.
pub(crate) fn render_manifest(
    spec: &ProjectSpec,
    env_name: &str,
    environment: &Environment,
    image: &str,
) -> String {
    let mut out = String::new();
    out.push_str("apiVersion: berth.dev/v1\n");
    out.push_str("kind: RenderedDeployment\n");
    out.push_str("metadata:\n");
    out.push_str(&format!("  name: {}\n", spec.name));
    out.push_str(&format!("  environment: {}\n", env_name));
    out.push_str("spec:\n");
    out.push_str(&format!("  runtime: {}\n", spec.runtime));
    out.push_str(&format!("  image: {}\n", image));
    if !spec.capabilities.is_empty() {
        out.push_str(&format!("  capabilities: [{}]\n", spec.capabilities.join(", ")));
    }
    if !environment.vars.is_empty() {
        out.push_str("  env:\n");
        for (name, value) in &environment.vars {
            out.push_str(&format!("    {}: {:?}\n", name, value));
        }
    }
    out.push_str("  networkPolicies:\n");
    out.push_str(&format!("    ingress: {}\n", spec.network_policies.ingress));
    out.push_str(&format!("    egress: {}\n", spec.network_policies.egress));
    out
}

/// Extract the image reference from a rendered manifest.
pub(crate) fn manifest_image(yaml: &str) -> Option<String> {
    yaml.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("image: "))
        .map(str::to_string)
}

impl RenderManifests {
    async fn render_all<C: Clock>(
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        let spec = resolve_spec(ctx, msg).await?;
        let image = ctx
            .artifacts
            .read(&msg.project_id, super::build::IMAGE_FILE)
            .map_err(|e| format!("image read failed: {}", e))?
            .map(|s| s.trim().to_string())
            .ok_or_else(|| "no built image; build must precede render".to_string())?;

        let mut artifacts = Vec::with_capacity(spec.environments.len());
        for (env_name, environment) in &spec.environments {
            let path = manifest_path(env_name);
            let yaml = render_manifest(&spec, env_name, environment, &image);
            ctx.artifacts
                .write(&msg.project_id, &path, &yaml)
                .map_err(|e| format!("manifest write failed: {}", e))?;
            artifacts.push(path);
        }
        Ok(WorkerOutcome::new(format!(
            "manifests rendered for {} environments",
            artifacts.len()
        ))
        .with_artifacts(artifacts))
    }

    async fn render_deploy<C: Clock>(
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        let env_name = delivery_env(msg)?;
        let spec = resolve_spec(ctx, msg).await?;
        let environment = spec
            .environments
            .get(&env_name)
            .ok_or_else(|| format!("unknown environment {}", env_name))?;
        let image = ctx
            .artifacts
            .read(&msg.project_id, super::build::IMAGE_FILE)
            .map_err(|e| format!("image read failed: {}", e))?
            .map(|s| s.trim().to_string())
            .ok_or_else(|| "no built image; run ci before deploying".to_string())?;

        let path = manifest_path(&env_name);
        let yaml = render_manifest(&spec, &env_name, environment, &image);
        ctx.artifacts
            .write(&msg.project_id, &path, &yaml)
            .map_err(|e| format!("manifest write failed: {}", e))?;
        Ok(WorkerOutcome::new(format!("manifests rendered for {}", env_name))
            .with_artifacts(vec![path]))
    }

    async fn render_transition<C: Clock>(
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        let (from_env, to_env) = transition_envs(msg)?;
        let spec = resolve_spec(ctx, msg).await?;
        let environment = spec
            .environments
            .get(&to_env)
            .ok_or_else(|| format!("unknown environment {}", to_env))?;

        // Carry the image that is actually live in the source environment
        let from_manifest = ctx
            .artifacts
            .read(&msg.project_id, &manifest_path(&from_env))
            .map_err(|e| format!("manifest read failed: {}", e))?
            .ok_or_else(|| format!("environment {} has no rendered manifests", from_env))?;
        let image = manifest_image(&from_manifest)
            .ok_or_else(|| format!("manifest for {} has no image", from_env))?;

        let yaml = render_manifest(&spec, &to_env, environment, &image);
        let target = manifest_path(&to_env);
        ctx.artifacts
            .write(&msg.project_id, &target, &yaml)
            .map_err(|e| format!("manifest write failed: {}", e))?;

        let movement_dir = if msg.kind == OpKind::Release {
            "releases"
        } else {
            "promotions"
        };
        let movement = format!("{}/{}-to-{}/rendered.yaml", movement_dir, from_env, to_env);
        ctx.artifacts
            .write(&msg.project_id, &movement, &yaml)
            .map_err(|e| format!("manifest write failed: {}", e))?;

        Ok(WorkerOutcome::new(format!(
            "manifests rendered for {} from {}",
            to_env, from_env
        ))
        .with_artifacts(vec![target, movement]))
    }

    async fn teardown<C: Clock>(
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        ctx.store
            .delete_project(&msg.project_id)
            .await
            .map_err(|e| format!("project record delete failed: {}", e))?;
        ctx.artifacts
            .remove_project(&msg.project_id)
            .map_err(|e| format!("artifact teardown failed: {}", e))?;
        Ok(WorkerOutcome::new("project deleted"))
    }
}

fn delivery_env(msg: &ProjectOpMsg) -> Result<String, String> {
    msg.delivery
        .as_ref()
        .and_then(|d| d.environment.clone())
        .or_else(|| msg.deploy_env.clone())
        .ok_or_else(|| "deploy op without target environment".to_string())
}

fn transition_envs(msg: &ProjectOpMsg) -> Result<(String, String), String> {
    let from = msg
        .delivery
        .as_ref()
        .and_then(|d| d.from_env.clone())
        .or_else(|| msg.from_env.clone())
        .ok_or_else(|| "transition op without from_env".to_string())?;
    let to = msg
        .delivery
        .as_ref()
        .and_then(|d| d.to_env.clone())
        .or_else(|| msg.to_env.clone())
        .ok_or_else(|| "transition op without to_env".to_string())?;
    Ok((from, to))
}

#[async_trait::async_trait]
impl<C: Clock> WorkerAction<C> for RenderManifests {
    fn name(&self) -> &'static str {
        WORKER_MANIFEST_RENDERER
    }

    async fn run(
        &self,
        ctx: &WorkerContext<C>,
        msg: &ProjectOpMsg,
    ) -> Result<WorkerOutcome, String> {
        match msg.kind {
            OpKind::Delete => Self::teardown(ctx, msg).await,
            OpKind::Create | OpKind::Update | OpKind::Ci => Self::render_all(ctx, msg).await,
            OpKind::Deploy => Self::render_deploy(ctx, msg).await,
            OpKind::Promote | OpKind::Release => Self::render_transition(ctx, msg).await,
        }
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;

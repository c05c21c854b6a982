//! Deploy: merge pending work and ship the working copy

use crate::context::StageContext;
use crate::scaffold::scaffold;
use shipwright_agent::adapters::{scrape_deploy_url, Git};
use shipwright_core::{DeployMode, Deployment, EventEmitter, PipelineError, ProgressStep};
use std::time::Duration;

/// Deploy the working copy, provisioning it first when needed
///
/// Pending `shipwright/*` branches are merged into the baseline in both
/// modes. A project with a deployment descriptor is redeployed; one
/// without gets minimal descriptors scaffolded and is provisioned fresh.
///
/// # Errors
/// - [`PipelineError::ExternalProcess`] for a missing or failing deploy tool
///   (classified, e.g. `auth` with a re-authenticate hint)
/// - [`PipelineError::NoDataFound`] when no deploy URL can be found
pub async fn deploy(ctx: &StageContext, events: &EventEmitter) -> Result<Deployment, PipelineError> {
    let tool = ctx.deploy_tool();
    ctx.detector().require(tool.program()).await?;

    let git = ctx.git();
    let merged_branches = merge_pending(ctx, &git, events).await?;

    let (mode, output) = if tool.is_provisioned() {
        events.progress(ProgressStep::Deploying, "Deployment descriptor found, redeploying");
        (DeployMode::Redeploy, tool.redeploy().await?)
    } else {
        events.progress(ProgressStep::Scaffolding, "No deployment descriptor, scaffolding one");
        let written = scaffold(ctx.repo(), &ctx.config().deploy.descriptor).await?;
        if !written.is_empty() {
            events.log(format!("Scaffolded {}", written.join(", ")));
            git.commit_all("shipwright: add deployment descriptors").await?;
        }
        events.progress(ProgressStep::Provisioning, "Provisioning infrastructure and deploying");
        (DeployMode::Fresh, tool.provision_fresh().await?)
    };

    let url = match scrape_deploy_url(&output) {
        Some(url) => url,
        None => tool.endpoint_from_env().await?.ok_or_else(|| {
            PipelineError::NoDataFound("deployment finished but reported no endpoint URL".to_string())
        })?,
    };
    tracing::info!(url = %url, ?mode, merged = merged_branches.len(), "deployed");

    let settle = ctx.config().pipeline.settle_delay_ms;
    if settle > 0 {
        tracing::debug!(settle_ms = settle, "waiting for the deployment to settle");
        tokio::time::sleep(Duration::from_millis(settle)).await;
    }

    Ok(Deployment {
        url,
        mode,
        merged_branches,
    })
}

/// Commit stray edits, return to the baseline and merge every gap branch
///
/// A branch that does not merge cleanly is skipped and logged.
async fn merge_pending(ctx: &StageContext, git: &Git, events: &EventEmitter) -> Result<Vec<String>, PipelineError> {
    let target = &ctx.config().target;

    if git.commit_all("shipwright: commit pending edits").await? {
        events.log("Committed uncommitted edits before deploying");
    }
    git.checkout(&target.baseline_branch).await?;

    let branches = git.branches_with_prefix(&target.branch_prefix).await?;
    if branches.is_empty() {
        return Ok(Vec::new());
    }

    events.progress(
        ProgressStep::Merging,
        format!("Merging {} branch(es) into {}", branches.len(), target.baseline_branch),
    );
    let mut merged = Vec::with_capacity(branches.len());
    for branch in branches {
        match git.merge(&branch).await {
            Ok(()) => merged.push(branch),
            Err(e) => {
                tracing::warn!(branch = %branch, error = %e, "merge skipped");
                events.log(format!("Skipped {branch}: {e}"));
            }
        }
    }
    Ok(merged)
}

//! Dispatch: local code changes, one branch per gap

use crate::context::{release, StageContext};
use crate::prompts;
use crate::workspace::{resolve_within, snapshot};
use shipwright_agent::adapters::Git;
use shipwright_agent::CapabilityProfile;
use shipwright_core::event::StageResult;
use shipwright_core::{
    CodeChangeResult, EventEmitter, GapItem, PipelineError, PipelineEvent, ProgressStep, Tally,
};
use shipwright_parse::extract_file_edits;
use std::path::PathBuf;

/// Branch holding the change for one gap
#[must_use]
pub fn branch_name(prefix: &str, gap: &GapItem) -> String {
    format!("{prefix}gap-{}", gap.id)
}

/// Apply every gap to the working copy, one at a time
///
/// Each gap starts from a clean baseline and ends on its own committed
/// branch. A failing gap yields `success: false` and the working copy is
/// reset before the next one.
pub async fn dispatch(ctx: &StageContext, gaps: &[GapItem], events: &EventEmitter) -> Vec<CodeChangeResult> {
    let git = ctx.git();
    let target = &ctx.config().target;
    let mut results = Vec::with_capacity(gaps.len());

    for gap in gaps {
        let branch = branch_name(&target.branch_prefix, gap);
        let result = match apply_gap(ctx, &git, gap, &branch, events).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(gap_id = %gap.id, error = %e, "code change failed");
                events.log(format!("Gap {}: {e}", gap.id));
                if let Err(reset) = git.reset_to_baseline(&target.remote, &target.baseline_branch).await {
                    tracing::error!(gap_id = %gap.id, error = %reset, "working copy reset failed");
                    events.log(format!("Working copy reset failed after gap {}: {reset}", gap.id));
                }
                CodeChangeResult::failed(gap.id, e.to_string())
            }
        };
        events.emit(PipelineEvent::Result {
            result: StageResult::CodeChange(result.clone()),
        });
        results.push(result);
    }

    let tally = Tally::from_flags(results.iter().map(|r| r.success));
    tracing::info!(total = tally.total, succeeded = tally.passed, failed = tally.failed, "dispatch finished");
    results
}

async fn apply_gap(
    ctx: &StageContext,
    git: &Git,
    gap: &GapItem,
    branch: &str,
    events: &EventEmitter,
) -> Result<CodeChangeResult, PipelineError> {
    let target = &ctx.config().target;

    events.progress(
        ProgressStep::ResettingWorkingCopy,
        format!("Resetting working copy to {}", target.baseline_branch),
    );
    git.reset_to_baseline(&target.remote, &target.baseline_branch).await?;
    git.checkout_new_branch(branch).await?;

    let tracked = git.tracked_files().await?;
    let snap = snapshot(ctx.repo(), &tracked, target.snapshot_limit_bytes).await?;

    events.progress(ProgressStep::GeneratingChanges, format!("Generating changes for gap {}", gap.id));
    let label = format!("dispatch-{}", gap.id);
    let mut session = ctx
        .open_session(&label, CapabilityProfile::CodebaseWrite, prompts::DISPATCH_SYSTEM)
        .await?;
    let prompt = prompts::change_prompt(gap, &snap.render(), snap.truncated);
    let reply = session.send_and_wait(&prompt, ctx.policies().dispatch.timeout()).await;
    release(session).await;
    let reply = reply?;

    let edits = extract_file_edits(&reply.text);
    if edits.is_empty() {
        // The agent may have edited files through its own tools.
        let changed = git.changed_files().await?;
        if changed.is_empty() {
            return Ok(CodeChangeResult::failed(
                gap.id,
                "agent reply contained no file edits and the working copy is unchanged",
            ));
        }
        tracing::info!(gap_id = %gap.id, files = changed.len(), "agent wrote files directly");
        return commit(git, gap, branch, changed, events).await;
    }

    events.progress(ProgressStep::WritingFiles, format!("Writing {} file(s)", edits.len()));
    let resolved = edits
        .iter()
        .map(|edit| resolve_within(ctx.repo(), &edit.path).map(|path| (path, edit)))
        .collect::<Result<Vec<(PathBuf, _)>, _>>()?;
    for (path, edit) in &resolved {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &edit.content).await?;
        tracing::debug!(gap_id = %gap.id, path = %edit.path, bytes = edit.content.len(), "file written");
    }

    let written: Vec<String> = edits.iter().map(|e| e.path.clone()).collect();
    commit(git, gap, branch, written, events).await
}

async fn commit(
    git: &Git,
    gap: &GapItem,
    branch: &str,
    files: Vec<String>,
    events: &EventEmitter,
) -> Result<CodeChangeResult, PipelineError> {
    events.progress(ProgressStep::Committing, format!("Committing gap {} on {branch}", gap.id));
    let message = format!("shipwright: gap {} - {}", gap.id, prompts::issue_title(gap));
    let committed = git.commit_all(&message).await?;
    let summary = if committed {
        events.log(format!("Gap {}: committed {} file(s) on {branch}", gap.id, files.len()));
        format!("Changed {} file(s)", files.len())
    } else {
        events.log(format!("Gap {}: no diff, nothing to commit", gap.id));
        "No changes needed".to_string()
    };
    let files = if committed { files } else { Vec::new() };
    Ok(CodeChangeResult::succeeded(gap.id, summary, files).with_branch(branch))
}

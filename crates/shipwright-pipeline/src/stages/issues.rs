//! File Issues: one tracker issue per gap, handed to a coding agent

use crate::context::StageContext;
use crate::prompts;
use shipwright_agent::adapters::{IssueDraft, IssueTracker};
use shipwright_core::{EventEmitter, GapItem, PipelineEvent, ProgressStep, Tally, WorkItem};

/// File every gap, one at a time
///
/// A failed creation or assignment is recorded on its work item and never
/// stops the batch.
pub async fn file_issues(ctx: &StageContext, gaps: &[GapItem], events: &EventEmitter) -> Vec<WorkItem> {
    let tracker = ctx.issues();
    let mut items = Vec::with_capacity(gaps.len());

    for gap in gaps {
        events.progress(ProgressStep::FilingIssues, format!("Filing issue for gap {}", gap.id));
        let item = file_one(&tracker, gap, events).await;
        events.emit(PipelineEvent::Issue { issue: item.clone() });
        items.push(item);
    }

    let tally = Tally::from_flags(items.iter().map(|i| i.error.is_none()));
    tracing::info!(total = tally.total, filed = tally.passed, failed = tally.failed, "issues filed");
    items
}

async fn file_one(tracker: &IssueTracker, gap: &GapItem, events: &EventEmitter) -> WorkItem {
    let draft = IssueDraft {
        title: prompts::issue_title(gap),
        body: prompts::issue_body(gap),
        labels: vec![gap.complexity.label().to_string()],
    };
    let mut item = WorkItem {
        gap_id: gap.id,
        title: draft.title.clone(),
        number: None,
        url: None,
        assigned: false,
        error: None,
    };

    let created = match tracker.create(&draft).await {
        Ok(created) => created,
        Err(e) => {
            tracing::warn!(gap_id = %gap.id, error = %e, "issue creation failed");
            item.error = Some(e.to_string());
            return item;
        }
    };
    item.number = Some(created.number);
    item.url = Some(created.url);

    if let Some(assignee) = tracker.assignee() {
        events.progress(
            ProgressStep::AssigningAgents,
            format!("Assigning issue #{} to {assignee}", created.number),
        );
        match tracker.assign(created.number, assignee).await {
            Ok(()) => item.assigned = true,
            Err(e) => {
                tracing::warn!(gap_id = %gap.id, number = created.number, error = %e, "assignment failed");
                item.error = Some(format!("issue created but assignment failed: {e}"));
            }
        }
    }
    item
}

//! Agent instructions and prompt builders

use shipwright_core::{GapItem, Requirement};
use std::fmt::Write;

pub const MEETING_SYSTEM: &str = "You retrieve meeting notes and transcripts through the meeting tools \
and turn them into concrete, independently testable product requirements. \
Answer with JSON only.";

pub const ANALYZE_SYSTEM: &str = "You are a senior engineer reviewing a codebase against one requirement. \
Read the repository before answering. Be specific about files and components. \
Answer with a single JSON object only.";

pub const DISPATCH_SYSTEM: &str = "You implement one change in a local working copy. \
Return the complete new content of every file you touch; never return diffs or partial files.";

pub const ADJUDICATOR_SYSTEM: &str = "You are a strict acceptance tester. You judge one requirement \
against browser evidence collected from the live deployment. You never assume that something \
works because it probably does: every claim must be backed by a fact in the evidence.";

#[must_use]
pub fn meeting_prompt(scope: &str) -> String {
    format!(
        "Find the most recent meeting matching: {scope}\n\
         Read its notes or transcript and reply with one JSON object:\n\
         {{\"title\": \"...\", \"date\": \"...\", \"participants\": [\"...\"], \
         \"summary\": \"...\", \"requirements\": [\"...\"]}}\n\
         Each requirement is one actionable change to the product, phrased so it can be verified."
    )
}

#[must_use]
pub fn meeting_retry_prompt(scope: &str) -> String {
    format!(
        "No requirements were found. Search more broadly for: {scope}\n\
         Include meetings from the last 30 days, chat threads attached to them, and action items \
         or decisions even if they were not called requirements. \
         Reply with the same JSON object shape, or a JSON array of requirement strings."
    )
}

#[must_use]
pub fn gap_prompt(requirement: &Requirement, repo_slug: Option<&str>) -> String {
    let repo = repo_slug.map_or_else(|| "the repository in your working directory".to_string(), |s| format!("the repository {s}"));
    format!(
        "Compare this requirement with {repo}:\n\n\
         Requirement {id}: {text}\n\n\
         Reply with one JSON object:\n\
         {{\"currentState\": \"what exists today\", \"gap\": \"what is missing\", \
         \"complexity\": \"Low|Medium|High|Critical\", \"estimatedEffort\": \"e.g. 2 hours\", \
         \"details\": \"implementation notes: files, components, approach\"}}",
        id = requirement.gap_id(),
        text = requirement.text,
    )
}

#[must_use]
pub fn change_prompt(gap: &GapItem, snapshot: &str, truncated: bool) -> String {
    let mut prompt = format!(
        "Implement this change in the working copy.\n\n\
         Requirement: {}\n\
         Current state: {}\n\
         Gap: {}\n\
         Implementation notes: {}\n\n",
        gap.requirement, gap.current_state, gap.gap, gap.details
    );
    prompt.push_str("Existing source files:\n\n");
    prompt.push_str(snapshot);
    if truncated {
        prompt.push_str("\n(Some files were omitted to keep this message short; read them if you need them.)\n");
    }
    prompt.push_str(
        "\nFor every file you create or change, reply with its full content in this form:\n\n\
         FILE: relative/path.ext\n```\n<complete file content>\n```\n\n\
         Paths are relative to the repository root.",
    );
    prompt
}

#[must_use]
pub fn adjudicate_prompt(requirement: &Requirement, url: &str, evidence: &str) -> String {
    format!(
        "Deployed site: {url}\n\
         Requirement {index}: {text}\n\n\
         Break the requirement into independently checkable claims. \
         Check each claim against the evidence below and cite the exact field you relied on. \
         If any claim fails, or the evidence does not show it, the requirement fails.\n\n\
         Reply with one JSON object:\n\
         {{\"claims\": [{{\"claim\": \"...\", \"passed\": true, \"evidence\": \"...\"}}], \
         \"passed\": false, \"details\": \"short verdict citing evidence\"}}\n\n\
         Evidence (JSON):\n{evidence}",
        index = requirement.index,
        text = requirement.text,
    )
}

#[must_use]
pub fn issue_title(gap: &GapItem) -> String {
    let mut title: String = gap.requirement.chars().take(120).collect();
    if gap.requirement.chars().count() > 120 {
        title.push_str("...");
    }
    title
}

#[must_use]
pub fn issue_body(gap: &GapItem) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "## Requirement\n\n{}\n", gap.requirement);
    let _ = writeln!(body, "## Current state\n\n{}\n", gap.current_state);
    let _ = writeln!(body, "## Gap\n\n{}\n", gap.gap);
    if !gap.details.trim().is_empty() {
        let _ = writeln!(body, "## Implementation notes\n\n{}\n", gap.details);
    }
    let _ = writeln!(
        body,
        "Complexity: **{}** | Estimated effort: {}\n\n_Gap {} filed by shipwright._",
        gap.complexity, gap.estimated_effort, gap.id
    );
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_prompt_carries_identity() {
        let req = Requirement::new(2, "Add dark mode");
        let prompt = gap_prompt(&req, Some("acme/site"));
        assert!(prompt.contains("Requirement 3: Add dark mode"));
        assert!(prompt.contains("acme/site"));
    }

    #[test]
    fn issue_body_sections() {
        let req = Requirement::new(0, "Add a privacy page");
        let gap = GapItem::degraded(&req, "timeout");
        let body = issue_body(&gap);
        assert!(body.contains("## Requirement\n\nAdd a privacy page"));
        assert!(body.contains("Complexity: **Medium**"));
        assert!(!body.contains("Implementation notes"));
    }

    #[test]
    fn long_titles_are_cut() {
        let req = Requirement::new(0, "x".repeat(300));
        let gap = GapItem::degraded(&req, "e");
        assert_eq!(issue_title(&gap).chars().count(), 123);
    }
}

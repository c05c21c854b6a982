//! Pipeline state
//!
//! One owned value carrying the current stage and everything accumulated so
//! far. Stages receive the previous value and hand back a new one; a new
//! Extract replaces the whole value.

use crate::types::{
    CodeChangeResult, Deployment, GapId, GapItem, MeetingInfo, Requirement, RunId, Tally,
    ValidationResult, WorkItem,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Nothing has run yet
    #[default]
    Idle,
    /// Requirement extraction from the meeting source
    Extract,
    /// Per-requirement gap analysis
    Analyze,
    /// Issue filing and coding-agent assignment
    FileIssues,
    /// Local code changes per gap
    Dispatch,
    /// Deployment
    Deploy,
    /// Evidence collection and adjudication
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Extract => "extract",
            Self::Analyze => "analyze",
            Self::FileIssues => "file-issues",
            Self::Dispatch => "dispatch",
            Self::Deploy => "deploy",
            Self::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// Current stage and accumulated results of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    /// Run identifier
    pub run_id: RunId,
    /// When the run's Extract started
    pub started_at: DateTime<Utc>,
    /// Last stage that completed
    pub stage: Stage,
    /// Meeting metadata
    pub meeting: Option<MeetingInfo>,
    /// Extracted requirements
    pub requirements: Vec<Requirement>,
    /// Gap analysis results
    pub gaps: Vec<GapItem>,
    /// Filed work items
    pub work_items: Vec<WorkItem>,
    /// Dispatch results
    pub results: Vec<CodeChangeResult>,
    /// Deployment, once deployed
    pub deployment: Option<Deployment>,
    /// Validation verdicts
    pub verdicts: Vec<ValidationResult>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            stage: Stage::Idle,
            meeting: None,
            requirements: Vec::new(),
            gaps: Vec::new(),
            work_items: Vec::new(),
            results: Vec::new(),
            deployment: None,
            verdicts: Vec::new(),
        }
    }
}

impl PipelineState {
    /// Fresh run state after a successful Extract
    #[must_use]
    pub fn fresh(meeting: MeetingInfo, requirements: Vec<Requirement>) -> Self {
        Self {
            stage: Stage::Extract,
            meeting: Some(meeting),
            requirements,
            ..Self::default()
        }
    }

    /// State with gap analysis results
    #[must_use]
    pub fn with_gaps(self, mut gaps: Vec<GapItem>) -> Self {
        gaps.sort_by_key(|g| g.id);
        Self {
            stage: Stage::Analyze,
            gaps,
            ..self
        }
    }

    /// State with filed work items
    #[must_use]
    pub fn with_work_items(self, work_items: Vec<WorkItem>) -> Self {
        Self {
            stage: Stage::FileIssues,
            work_items,
            ..self
        }
    }

    /// State with dispatch results
    #[must_use]
    pub fn with_results(self, results: Vec<CodeChangeResult>) -> Self {
        Self {
            stage: Stage::Dispatch,
            results,
            ..self
        }
    }

    /// State with a deployment
    #[must_use]
    pub fn with_deployment(self, deployment: Deployment) -> Self {
        Self {
            stage: Stage::Deploy,
            deployment: Some(deployment),
            ..self
        }
    }

    /// State with validation verdicts
    #[must_use]
    pub fn with_verdicts(self, mut verdicts: Vec<ValidationResult>) -> Self {
        verdicts.sort_by_key(|v| v.requirement_index);
        Self {
            stage: Stage::Validate,
            verdicts,
            ..self
        }
    }

    /// Requirement by index
    #[inline]
    #[must_use]
    pub fn requirement(&self, index: usize) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.index == index)
    }

    /// Gap by id
    #[inline]
    #[must_use]
    pub fn gap(&self, id: GapId) -> Option<&GapItem> {
        self.gaps.iter().find(|g| g.id == id)
    }

    /// Requirements restricted to a selection of indices
    ///
    /// An empty selection means "all".
    #[must_use]
    pub fn selected_requirements(&self, indices: &[usize]) -> Vec<Requirement> {
        if indices.is_empty() {
            return self.requirements.clone();
        }
        self.requirements
            .iter()
            .filter(|r| indices.contains(&r.index))
            .cloned()
            .collect()
    }

    /// Dispatch tally
    #[must_use]
    pub fn dispatch_tally(&self) -> Tally {
        Tally::from_flags(self.results.iter().map(|r| r.success))
    }

    /// Validation tally
    #[must_use]
    pub fn verdict_tally(&self) -> Tally {
        Tally::from_flags(self.verdicts.iter().map(|v| v.passed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerdictSource;
    use pretty_assertions::assert_eq;

    fn sample() -> PipelineState {
        PipelineState::fresh(
            MeetingInfo::default(),
            Requirement::from_texts(["Add contact form", "Add privacy page", "Dark mode"]),
        )
    }

    #[test]
    fn fresh_state_replaces_everything() {
        let first = sample();
        let second = sample();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(second.stage, Stage::Extract);
        assert!(second.gaps.is_empty());
    }

    #[test]
    fn gaps_are_ordered_by_id() {
        let state = sample();
        let reqs = state.requirements.clone();
        let gaps = vec![
            GapItem::degraded(&reqs[2], "x"),
            GapItem::degraded(&reqs[0], "x"),
            GapItem::degraded(&reqs[1], "x"),
        ];
        let state = state.with_gaps(gaps);
        let ids: Vec<_> = state.gaps.iter().map(|g| g.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(state.stage, Stage::Analyze);
    }

    #[test]
    fn selection_defaults_to_all() {
        let state = sample();
        assert_eq!(state.selected_requirements(&[]).len(), 3);
        let picked = state.selected_requirements(&[2]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].text, "Dark mode");
    }

    #[test]
    fn verdict_tally_reconciles() {
        let state = sample();
        let reqs = state.requirements.clone();
        let verdicts = vec![
            ValidationResult::adjudicated(&reqs[1], true, "ok"),
            ValidationResult::fail(&reqs[0], "missing", VerdictSource::PreCheck),
        ];
        let state = state.with_verdicts(verdicts);
        let tally = state.verdict_tally();
        assert_eq!(tally.total, 2);
        assert_eq!(tally.passed, 1);
        assert_eq!(state.verdicts[0].requirement_index, 0);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::FileIssues.to_string(), "file-issues");
    }
}

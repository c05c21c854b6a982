//! Core data model
//!
//! Every entity that flows between pipeline stages:
//! - Requirements extracted from a meeting
//! - Gap items produced by codebase analysis
//! - Work items, code-change results and deployments
//! - Validation verdicts
//!
//! Cross-stage joins always go through [`Requirement::index`] / [`GapId`],
//! never through requirement text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique pipeline run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One actionable item extracted from a meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Zero-based ordinal, the stable identity across stages
    pub index: usize,
    /// Requirement text
    pub text: String,
}

impl Requirement {
    /// Create new requirement
    #[inline]
    #[must_use]
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Gap id derived from this requirement
    #[inline]
    #[must_use]
    pub fn gap_id(&self) -> GapId {
        GapId::for_requirement(self.index)
    }

    /// Build an indexed list from plain strings
    #[must_use]
    pub fn from_texts<I, S>(texts: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| Self::new(index, text))
            .collect()
    }
}

/// Gap identifier (requirement index + 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GapId(pub usize);

impl GapId {
    /// Gap id for a zero-based requirement index
    #[inline]
    #[must_use]
    pub fn for_requirement(index: usize) -> Self {
        Self(index + 1)
    }

    /// Zero-based requirement index this gap refers to
    #[inline]
    #[must_use]
    pub fn requirement_index(self) -> usize {
        self.0.saturating_sub(1)
    }
}

impl fmt::Display for GapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gap complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Complexity {
    /// Small, isolated change
    Low,
    /// Default when unknown
    #[default]
    Medium,
    /// Cross-cutting change
    High,
    /// Architectural change
    Critical,
}

impl Complexity {
    /// Lowercase label used for issue labels
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Lenient parse; unknown values map to `Medium`
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "simple" | "trivial" => Ok(Self::Low),
            "medium" | "moderate" => Ok(Self::Medium),
            "high" | "complex" => Ok(Self::High),
            "critical" | "very high" => Ok(Self::Critical),
            other => Err(format!("unknown complexity: {other}")),
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        };
        f.write_str(name)
    }
}

/// Comparison of one requirement against the target codebase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapItem {
    /// Requirement index + 1
    pub id: GapId,
    /// Requirement text (may be truncated, never used as a join key)
    pub requirement: String,
    /// What the codebase does today
    pub current_state: String,
    /// What is missing
    pub gap: String,
    /// Complexity estimate
    pub complexity: Complexity,
    /// Free-form effort estimate
    pub estimated_effort: String,
    /// Implementation notes
    pub details: String,
}

impl GapItem {
    /// Degraded gap produced when analysis of one requirement fails
    #[must_use]
    pub fn degraded(requirement: &Requirement, error: impl fmt::Display) -> Self {
        Self {
            id: requirement.gap_id(),
            requirement: requirement.text.clone(),
            current_state: "Unknown".to_string(),
            gap: format!("Analysis failed: {error}"),
            complexity: Complexity::Medium,
            estimated_effort: "TBD".to_string(),
            details: String::new(),
        }
    }

    /// Whether this gap came from a failed analysis
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.estimated_effort == "TBD" && self.gap.starts_with("Analysis failed:")
    }
}

/// Tracked work item filed for one gap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Gap this item tracks
    pub gap_id: GapId,
    /// Issue title
    pub title: String,
    /// Tracker number, when creation succeeded
    pub number: Option<u64>,
    /// Tracker URL, when creation succeeded
    pub url: Option<String>,
    /// Whether a coding agent accepted the assignment
    pub assigned: bool,
    /// Failure message, when creation or assignment failed
    pub error: Option<String>,
}

impl WorkItem {
    /// Whether the issue exists in the tracker
    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.url.is_some()
    }
}

/// Outcome of dispatching one gap to a coding agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChangeResult {
    /// Gap this result belongs to
    pub gap_id: GapId,
    /// Whether the change landed (a no-op counts as success)
    pub success: bool,
    /// Human-readable summary
    pub summary: String,
    /// Touched file paths, relative to the working copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<Vec<String>>,
    /// Local branch holding the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl CodeChangeResult {
    /// Successful result
    #[must_use]
    pub fn succeeded(gap_id: GapId, summary: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            gap_id,
            success: true,
            summary: summary.into(),
            files_changed: Some(files),
            branch: None,
        }
    }

    /// Failed result
    #[must_use]
    pub fn failed(gap_id: GapId, summary: impl Into<String>) -> Self {
        Self {
            gap_id,
            success: false,
            summary: summary.into(),
            files_changed: None,
            branch: None,
        }
    }

    /// With branch name
    #[inline]
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// How a deployment was performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeployMode {
    /// Descriptors scaffolded and infrastructure provisioned
    Fresh,
    /// Existing descriptor found, code redeployed
    Redeploy,
}

/// Outcome of the deploy stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Live URL
    pub url: String,
    /// Fresh or redeploy
    pub mode: DeployMode,
    /// Feature branches merged into the baseline before deploying
    pub merged_branches: Vec<String>,
}

/// Where a validation verdict came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerdictSource {
    /// Deterministic pre-check, adjudicator skipped
    PreCheck,
    /// Per-requirement adjudicator session
    Adjudicator,
    /// The judge itself failed; treated as a failing verdict
    Failure,
}

/// Verdict for one requirement against a deployed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Zero-based requirement index
    pub requirement_index: usize,
    /// Requirement text
    pub requirement: String,
    /// Verdict
    pub passed: bool,
    /// Evidence citations
    pub details: String,
    /// Verdict origin
    pub source: VerdictSource,
}

impl ValidationResult {
    /// Failing verdict
    #[must_use]
    pub fn fail(requirement: &Requirement, details: impl Into<String>, source: VerdictSource) -> Self {
        Self {
            requirement_index: requirement.index,
            requirement: requirement.text.clone(),
            passed: false,
            details: details.into(),
            source,
        }
    }

    /// Adjudicated verdict
    #[must_use]
    pub fn adjudicated(requirement: &Requirement, passed: bool, details: impl Into<String>) -> Self {
        Self {
            requirement_index: requirement.index,
            requirement: requirement.text.clone(),
            passed,
            details: details.into(),
            source: VerdictSource::Adjudicator,
        }
    }
}

/// Meeting metadata recovered during extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MeetingInfo {
    /// Meeting title
    pub title: String,
    /// Meeting date as reported by the source
    pub date: String,
    /// Participant names
    pub participants: Vec<String>,
    /// Short summary
    pub summary: String,
}

/// Pass/fail tally that always reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    /// Items processed
    pub total: usize,
    /// Items that passed / succeeded
    pub passed: usize,
    /// Items that failed
    pub failed: usize,
}

impl Tally {
    /// Count booleans
    #[must_use]
    pub fn from_flags<I: IntoIterator<Item = bool>>(flags: I) -> Self {
        flags.into_iter().fold(Self::default(), |mut acc, ok| {
            acc.total += 1;
            if ok {
                acc.passed += 1;
            } else {
                acc.failed += 1;
            }
            acc
        })
    }
}

//! Issue-tracker adapter (`gh issue ...`)

use crate::process::{ProcessRunner, ProcessSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use shipwright_core::config::IssueSettings;
use shipwright_core::PipelineError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

static ISSUE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+/issues/(\d+)").expect("valid regex"));

/// Issue as created by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIssue {
    /// Issue number
    pub number: u64,
    /// Web URL
    pub url: String,
}

/// New issue contents
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IssueDraft {
    /// Title
    pub title: String,
    /// Markdown body
    pub body: String,
    /// Labels beyond the configured defaults
    pub labels: Vec<String>,
}

/// Typed wrapper over the issue-tracker CLI
#[derive(Clone)]
pub struct IssueTracker {
    runner: Arc<dyn ProcessRunner>,
    settings: IssueSettings,
    repo_slug: Option<String>,
    cwd: PathBuf,
    timeout: Duration,
}

impl std::fmt::Debug for IssueTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueTracker")
            .field("program", &self.settings.program)
            .field("repo", &self.repo_slug)
            .finish()
    }
}

impl IssueTracker {
    /// Create adapter
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: IssueSettings, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            settings,
            repo_slug: None,
            cwd: cwd.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Target an explicit `owner/name` repository
    #[inline]
    #[must_use]
    pub fn with_repo(mut self, slug: Option<String>) -> Self {
        self.repo_slug = slug;
        self
    }

    /// With per-command deadline
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tracker program name
    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.settings.program
    }

    /// Configured coding-agent assignee
    #[inline]
    #[must_use]
    pub fn assignee(&self) -> Option<&str> {
        self.settings.assignee.as_deref()
    }

    fn spec(&self) -> ProcessSpec {
        ProcessSpec::new(&self.settings.program)
            .current_dir(&self.cwd)
            .timeout(self.timeout)
    }

    fn with_repo_arg(&self, spec: ProcessSpec) -> ProcessSpec {
        match &self.repo_slug {
            Some(slug) => spec.arg("--repo").arg(slug),
            None => spec,
        }
    }

    /// Create an issue; the body goes through stdin
    ///
    /// # Errors
    /// Tracker failure, or output without an issue URL.
    pub async fn create(&self, draft: &IssueDraft) -> Result<CreatedIssue, PipelineError> {
        let mut spec = self
            .spec()
            .args(["issue", "create", "--title"])
            .arg(&draft.title)
            .args(["--body-file", "-"]);
        for label in self.settings.labels.iter().chain(&draft.labels) {
            spec = spec.arg("--label").arg(label);
        }
        let spec = self.with_repo_arg(spec).stdin(&draft.body);

        let out = self.runner.run(&spec).await?.into_result()?;
        let created = parse_created(&out.stdout).ok_or_else(|| {
            PipelineError::Parse(format!("no issue URL in tracker output: {}", out.stdout.trim()))
        })?;
        tracing::info!(number = created.number, url = %created.url, "issue created");
        Ok(created)
    }

    /// Assign `number` to `assignee`
    ///
    /// # Errors
    /// Tracker failure.
    pub async fn assign(&self, number: u64, assignee: &str) -> Result<(), PipelineError> {
        let spec = self
            .spec()
            .args(["issue", "edit"])
            .arg(number.to_string())
            .args(["--add-assignee", assignee]);
        self.runner.run(&self.with_repo_arg(spec)).await?.into_result()?;
        tracing::info!(number, assignee, "issue assigned");
        Ok(())
    }
}

/// Issue number and URL from `issue create` output
#[must_use]
pub fn parse_created(stdout: &str) -> Option<CreatedIssue> {
    let caps = ISSUE_URL.captures_iter(stdout).last()?;
    let url = caps.get(0)?.as_str().to_string();
    let number = caps.get(1)?.as_str().parse().ok()?;
    Some(CreatedIssue { number, url })
}

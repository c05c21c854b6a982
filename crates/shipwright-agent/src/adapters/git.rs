//! Git working-copy adapter

use crate::process::{ProcessOutput, ProcessRunner, ProcessSpec};
use shipwright_core::PipelineError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Git operations on one working copy
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn ProcessRunner>,
    repo: PathBuf,
    timeout: Duration,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git").field("repo", &self.repo).finish()
    }
}

impl Git {
    /// Create adapter for `repo`
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, repo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            repo: repo.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// With per-command deadline
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Working copy root
    #[inline]
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn raw(&self, args: &[&str]) -> Result<ProcessOutput, PipelineError> {
        let spec = ProcessSpec::new("git")
            .args(args.iter().copied())
            .current_dir(&self.repo)
            .timeout(self.timeout);
        Ok(self.runner.run(&spec).await?)
    }

    async fn git(&self, args: &[&str]) -> Result<String, PipelineError> {
        let out = self.raw(args).await?.into_result()?;
        Ok(out.stdout)
    }

    /// Discard local changes and return to `baseline`
    ///
    /// Fetches `remote/baseline` when the remote is reachable and resets to
    /// it, otherwise resets to the local baseline branch.
    ///
    /// # Errors
    /// Git failures other than an unreachable remote.
    pub async fn reset_to_baseline(&self, remote: &str, baseline: &str) -> Result<(), PipelineError> {
        let fetched = self.raw(&["fetch", remote, baseline]).await?.success();
        if !fetched {
            tracing::debug!(remote, baseline, "fetch failed, resetting to local baseline");
        }
        self.git(&["checkout", "-f", baseline]).await?;
        let target = if fetched {
            format!("{remote}/{baseline}")
        } else {
            baseline.to_string()
        };
        self.git(&["reset", "--hard", &target]).await?;
        self.git(&["clean", "-fd"]).await?;
        Ok(())
    }

    /// Switch to an existing branch, keeping local changes
    ///
    /// # Errors
    /// Git failure, e.g. local changes that would be overwritten.
    pub async fn checkout(&self, branch: &str) -> Result<(), PipelineError> {
        self.git(&["checkout", branch]).await.map(|_| ())
    }

    /// Create or reset `branch` at the current commit and switch to it
    ///
    /// # Errors
    /// Git failure.
    pub async fn checkout_new_branch(&self, branch: &str) -> Result<(), PipelineError> {
        self.git(&["checkout", "-B", branch]).await.map(|_| ())
    }

    /// Paths with uncommitted changes, untracked included
    ///
    /// # Errors
    /// Git failure.
    pub async fn changed_files(&self) -> Result<Vec<String>, PipelineError> {
        let out = self.git(&["status", "--porcelain"]).await?;
        Ok(parse_porcelain(&out))
    }

    /// Whether the working copy differs from HEAD
    ///
    /// # Errors
    /// Git failure.
    pub async fn has_changes(&self) -> Result<bool, PipelineError> {
        Ok(!self.changed_files().await?.is_empty())
    }

    /// Stage everything and commit when a diff exists
    ///
    /// Returns `false` when there was nothing to commit.
    ///
    /// # Errors
    /// Git failure.
    pub async fn commit_all(&self, message: &str) -> Result<bool, PipelineError> {
        self.git(&["add", "-A"]).await?;
        if !self.has_changes().await? {
            return Ok(false);
        }
        self.git(&["commit", "--no-verify", "-m", message]).await?;
        Ok(true)
    }

    /// Local branches starting with `prefix`
    ///
    /// # Errors
    /// Git failure.
    pub async fn branches_with_prefix(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let pattern = format!("{prefix}*");
        let out = self
            .git(&["branch", "--list", &pattern, "--format=%(refname:short)"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Merge `branch` into the current branch, aborting on conflict
    ///
    /// # Errors
    /// The merge failure, after the merge was aborted.
    pub async fn merge(&self, branch: &str) -> Result<(), PipelineError> {
        let out = self.raw(&["merge", "--no-ff", "--no-edit", branch]).await?;
        if out.success() {
            return Ok(());
        }
        let _ = self.raw(&["merge", "--abort"]).await;
        out.into_result().map(|_| ())
    }

    /// Tracked files
    ///
    /// # Errors
    /// Git failure.
    pub async fn tracked_files(&self) -> Result<Vec<String>, PipelineError> {
        let out = self.git(&["ls-files"]).await?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

/// Paths from `git status --porcelain` (rename targets for renames)
#[must_use]
pub fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| l.len() > 3)
        .map(|l| {
            let path = &l[3..];
            path.rsplit_once(" -> ")
                .map_or(path, |(_, to)| to)
                .trim_matches('"')
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessRunner;

    #[test]
    fn porcelain_paths() {
        let out = " M src/a.css\n?? b.js\nR  old.txt -> new.txt\n";
        assert_eq!(parse_porcelain(out), ["src/a.css", "b.js", "new.txt"]);
    }

    #[tokio::test]
    async fn reset_falls_back_to_local_baseline() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|s| s.args.first().map(String::as_str) == Some("fetch"))
            .returning(|_| Ok(ProcessOutput::failed(128, "fatal: 'origin' does not appear to be a git repository")));
        runner
            .expect_run()
            .withf(|s| s.args == ["reset", "--hard", "main"])
            .times(1)
            .returning(|_| Ok(ProcessOutput::ok("")));
        runner
            .expect_run()
            .returning(|_| Ok(ProcessOutput::ok("")));

        let git = Git::new(Arc::new(runner), "/tmp/repo");
        git.reset_to_baseline("origin", "main").await.unwrap();
    }

    #[tokio::test]
    async fn commit_skipped_without_diff() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|s| s.args.first().map(String::as_str) == Some("commit"))
            .never();
        runner
            .expect_run()
            .returning(|_| Ok(ProcessOutput::ok("")));

        let git = Git::new(Arc::new(runner), "/tmp/repo");
        assert!(!git.commit_all("shipwright: gap 1").await.unwrap());
    }

    #[tokio::test]
    async fn failed_merge_is_aborted() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|s| s.args.first().map(String::as_str) == Some("merge") && s.args[1] == "--no-ff")
            .returning(|_| Ok(ProcessOutput::failed(1, "CONFLICT (content): Merge conflict in a.css")));
        runner
            .expect_run()
            .withf(|s| s.args == ["merge", "--abort"])
            .times(1)
            .returning(|_| Ok(ProcessOutput::ok("")));

        let git = Git::new(Arc::new(runner), "/tmp/repo");
        assert!(git.merge("shipwright/gap-1").await.is_err());
    }
}

//! External process runner
//!
//! Every CLI the pipeline touches (git, issue tracker, deployment tool,
//! browser harness) goes through [`ProcessRunner`]. Adapters build the
//! argument lists; the runner only spawns, feeds stdin, enforces the
//! deadline and collects output.

use crate::error::ProcessError;
use async_trait::async_trait;
use dashmap::DashMap;
use shipwright_core::PipelineError;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Deadline for `<tool> --version` probes
pub const DETECT_TIMEOUT: Duration = Duration::from_secs(15);

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment
    pub env: Vec<(String, String)>,
    /// Text written to stdin, then closed
    pub stdin: Option<String>,
    /// Deadline
    pub timeout: Duration,
}

impl ProcessSpec {
    /// Create spec with a 60 second deadline
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Append one argument
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// With working directory
    #[inline]
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// With environment variable
    #[inline]
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// With stdin text
    #[inline]
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// With deadline
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program plus arguments, for logs
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Stdout, lossy UTF-8
    pub stdout: String,
    /// Stderr, lossy UTF-8
    pub stderr: String,
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Successful output with `stdout`
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Failed output with `stderr`
    #[must_use]
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
        }
    }

    /// Exit code zero
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.clone(),
            _ => self.stderr.clone(),
        }
    }

    /// Non-zero exit as a classified pipeline error
    ///
    /// # Errors
    /// [`PipelineError::ExternalProcess`] classified from the combined output.
    pub fn into_result(self) -> Result<Self, PipelineError> {
        if self.success() {
            Ok(self)
        } else {
            let combined = self.combined();
            let text = if combined.trim().is_empty() {
                format!("exited with {:?}", self.exit_code)
            } else {
                combined
            };
            Err(PipelineError::external(&text))
        }
    }
}

/// Runs external processes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion or deadline
    ///
    /// A non-zero exit is not an error here; callers inspect the output.
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError>;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        tracing::debug!(command = %spec.display(), "running external process");

        let io_err = |source: std::io::Error| ProcessError::Io {
            program: spec.program.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    program: spec.program.clone(),
                }
            } else {
                io_err(e)
            }
        })?;

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await.map_err(io_err)?;
            // Dropping stdin closes the pipe.
        }

        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.map_err(io_err)?;
                Ok(ProcessOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                })
            }
            Err(_) => {
                tracing::warn!(command = %spec.display(), secs = spec.timeout.as_secs(), "external process timed out");
                Err(ProcessError::Timeout {
                    program: spec.program.clone(),
                    secs: spec.timeout.as_secs(),
                })
            }
        }
    }
}

/// Lazy `<tool> --version` detection, cached per program
#[derive(Clone)]
pub struct ToolDetector {
    runner: Arc<dyn ProcessRunner>,
    cache: Arc<DashMap<String, bool>>,
}

impl std::fmt::Debug for ToolDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDetector")
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl ToolDetector {
    /// Create detector
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Whether `program --version` exits successfully
    pub async fn is_available(&self, program: &str) -> bool {
        if let Some(known) = self.cache.get(program) {
            return *known;
        }
        let spec = ProcessSpec::new(program).arg("--version").timeout(DETECT_TIMEOUT);
        let available = matches!(self.runner.run(&spec).await, Ok(out) if out.success());
        tracing::debug!(program, available, "tool detection");
        self.cache.insert(program.to_string(), available);
        available
    }

    /// Error unless `program` is available
    ///
    /// # Errors
    /// Infra-class [`PipelineError::ExternalProcess`] naming the missing tool.
    pub async fn require(&self, program: &str) -> Result<(), PipelineError> {
        if self.is_available(program).await {
            Ok(())
        } else {
            Err(ProcessError::NotFound {
                program: program.to_string(),
            }
            .into())
        }
    }
}

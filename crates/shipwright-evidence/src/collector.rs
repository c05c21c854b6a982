//! Evidence collector
//!
//! Drives the browser harness against a live URL and returns the audit.
//! The harness (Node plus Playwright) is detected and installed lazily on
//! first use; later collections reuse it.

use crate::audit::EvidenceAudit;
use crate::error::EvidenceError;
use crate::script::{extract_audit_json, render_script, ScriptOptions};
use shipwright_agent::{ProcessError, ProcessRunner, ProcessSpec, ToolDetector};
use shipwright_core::config::EvidenceSettings;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Collects evidence audits for deployed URLs
pub struct EvidenceCollector {
    runner: Arc<dyn ProcessRunner>,
    detector: ToolDetector,
    settings: EvidenceSettings,
    harness: OnceCell<()>,
}

impl std::fmt::Debug for EvidenceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceCollector")
            .field("harness_dir", &self.settings.harness_dir)
            .field("ready", &self.harness.initialized())
            .finish()
    }
}

impl EvidenceCollector {
    /// Create collector
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: EvidenceSettings) -> Self {
        Self {
            detector: ToolDetector::new(Arc::clone(&runner)),
            runner,
            settings,
            harness: OnceCell::new(),
        }
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &EvidenceSettings {
        &self.settings
    }

    /// Audit `url`
    ///
    /// A harness that stopped early still yields its partial audit with
    /// `fatal_error` set.
    ///
    /// # Errors
    /// - [`EvidenceError::InvalidUrl`] for anything but an http(s) URL
    /// - [`EvidenceError::Install`] when the harness cannot be set up
    /// - [`EvidenceError::Timeout`] when the script overruns its deadline
    /// - [`EvidenceError::NoAudit`] / [`EvidenceError::Malformed`] for unusable output
    pub async fn collect(&self, url: &str) -> Result<EvidenceAudit, EvidenceError> {
        let url = validate_url(url)?;
        self.harness.get_or_try_init(|| self.prepare_harness()).await?;

        let script = render_script(&ScriptOptions::new(
            url,
            self.settings.probe_paths.clone(),
            self.settings.max_clicks,
        ))?;
        let mut file = tempfile::Builder::new()
            .prefix("audit-")
            .suffix(".cjs")
            .tempfile_in(&self.settings.harness_dir)?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        let secs = self.settings.script_timeout_secs;
        let spec = ProcessSpec::new(&self.settings.node_program)
            .arg(file.path().to_string_lossy())
            .current_dir(&self.settings.harness_dir)
            .timeout(Duration::from_secs(secs));

        tracing::info!(url, "collecting evidence");
        let output = self.runner.run(&spec).await.map_err(|e| match e {
            ProcessError::Timeout { .. } => EvidenceError::Timeout(secs),
            other => EvidenceError::Process(other),
        })?;

        let Some(json) = extract_audit_json(&output.stdout) else {
            return Err(EvidenceError::NoAudit(tail(&output.combined(), 500)));
        };
        let audit: EvidenceAudit = serde_json::from_str(json)?;

        if let Some(fatal) = &audit.fatal_error {
            tracing::warn!(url, error = %fatal, "evidence harness stopped early, keeping partial audit");
        }
        tracing::info!(
            url,
            forms = audit.forms.len(),
            probes = audit.probes.len(),
            ctas = audit.ctas.len(),
            cookie_banner = audit.cookie_consent.banner_found,
            "evidence collected"
        );
        Ok(audit)
    }

    async fn prepare_harness(&self) -> Result<(), EvidenceError> {
        let node = &self.settings.node_program;
        if !self.detector.is_available(node).await {
            return Err(EvidenceError::Process(ProcessError::NotFound {
                program: node.clone(),
            }));
        }

        let dir = &self.settings.harness_dir;
        tokio::fs::create_dir_all(dir).await?;
        if is_installed(dir) {
            tracing::debug!(dir = %dir.display(), "browser harness already installed");
            return Ok(());
        }

        let timeout = Duration::from_secs(self.settings.install_timeout_secs);
        for step in &self.settings.install_commands {
            let Some((program, args)) = step.split_first() else {
                continue;
            };
            let spec = ProcessSpec::new(program)
                .args(args.iter().cloned())
                .current_dir(dir)
                .timeout(timeout);
            tracing::info!(command = %spec.display(), "installing browser harness");
            let output = self
                .runner
                .run(&spec)
                .await
                .map_err(|e| EvidenceError::Install(e.to_string()))?;
            if !output.success() {
                return Err(EvidenceError::Install(format!(
                    "{}: {}",
                    spec.display(),
                    tail(&output.combined(), 500)
                )));
            }
        }
        Ok(())
    }
}

fn is_installed(dir: &Path) -> bool {
    dir.join("node_modules").join("playwright").is_dir()
}

fn validate_url(url: &str) -> Result<&str, EvidenceError> {
    let url = url.trim();
    let host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| EvidenceError::InvalidUrl(url.to_string()))?;
    if host.is_empty() || host.starts_with('/') || host.chars().any(char::is_whitespace) {
        return Err(EvidenceError::InvalidUrl(url.to_string()));
    }
    Ok(url)
}

fn tail(text: &str, max: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        text.chars().skip(count - max).collect()
    }
}

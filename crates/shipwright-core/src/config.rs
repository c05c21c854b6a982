//! Shipwright configuration
//!
//! Loaded from TOML; every section and field has a default so an empty file
//! (or no file) is a valid configuration.

use crate::error::PipelineError;
use crate::policy::StagePolicies;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding `agent.command`
pub const AGENT_COMMAND_ENV: &str = "SHIPWRIGHT_AGENT_COMMAND";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ShipwrightConfig {
    /// Agent runtime settings
    pub agent: AgentSettings,
    /// Stage policies
    pub pipeline: PipelineSettings,
    /// Target codebase
    pub target: TargetSettings,
    /// Issue tracker
    pub issues: IssueSettings,
    /// Deployment tool
    pub deploy: DeploySettings,
    /// Evidence collection
    pub evidence: EvidenceSettings,
}

impl ShipwrightConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply environment overrides
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(command) = std::env::var(AGENT_COMMAND_ENV) {
            if !command.trim().is_empty() {
                self.agent.command = command;
            }
        }
        self
    }

    /// With target repository path
    #[inline]
    #[must_use]
    pub fn with_repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.target.repo_path = path.into();
        self
    }

    /// With analysis concurrency ceiling
    #[inline]
    #[must_use]
    pub fn with_analyze_concurrency(mut self, max: usize) -> Self {
        self.pipeline.policies.analyze = self.pipeline.policies.analyze.with_concurrency(max);
        self
    }

    /// With validation concurrency ceiling
    #[inline]
    #[must_use]
    pub fn with_validate_concurrency(mut self, max: usize) -> Self {
        self.pipeline.policies.validate = self.pipeline.policies.validate.with_concurrency(max);
        self
    }
}

/// Agent runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Headless agent CLI to spawn per session
    pub command: String,
    /// Arguments passed on every spawn
    pub args: Vec<String>,
    /// Model name, passed as `--model` when set
    pub model: Option<String>,
    /// Extra arguments per capability profile (`meeting-data`, `codebase-read`, ...)
    pub profiles: BTreeMap<String, Vec<String>>,
    /// Characters of tool arguments/results kept in logs
    pub log_preview_chars: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: "copilot".to_string(),
            args: vec!["--headless".to_string(), "--output-format=jsonl".to_string()],
            model: None,
            profiles: BTreeMap::new(),
            log_preview_chars: 200,
        }
    }
}

/// Stage policy settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Per-stage policies
    pub policies: StagePolicies,
    /// Delay letting remote state settle (e.g. after deploy), in milliseconds
    pub settle_delay_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            policies: StagePolicies::default(),
            settle_delay_ms: 5_000,
        }
    }
}

/// Target codebase settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    /// Local working copy
    pub repo_path: PathBuf,
    /// Baseline branch every gap starts from
    pub baseline_branch: String,
    /// Remote holding the baseline
    pub remote: String,
    /// `owner/name` slug used by the codebase-read connector and issue tracker
    pub repo_slug: Option<String>,
    /// Byte cap for the source snapshot sent to coding agents
    pub snapshot_limit_bytes: usize,
    /// Prefix for local feature branches
    pub branch_prefix: String,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            baseline_branch: "main".to_string(),
            remote: "origin".to_string(),
            repo_slug: None,
            snapshot_limit_bytes: 50 * 1024,
            branch_prefix: "shipwright/".to_string(),
        }
    }
}

/// Issue tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueSettings {
    /// Tracker CLI
    pub program: String,
    /// Labels applied to every issue
    pub labels: Vec<String>,
    /// Coding agent to assign, `None` skips assignment
    pub assignee: Option<String>,
}

impl Default for IssueSettings {
    fn default() -> Self {
        Self {
            program: "gh".to_string(),
            labels: vec!["shipwright".to_string()],
            assignee: Some("copilot".to_string()),
        }
    }
}

/// Deployment tool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Deployment CLI
    pub program: String,
    /// Environment name
    pub environment: String,
    /// Descriptor whose presence means "already provisioned"
    pub descriptor: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            program: "azd".to_string(),
            environment: "shipwright".to_string(),
            descriptor: "azure.yaml".to_string(),
        }
    }
}

/// Evidence collection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceSettings {
    /// Node executable running the harness script
    pub node_program: String,
    /// Directory holding the harness `node_modules` and generated scripts
    pub harness_dir: PathBuf,
    /// Install steps for the harness, each a program followed by its args
    pub install_commands: Vec<Vec<String>>,
    /// Script deadline, in seconds
    pub script_timeout_secs: u64,
    /// Install deadline, in seconds
    pub install_timeout_secs: u64,
    /// Maximum CTA click-throughs
    pub max_clicks: usize,
    /// Conventional sub-paths probed for dedicated pages
    pub probe_paths: Vec<String>,
}

impl Default for EvidenceSettings {
    fn default() -> Self {
        Self {
            node_program: "node".to_string(),
            harness_dir: PathBuf::from(".shipwright/harness"),
            install_commands: vec![
                argv(&["npm", "install", "--no-save", "--no-audit", "playwright"]),
                argv(&["npx", "--yes", "playwright", "install", "chromium"]),
            ],
            script_timeout_secs: 120,
            install_timeout_secs: 300,
            max_clicks: 5,
            probe_paths: argv(&[
                "/privacy",
                "/privacy-policy",
                "/cookies",
                "/cookie-policy",
                "/terms",
                "/about",
                "/contact",
            ]),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| (*p).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_is_default() {
        let config = ShipwrightConfig::from_toml_str("").unwrap();
        assert_eq!(config, ShipwrightConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let text = r#"
            [agent]
            command = "claude"

            [pipeline.policies.analyze]
            concurrency = 8

            [target]
            baseline_branch = "develop"
        "#;
        let config = ShipwrightConfig::from_toml_str(text).unwrap();
        assert_eq!(config.agent.command, "claude");
        assert_eq!(config.pipeline.policies.analyze.concurrency, 8);
        assert_eq!(config.pipeline.policies.analyze.timeout_secs, 300);
        assert_eq!(config.pipeline.policies.validate.concurrency, 4);
        assert_eq!(config.target.baseline_branch, "develop");
        assert_eq!(config.target.snapshot_limit_bytes, 50 * 1024);
    }

    #[test]
    fn timeout_only_overrides_keep_stage_budgets() {
        let text = "[pipeline.policies.extract]\ntimeout_secs = 60\n\n[pipeline.policies.validate]\ntimeout_secs = 90\n";
        let config = ShipwrightConfig::from_toml_str(text).unwrap();
        let policies = config.pipeline.policies;
        assert_eq!(policies.extract.timeout_secs, 60);
        assert_eq!(policies.extract.max_attempts, 2);
        assert_eq!(policies.validate.timeout_secs, 90);
        assert_eq!(policies.validate.concurrency, 4);
        assert_eq!(policies.analyze.concurrency, 4);
    }

    #[test]
    fn extract_attempts_ignore_configuration() {
        let text = "[pipeline.policies.extract]\nmax_attempts = 7\n";
        let config = ShipwrightConfig::from_toml_str(text).unwrap();
        assert_eq!(config.pipeline.policies.extract.max_attempts, 2);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = ShipwrightConfig::from_toml_str("agent = 3").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[deploy]\nenvironment = \"staging\"").unwrap();
        let config = ShipwrightConfig::load(file.path()).unwrap();
        assert_eq!(config.deploy.environment, "staging");
        assert_eq!(config.deploy.program, "azd");
    }

    #[test]
    fn independent_concurrency_ceilings() {
        let config = ShipwrightConfig::new()
            .with_analyze_concurrency(2)
            .with_validate_concurrency(6);
        assert_eq!(config.pipeline.policies.analyze.concurrency, 2);
        assert_eq!(config.pipeline.policies.validate.concurrency, 6);
    }
}

//! Deployment-tool adapter (`azd`)

use crate::process::{ProcessOutput, ProcessRunner, ProcessSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use shipwright_core::config::DeploySettings;
use shipwright_core::PipelineError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https://[^\s"'<>()\x1b]+"#).expect("valid regex"));

/// Hosts that serve the deployed app rather than a console page
const APP_HOSTS: &[&str] = &[
    ".azurewebsites.net",
    ".azurestaticapps.net",
    ".azurecontainerapps.io",
    ".azureedge.net",
    ".cloudapp.azure.com",
];

/// Hosts never reported as the deploy URL
const CONSOLE_HOSTS: &[&str] = &["portal.azure.com", "aka.ms", "learn.microsoft.com", "github.com"];

/// Typed wrapper over the deployment CLI
#[derive(Clone)]
pub struct DeployTool {
    runner: Arc<dyn ProcessRunner>,
    settings: DeploySettings,
    repo: PathBuf,
    timeout: Duration,
}

impl std::fmt::Debug for DeployTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployTool")
            .field("program", &self.settings.program)
            .field("environment", &self.settings.environment)
            .finish()
    }
}

impl DeployTool {
    /// Create adapter for the project at `repo`
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: DeploySettings, repo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            settings,
            repo: repo.into(),
            timeout: Duration::from_secs(1200),
        }
    }

    /// With per-command deadline
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tool program name
    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.settings.program
    }

    /// Descriptor path inside the project
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.repo.join(&self.settings.descriptor)
    }

    /// Whether the project was provisioned before
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.descriptor_path().is_file()
    }

    /// Project root
    #[inline]
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn run(&self, args: &[&str]) -> Result<ProcessOutput, PipelineError> {
        let spec = ProcessSpec::new(&self.settings.program)
            .args(args.iter().copied())
            .current_dir(&self.repo)
            .timeout(self.timeout);
        Ok(self.runner.run(&spec).await?)
    }

    /// Provision and deploy from scratch
    ///
    /// Creates the environment first; an already existing environment is
    /// not an error.
    ///
    /// # Errors
    /// Classified tool failure.
    pub async fn provision_fresh(&self) -> Result<String, PipelineError> {
        let env = self.settings.environment.as_str();
        let created = self.run(&["env", "new", env, "--no-prompt"]).await?;
        if !created.success() {
            tracing::debug!(environment = env, output = %created.combined(), "environment creation skipped");
        }
        let out = self.run(&["up", "--environment", env, "--no-prompt"]).await?.into_result()?;
        Ok(out.combined())
    }

    /// Redeploy an already provisioned project
    ///
    /// # Errors
    /// Classified tool failure.
    pub async fn redeploy(&self) -> Result<String, PipelineError> {
        let env = self.settings.environment.as_str();
        let out = self
            .run(&["deploy", "--environment", env, "--no-prompt"])
            .await?
            .into_result()?;
        Ok(out.combined())
    }

    /// Endpoint recorded in the environment, if any
    ///
    /// # Errors
    /// Classified tool failure.
    pub async fn endpoint_from_env(&self) -> Result<Option<String>, PipelineError> {
        let env = self.settings.environment.as_str();
        let out = self
            .run(&["env", "get-values", "--environment", env])
            .await?
            .into_result()?;
        Ok(scrape_deploy_url(&out.stdout))
    }
}

/// Deployed app URL from tool output
///
/// Prefers known app hosts, then any other non-console URL; the last
/// matching URL wins since tools print the endpoint at the end.
#[must_use]
pub fn scrape_deploy_url(output: &str) -> Option<String> {
    let urls: Vec<String> = URL
        .find_iter(output)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', '/']).to_string())
        .filter(|u| !CONSOLE_HOSTS.iter().any(|h| host_of(u).ends_with(h)))
        .collect();

    urls.iter()
        .rev()
        .find(|u| APP_HOSTS.iter().any(|h| host_of(u).ends_with(h)))
        .or_else(|| urls.last())
        .cloned()
}

fn host_of(url: &str) -> &str {
    let rest = url.strip_prefix("https://").unwrap_or(url);
    rest.split(['/', ':', '?', '#']).next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessRunner;
    use shipwright_core::FailureClass;

    #[test]
    fn scrape_prefers_app_hosts() {
        let out = "\
  (✓) Done: Deploying service web
  - Endpoint: https://app-web-x7k2.azurewebsites.net/

You can view the resources in the portal: https://portal.azure.com/#@/resource/abc
See https://aka.ms/azd for help.";
        assert_eq!(
            scrape_deploy_url(out).as_deref(),
            Some("https://app-web-x7k2.azurewebsites.net")
        );
    }

    #[test]
    fn scrape_env_values() {
        let out = "AZURE_LOCATION=\"eastus\"\nSERVICE_WEB_URI=\"https://web.example.net\"\n";
        assert_eq!(scrape_deploy_url(out).as_deref(), Some("https://web.example.net"));
        assert_eq!(scrape_deploy_url("no url here"), None);
    }

    #[tokio::test]
    async fn existing_environment_is_not_fatal() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|s| s.args.first().map(String::as_str) == Some("env"))
            .returning(|_| Ok(ProcessOutput::failed(1, "environment 'shipwright' already exists")));
        runner
            .expect_run()
            .withf(|s| s.args.first().map(String::as_str) == Some("up"))
            .returning(|_| Ok(ProcessOutput::ok("Endpoint: https://site.azurestaticapps.net")));

        let tool = DeployTool::new(Arc::new(runner), DeploySettings::default(), "/tmp/site");
        let out = tool.provision_fresh().await.unwrap();
        assert_eq!(scrape_deploy_url(&out).as_deref(), Some("https://site.azurestaticapps.net"));
    }

    #[tokio::test]
    async fn quota_failure_is_infra() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_| Ok(ProcessOutput::failed(1, "ERROR: deployment failed: quota exceeded for sku B1")));
        let tool = DeployTool::new(Arc::new(runner), DeploySettings::default(), "/tmp/site");
        let err = tool.redeploy().await.unwrap_err();
        assert_eq!(err.class(), Some(FailureClass::Infra));
    }
}

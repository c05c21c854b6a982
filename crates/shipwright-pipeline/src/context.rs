//! Shared stage context
//!
//! Everything a stage needs to reach the outside world: the agent backend,
//! the process runner and configuration. Cheap to clone.

use shipwright_agent::adapters::{DeployTool, Git, IssueTracker};
use shipwright_agent::{
    AgentBackend, AgentSession, CapabilityProfile, ProcessRunner, Response, SessionConfig,
    ToolDetector,
};
use shipwright_core::{PipelineError, ShipwrightConfig, StagePolicies};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Handles shared by every stage
#[derive(Clone)]
pub struct StageContext {
    backend: Arc<dyn AgentBackend>,
    runner: Arc<dyn ProcessRunner>,
    detector: ToolDetector,
    config: Arc<ShipwrightConfig>,
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("backend", &self.backend.name())
            .field("repo", &self.config.target.repo_path)
            .finish()
    }
}

impl StageContext {
    /// Create context
    #[must_use]
    pub fn new(
        backend: Arc<dyn AgentBackend>,
        runner: Arc<dyn ProcessRunner>,
        config: ShipwrightConfig,
    ) -> Self {
        Self {
            detector: ToolDetector::new(Arc::clone(&runner)),
            backend,
            runner,
            config: Arc::new(config),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &ShipwrightConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn policies(&self) -> &StagePolicies {
        &self.config.pipeline.policies
    }

    #[inline]
    #[must_use]
    pub fn runner(&self) -> Arc<dyn ProcessRunner> {
        Arc::clone(&self.runner)
    }

    #[inline]
    #[must_use]
    pub fn detector(&self) -> &ToolDetector {
        &self.detector
    }

    /// Target working copy
    #[inline]
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.config.target.repo_path
    }

    #[must_use]
    pub fn git(&self) -> Git {
        Git::new(self.runner(), self.repo())
    }

    #[must_use]
    pub fn issues(&self) -> IssueTracker {
        IssueTracker::new(self.runner(), self.config.issues.clone(), self.repo())
            .with_repo(self.config.target.repo_slug.clone())
            .with_timeout(self.policies().file_issues.timeout())
    }

    #[must_use]
    pub fn deploy_tool(&self) -> DeployTool {
        DeployTool::new(self.runner(), self.config.deploy.clone(), self.repo())
            .with_timeout(self.policies().deploy.timeout())
    }

    /// Session configuration with model and working root applied
    #[must_use]
    pub fn session_config(&self, label: &str, profile: CapabilityProfile, system: &str) -> SessionConfig {
        let config = SessionConfig::new(label, profile)
            .with_system(system)
            .with_model(self.config.agent.model.clone());
        match profile {
            CapabilityProfile::CodebaseRead | CapabilityProfile::CodebaseWrite => {
                config.with_working_dir(self.repo())
            }
            _ => config,
        }
    }

    /// Open a session
    ///
    /// # Errors
    /// [`PipelineError::Connection`] when the backend cannot start one.
    pub async fn open_session(
        &self,
        label: &str,
        profile: CapabilityProfile,
        system: &str,
    ) -> Result<AgentSession, PipelineError> {
        let config = self.session_config(label, profile, system);
        let session = AgentSession::open(self.backend.as_ref(), &config).await?;
        Ok(session.with_preview_chars(self.config.agent.log_preview_chars))
    }

    /// One prompt in a fresh session, destroyed on every path
    ///
    /// # Errors
    /// Session open or send failures.
    pub async fn ask_once(
        &self,
        label: &str,
        profile: CapabilityProfile,
        system: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Response, PipelineError> {
        let mut session = self.open_session(label, profile, system).await?;
        let reply = session.send_and_wait(prompt, timeout).await;
        release(session).await;
        Ok(reply?)
    }
}

/// Destroy a session; a failing shutdown is logged, never propagated
pub async fn release(session: AgentSession) {
    let label = session.label().to_string();
    if let Err(e) = session.destroy().await {
        tracing::warn!(label = %label, error = %e, "agent session shutdown failed");
    }
}

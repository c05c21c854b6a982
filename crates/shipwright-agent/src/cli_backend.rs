//! Headless agent CLI backend
//!
//! Spawns one agent process per session and speaks JSON lines:
//! - stdin: `init`, `prompt` and `permission` messages
//! - stdout: [`AgentEvent`] objects tagged by `type`
//!
//! Stdout lines that are not recognizable events are treated as message
//! text. Stderr is forwarded to the log at debug level.

use crate::backend::{AgentBackend, AgentConversation, AgentEvent, SessionConfig};
use crate::error::SessionError;
use async_trait::async_trait;
use serde_json::json;
use shipwright_core::config::AgentSettings;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Backend spawning a headless agent CLI
#[derive(Debug, Clone)]
pub struct CliAgentBackend {
    settings: AgentSettings,
}

impl CliAgentBackend {
    /// Create backend from agent settings
    #[inline]
    #[must_use]
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    /// Full argument list for a session
    #[must_use]
    pub fn args_for(&self, config: &SessionConfig) -> Vec<String> {
        let mut args = self.settings.args.clone();
        if let Some(extra) = self.settings.profiles.get(config.profile.as_str()) {
            args.extend(extra.iter().cloned());
        }
        if let Some(model) = config.model.as_ref().or(self.settings.model.as_ref()) {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

#[async_trait]
impl AgentBackend for CliAgentBackend {
    fn name(&self) -> &str {
        &self.settings.command
    }

    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn AgentConversation>, SessionError> {
        let mut cmd = Command::new(&self.settings.command);
        cmd.args(self.args_for(config))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let spawn_err = |message: String| SessionError::Spawn {
            label: config.label.clone(),
            message,
        };

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                spawn_err(format!("`{}` not found on PATH", self.settings.command))
            } else {
                spawn_err(e.to_string())
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_err("stdout not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            let label = config.label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(label = %label, "agent stderr: {}", line);
                }
            });
        }

        let mut conversation = CliConversation {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };
        conversation
            .write_line(&json!({
                "type": "init",
                "label": config.label,
                "profile": config.profile,
                "system": config.system,
                "workingDir": config.working_dir,
            }))
            .await?;

        Ok(Box::new(conversation))
    }
}

struct CliConversation {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl CliConversation {
    async fn write_line(&mut self, value: &serde_json::Value) -> Result<(), SessionError> {
        let mut line = serde_json::to_string(value).map_err(|e| SessionError::Protocol(e.to_string()))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AgentConversation for CliConversation {
    async fn send(&mut self, prompt: &str) -> Result<(), SessionError> {
        self.write_line(&json!({ "type": "prompt", "text": prompt })).await
    }

    async fn next_event(&mut self) -> Result<Option<AgentEvent>, SessionError> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(parse_event_line(&line)));
        }
    }

    async fn answer_permission(&mut self, id: &str, approved: bool) -> Result<(), SessionError> {
        self.write_line(&json!({ "type": "permission", "id": id, "approved": approved }))
            .await
    }

    async fn close(mut self: Box<Self>) -> Result<(), SessionError> {
        // Closing stdin asks the agent to exit; kill if it does not.
        let _ = self.stdin.shutdown().await;
        match tokio::time::timeout(std::time::Duration::from_secs(5), self.child.wait()).await {
            Ok(status) => {
                status?;
                Ok(())
            }
            Err(_) => {
                self.child.kill().await?;
                Ok(())
            }
        }
    }

    fn abort(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Parse one stdout line; non-event lines become message text
#[must_use]
pub fn parse_event_line(line: &str) -> AgentEvent {
    serde_json::from_str::<AgentEvent>(line).unwrap_or_else(|_| AgentEvent::MessageDelta {
        text: format!("{line}\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CapabilityProfile;
    use std::collections::BTreeMap;

    #[test]
    fn args_include_profile_and_model() {
        let mut profiles = BTreeMap::new();
        profiles.insert("browser".to_string(), vec!["--allow-tool=playwright".to_string()]);
        let backend = CliAgentBackend::new(AgentSettings {
            profiles,
            model: Some("default-model".into()),
            ..AgentSettings::default()
        });

        let config = SessionConfig::new("judge", CapabilityProfile::Browser)
            .with_model(Some("judge-model".into()));
        let args = backend.args_for(&config);
        assert!(args.contains(&"--allow-tool=playwright".to_string()));
        assert_eq!(&args[args.len() - 2..], ["--model", "judge-model"]);
    }

    #[test]
    fn unknown_lines_are_text() {
        assert_eq!(
            parse_event_line("plain words"),
            AgentEvent::MessageDelta {
                text: "plain words\n".into()
            }
        );
        assert_eq!(parse_event_line(r#"{"type":"idle"}"#), AgentEvent::Idle);
        assert!(matches!(
            parse_event_line(r#"{"type":"unknown_kind"}"#),
            AgentEvent::MessageDelta { .. }
        ));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let backend = CliAgentBackend::new(AgentSettings {
            command: "shipwright-no-such-agent-binary".into(),
            ..AgentSettings::default()
        });
        let err = backend
            .open(&SessionConfig::new("x", CapabilityProfile::None))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }
}

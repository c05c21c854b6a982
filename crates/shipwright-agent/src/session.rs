//! Agent session wrapper
//!
//! Opens a conversation on a backend, auto-approves every tool permission
//! request, logs each tool call with a truncated preview, and waits for the
//! agent to go idle under a deadline.
//!
//! A session must be released with [`AgentSession::destroy`], which consumes
//! it. Dropping an undestroyed session logs a warning and aborts the
//! underlying conversation.

use crate::backend::{AgentBackend, AgentConversation, AgentEvent, Response, SessionConfig, ToolCall};
use crate::error::SessionError;
use std::collections::HashMap;
use std::time::Duration;

/// Default characters kept in tool-call log previews
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Live agent session
pub struct AgentSession {
    label: String,
    preview_chars: usize,
    conversation: Option<Box<dyn AgentConversation>>,
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("label", &self.label)
            .field("open", &self.conversation.is_some())
            .finish()
    }
}

impl AgentSession {
    /// Open a session
    ///
    /// # Errors
    /// [`SessionError::Spawn`] when the backend cannot start a conversation.
    pub async fn open(backend: &dyn AgentBackend, config: &SessionConfig) -> Result<Self, SessionError> {
        tracing::debug!(
            label = %config.label,
            profile = %config.profile,
            backend = backend.name(),
            "opening agent session"
        );
        let conversation = backend.open(config).await?;
        Ok(Self {
            label: config.label.clone(),
            preview_chars: DEFAULT_PREVIEW_CHARS,
            conversation: Some(conversation),
        })
    }

    /// With log preview length
    #[inline]
    #[must_use]
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Diagnostic label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Send a prompt and wait for the agent to go idle
    ///
    /// The session stays usable after a timeout only for [`Self::destroy`].
    ///
    /// # Errors
    /// [`SessionError::Timeout`] when `timeout` elapses; agent-side failures as
    /// reported by the backend.
    pub async fn send_and_wait(&mut self, prompt: &str, timeout: Duration) -> Result<Response, SessionError> {
        let label = self.label.clone();
        let preview_chars = self.preview_chars;
        let conversation = self
            .conversation
            .as_mut()
            .ok_or_else(|| SessionError::Closed(label.clone()))?;

        match tokio::time::timeout(timeout, drive(conversation.as_mut(), prompt, &label, preview_chars)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(label = %label, secs = timeout.as_secs(), "agent session timed out");
                Err(SessionError::Timeout {
                    label,
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Release the session
    ///
    /// # Errors
    /// Propagates backend shutdown failures; the conversation is gone either way.
    pub async fn destroy(mut self) -> Result<(), SessionError> {
        match self.conversation.take() {
            Some(conversation) => {
                tracing::debug!(label = %self.label, "destroying agent session");
                conversation.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        if let Some(mut conversation) = self.conversation.take() {
            tracing::warn!(label = %self.label, "agent session dropped without destroy(), aborting");
            conversation.abort();
        }
    }
}

async fn drive(
    conversation: &mut dyn AgentConversation,
    prompt: &str,
    label: &str,
    preview_chars: usize,
) -> Result<Response, SessionError> {
    conversation.send(prompt).await?;

    let mut final_message: Option<String> = None;
    let mut streamed = String::new();
    let mut pending: HashMap<String, (String, String)> = HashMap::new();
    let mut tool_calls = Vec::new();

    loop {
        let Some(event) = conversation.next_event().await? else {
            if final_message.is_none() && streamed.trim().is_empty() {
                return Err(SessionError::Closed(label.to_string()));
            }
            break;
        };

        match event {
            AgentEvent::PermissionRequest { id, tool, arguments } => {
                tracing::debug!(label, tool = %tool, args = %preview(&arguments.to_string(), preview_chars), "auto-approving tool");
                conversation.answer_permission(&id, true).await?;
            }
            AgentEvent::ToolStarted { id, name, arguments } => {
                let args = preview(&arguments.to_string(), preview_chars);
                tracing::info!(label, tool = %name, args = %args, "tool call");
                pending.insert(id, (name, args));
            }
            AgentEvent::ToolCompleted { id, name, result, success } => {
                let (name, arguments) = pending
                    .remove(&id)
                    .unwrap_or_else(|| (name, String::new()));
                let result = preview(&result, preview_chars);
                tracing::info!(label, tool = %name, success, result = %result, "tool result");
                tool_calls.push(ToolCall {
                    name,
                    arguments,
                    result,
                    success,
                });
            }
            AgentEvent::Message { text } => {
                streamed.clear();
                final_message = Some(text);
            }
            AgentEvent::MessageDelta { text } => streamed.push_str(&text),
            AgentEvent::Idle => break,
            AgentEvent::Error { message } => {
                tracing::warn!(label, error = %message, "agent reported an error");
                return Err(SessionError::Agent(message));
            }
        }
    }

    // Deltas after the last full message belong to a newer message.
    let text = if streamed.trim().is_empty() {
        final_message.unwrap_or_default()
    } else {
        streamed
    };
    tracing::debug!(label, chars = text.len(), tools = tool_calls.len(), "agent went idle");

    Ok(Response { text, tool_calls })
}

/// Truncate to `max` characters, marking the cut
#[must_use]
pub fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CapabilityProfile;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct Log {
        approved: Vec<String>,
        closed: bool,
        aborted: bool,
    }

    struct Canned {
        events: VecDeque<AgentEvent>,
        stall: bool,
        log: Arc<Mutex<Log>>,
    }

    #[async_trait]
    impl AgentConversation for Canned {
        async fn send(&mut self, _prompt: &str) -> Result<(), SessionError> {
            Ok(())
        }

        async fn next_event(&mut self) -> Result<Option<AgentEvent>, SessionError> {
            if self.stall {
                futures::future::pending::<()>().await;
            }
            Ok(self.events.pop_front())
        }

        async fn answer_permission(&mut self, id: &str, approved: bool) -> Result<(), SessionError> {
            assert!(approved);
            self.log.lock().approved.push(id.to_string());
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<(), SessionError> {
            self.log.lock().closed = true;
            Ok(())
        }

        fn abort(&mut self) {
            self.log.lock().aborted = true;
        }
    }

    struct CannedBackend {
        events: Vec<AgentEvent>,
        stall: bool,
        log: Arc<Mutex<Log>>,
    }

    #[async_trait]
    impl AgentBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn open(&self, _config: &SessionConfig) -> Result<Box<dyn AgentConversation>, SessionError> {
            Ok(Box::new(Canned {
                events: self.events.clone().into(),
                stall: self.stall,
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn backend(events: Vec<AgentEvent>, stall: bool) -> (CannedBackend, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            CannedBackend {
                events,
                stall,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    fn config() -> SessionConfig {
        SessionConfig::new("test", CapabilityProfile::CodebaseWrite)
    }

    #[tokio::test]
    async fn approves_permissions_and_records_tools() {
        let (backend, log) = backend(
            vec![
                AgentEvent::PermissionRequest {
                    id: "p1".into(),
                    tool: "write_file".into(),
                    arguments: serde_json::json!({"path": "a.css"}),
                },
                AgentEvent::ToolStarted {
                    id: "t1".into(),
                    name: "write_file".into(),
                    arguments: serde_json::json!({"path": "a.css"}),
                },
                AgentEvent::ToolCompleted {
                    id: "t1".into(),
                    name: String::new(),
                    result: "ok".into(),
                    success: true,
                },
                AgentEvent::Message { text: "done".into() },
                AgentEvent::Idle,
            ],
            false,
        );

        let mut session = AgentSession::open(&backend, &config()).await.unwrap();
        let response = session
            .send_and_wait("go", Duration::from_secs(5))
            .await
            .unwrap();
        session.destroy().await.unwrap();

        assert_eq!(response.text, "done");
        assert_eq!(response.tool_calls[0].name, "write_file");
        assert!(response.wrote_files());
        let log = log.lock();
        assert_eq!(log.approved, ["p1"]);
        assert!(log.closed);
        assert!(!log.aborted);
    }

    #[tokio::test]
    async fn deltas_are_joined() {
        let (backend, _log) = backend(
            vec![
                AgentEvent::MessageDelta { text: "hel".into() },
                AgentEvent::MessageDelta { text: "lo".into() },
            ],
            false,
        );
        let mut session = AgentSession::open(&backend, &config()).await.unwrap();
        let response = session.send_and_wait("hi", Duration::from_secs(5)).await.unwrap();
        session.destroy().await.unwrap();
        assert_eq!(response.text, "hello");
    }

    #[tokio::test]
    async fn timeout_then_destroy() {
        let (backend, log) = backend(Vec::new(), true);
        let mut session = AgentSession::open(&backend, &config()).await.unwrap();
        let err = session
            .send_and_wait("slow", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        session.destroy().await.unwrap();
        assert!(log.lock().closed);
    }

    #[tokio::test]
    async fn drop_without_destroy_aborts() {
        let (backend, log) = backend(Vec::new(), false);
        let session = AgentSession::open(&backend, &config()).await.unwrap();
        drop(session);
        assert!(log.lock().aborted);
    }

    #[tokio::test]
    async fn agent_error_is_surfaced() {
        let (backend, _log) = backend(
            vec![AgentEvent::Error {
                message: "quota exceeded".into(),
            }],
            false,
        );
        let mut session = AgentSession::open(&backend, &config()).await.unwrap();
        let err = session.send_and_wait("x", Duration::from_secs(5)).await.unwrap_err();
        session.destroy().await.unwrap();
        assert!(matches!(err, SessionError::Agent(m) if m == "quota exceeded"));
    }

    #[test]
    fn preview_truncates_on_chars() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("ok", 200), "ok");
    }
}

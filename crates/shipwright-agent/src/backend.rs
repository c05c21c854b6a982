//! Agent backend abstraction
//!
//! A backend starts conversations; a conversation accepts prompts and yields
//! a stream of [`AgentEvent`]s until the agent goes idle. The session wrapper
//! drives this stream and owns approval and logging policy.

use crate::error::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Tool integrations reachable from a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityProfile {
    /// Meeting-source connector
    MeetingData,
    /// Read-only access to the target codebase
    CodebaseRead,
    /// Write access to the local working copy
    CodebaseWrite,
    /// Browser automation
    Browser,
    /// No tools
    #[default]
    None,
}

impl CapabilityProfile {
    /// Stable name, also the key into configured profile arguments
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MeetingData => "meeting-data",
            Self::CodebaseRead => "codebase-read",
            Self::CodebaseWrite => "codebase-write",
            Self::Browser => "browser",
            Self::None => "none",
        }
    }
}

impl fmt::Display for CapabilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionConfig {
    /// Reachable tools
    pub profile: CapabilityProfile,
    /// System instruction
    pub system: String,
    /// Diagnostic label used in logs
    pub label: String,
    /// Working root for file tools
    pub working_dir: Option<PathBuf>,
    /// Model override
    pub model: Option<String>,
}

impl SessionConfig {
    /// Create new config
    #[must_use]
    pub fn new(label: impl Into<String>, profile: CapabilityProfile) -> Self {
        Self {
            profile,
            label: label.into(),
            ..Self::default()
        }
    }

    /// With system instruction
    #[inline]
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// With working root
    #[inline]
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// With model
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Event raised by a running conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Complete assistant message; the last one is the turn's answer
    Message {
        /// Message text
        text: String,
    },
    /// Streamed fragment of an assistant message
    MessageDelta {
        /// Fragment
        text: String,
    },
    /// Tool wants permission to run
    PermissionRequest {
        /// Request id to answer
        id: String,
        /// Tool name
        #[serde(default)]
        tool: String,
        /// Tool arguments
        #[serde(default)]
        arguments: Value,
    },
    /// Tool call started
    ToolStarted {
        /// Call id
        id: String,
        /// Tool name
        name: String,
        /// Tool arguments
        #[serde(default)]
        arguments: Value,
    },
    /// Tool call finished
    ToolCompleted {
        /// Call id
        id: String,
        /// Tool name
        #[serde(default)]
        name: String,
        /// Result text
        #[serde(default)]
        result: String,
        /// Whether the tool succeeded
        #[serde(default = "default_true")]
        success: bool,
    },
    /// Turn finished
    Idle,
    /// Agent-side failure
    Error {
        /// Message
        message: String,
    },
}

fn default_true() -> bool {
    true
}

/// A tool call observed during one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// Truncated arguments
    pub arguments: String,
    /// Truncated result
    pub result: String,
    /// Whether the tool succeeded
    pub success: bool,
}

impl ToolCall {
    /// Whether the tool writes files
    #[must_use]
    pub fn is_write(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        ["write", "edit", "create", "patch", "str_replace"]
            .iter()
            .any(|w| name.contains(w))
    }
}

/// Final answer of one turn
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Response {
    /// Final text
    pub text: String,
    /// Tool calls made during the turn
    pub tool_calls: Vec<ToolCall>,
}

impl Response {
    /// Whether the agent wrote files through its own tools
    #[must_use]
    pub fn wrote_files(&self) -> bool {
        self.tool_calls.iter().any(|c| c.success && c.is_write())
    }
}

/// Starts agent conversations
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Open a conversation
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn AgentConversation>, SessionError>;
}

/// One live conversation
#[async_trait]
pub trait AgentConversation: Send {
    /// Send a user prompt
    async fn send(&mut self, prompt: &str) -> Result<(), SessionError>;

    /// Next event, `None` once the conversation has ended
    async fn next_event(&mut self) -> Result<Option<AgentEvent>, SessionError>;

    /// Answer a permission request
    async fn answer_permission(&mut self, id: &str, approved: bool) -> Result<(), SessionError>;

    /// Graceful shutdown
    async fn close(self: Box<Self>) -> Result<(), SessionError>;

    /// Immediate, non-blocking teardown
    fn abort(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_parse_from_json_lines() {
        let e: AgentEvent =
            serde_json::from_str(r#"{"type":"tool_completed","id":"1","name":"write_file"}"#)
                .unwrap();
        assert_eq!(
            e,
            AgentEvent::ToolCompleted {
                id: "1".into(),
                name: "write_file".into(),
                result: String::new(),
                success: true,
            }
        );
        let e: AgentEvent = serde_json::from_str(r#"{"type":"idle"}"#).unwrap();
        assert_eq!(e, AgentEvent::Idle);
    }

    #[test]
    fn write_tools_are_detected() {
        let response = Response {
            text: String::new(),
            tool_calls: vec![ToolCall {
                name: "str_replace_editor".into(),
                arguments: String::new(),
                result: String::new(),
                success: true,
            }],
        };
        assert!(response.wrote_files());
        assert!(!Response::default().wrote_files());
    }

    #[test]
    fn profile_names() {
        assert_eq!(CapabilityProfile::MeetingData.to_string(), "meeting-data");
        assert_eq!(CapabilityProfile::default(), CapabilityProfile::None);
    }
}

//! Error types for agent sessions and external processes

use shipwright_core::{FailureClass, PipelineError};

/// Agent session failure
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Backend could not start a conversation
    #[error("cannot start agent session `{label}`: {message}")]
    Spawn {
        /// Session label
        label: String,
        /// Cause
        message: String,
    },

    /// No final response within the deadline
    #[error("agent session `{label}` timed out after {secs}s")]
    Timeout {
        /// Session label
        label: String,
        /// Deadline in seconds
        secs: u64,
    },

    /// Conversation ended before going idle
    #[error("agent session `{0}` closed unexpectedly")]
    Closed(String),

    /// Agent reported an error
    #[error("agent error: {0}")]
    Agent(String),

    /// Malformed traffic on the agent channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error on the agent channel
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the session hit its deadline
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<SessionError> for PipelineError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Spawn { .. } => Self::Connection(err.to_string()),
            SessionError::Timeout { .. } => Self::ExternalProcess {
                class: FailureClass::Timeout,
                message: err.to_string(),
            },
            other => Self::Session(other.to_string()),
        }
    }
}

/// External process failure
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Program not installed or not on PATH
    #[error("program not found: {program}")]
    NotFound {
        /// Program name
        program: String,
    },

    /// Deadline elapsed, process killed
    #[error("`{program}` timed out after {secs}s")]
    Timeout {
        /// Program name
        program: String,
        /// Deadline in seconds
        secs: u64,
    },

    /// Spawn or wait failed
    #[error("`{program}` failed to run: {source}")]
    Io {
        /// Program name
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl From<ProcessError> for PipelineError {
    fn from(err: ProcessError) -> Self {
        let class = match &err {
            ProcessError::NotFound { .. } => FailureClass::Infra,
            ProcessError::Timeout { .. } => FailureClass::Timeout,
            ProcessError::Io { .. } => FailureClass::Unknown,
        };
        Self::ExternalProcess {
            class,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_timeout_maps_to_timeout_class() {
        let err: PipelineError = SessionError::Timeout {
            label: "analyze-1".into(),
            secs: 300,
        }
        .into();
        assert_eq!(err.class(), Some(FailureClass::Timeout));
    }

    #[test]
    fn spawn_failure_is_connection() {
        let err: PipelineError = SessionError::Spawn {
            label: "extract".into(),
            message: "not found".into(),
        }
        .into();
        assert!(matches!(err, PipelineError::Connection(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_program_is_infra() {
        let err: PipelineError = ProcessError::NotFound {
            program: "azd".into(),
        }
        .into();
        assert_eq!(err.class(), Some(FailureClass::Infra));
    }
}

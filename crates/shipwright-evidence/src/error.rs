//! Error types for evidence collection

use shipwright_agent::ProcessError;
use shipwright_core::{FailureClass, PipelineError};

/// Evidence collection failure
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    /// URL is not http(s)
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Harness could not be installed
    #[error("harness install failed: {0}")]
    Install(String),

    /// Harness did not finish in time
    #[error("harness timed out after {0}s")]
    Timeout(u64),

    /// Harness exited without printing an audit
    #[error("harness produced no audit: {0}")]
    NoAudit(String),

    /// Audit JSON did not deserialize
    #[error("malformed audit: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Process failure
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Script file I/O
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EvidenceError> for PipelineError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::InvalidUrl(_) => Self::InvalidInput(err.to_string()),
            EvidenceError::Timeout(_) => Self::ExternalProcess {
                class: FailureClass::Timeout,
                message: err.to_string(),
            },
            EvidenceError::Process(inner) => inner.into(),
            other => Self::Evidence(other.to_string()),
        }
    }
}

//! Error types for Shipwright
//!
//! Provides the pipeline-wide error taxonomy:
//! - Unreachable external capabilities
//! - Capabilities that returned nothing usable
//! - Unparseable agent output
//! - External process failures, classified into a stable taxonomy
//! - Path safety violations on proposed file writes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Cannot reach an external capability
    #[error("connection error: {0}")]
    Connection(String),

    /// Capability reachable but returned nothing usable
    #[error("no data found: {0}")]
    NoDataFound(String),

    /// Extraction finished (including the broadened retry) with zero requirements
    #[error("no requirements found after {attempts} attempt(s)")]
    NoRequirementsFound {
        /// Attempts made
        attempts: u32,
    },

    /// Response text did not match any known shape
    #[error("parse failure: {0}")]
    Parse(String),

    /// Non-zero exit or timeout from a CLI or harness
    #[error("{class} failure: {message}")]
    ExternalProcess {
        /// Stable classification
        class: FailureClass,
        /// Human-readable message
        message: String,
    },

    /// A proposed write resolves outside the permitted root
    #[error("path safety violation: {path} escapes {root}")]
    PathSafetyViolation {
        /// Offending path as proposed
        path: String,
        /// Permitted root
        root: PathBuf,
    },

    /// Agent session failure
    #[error("agent session failed: {0}")]
    Session(String),

    /// Evidence collection failure
    #[error("evidence collection failed: {0}")]
    Evidence(String),

    /// A stage is already running
    #[error("pipeline busy: {0} is still running")]
    PipelineBusy(String),

    /// Caller passed unusable input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// External process failure classified from its output
    #[must_use]
    pub fn external(output: &str) -> Self {
        Self::ExternalProcess {
            class: FailureClass::classify(output),
            message: output.trim().to_string(),
        }
    }

    /// Failure class, for errors that carry one
    #[inline]
    #[must_use]
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            Self::ExternalProcess { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Check if error is retryable by the caller
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Session(_) => true,
            Self::ExternalProcess { class, .. } => {
                matches!(class, FailureClass::Timeout | FailureClass::Infra)
            }
            _ => false,
        }
    }
}

/// Stable taxonomy for external tool failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureClass {
    /// Not logged in / expired credentials
    Auth,
    /// No usable cloud subscription
    Subscription,
    /// Deadline exceeded
    Timeout,
    /// Provisioning / quota / resource problems
    Infra,
    /// Anything else
    Unknown,
}

const AUTH_MARKERS: &[&str] = &[
    "not logged in",
    "login",
    "authenticat",
    "unauthorized",
    "credential",
    "token expired",
    "aadsts",
    "az login",
];

const SUBSCRIPTION_MARKERS: &[&str] = &[
    "subscription",
    "no subscriptions found",
    "billing",
];

const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout", "deadline exceeded"];

const INFRA_MARKERS: &[&str] = &[
    "quota",
    "provision",
    "resource group",
    "deployment failed",
    "bicep",
    "conflict",
    "region",
    "sku",
];

impl FailureClass {
    /// Classify tool output by substring
    ///
    /// Order matters: auth wins over subscription (an expired login often
    /// mentions the subscription too), timeout over infra.
    #[must_use]
    pub fn classify(output: &str) -> Self {
        let lower = output.to_lowercase();
        let hit = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if hit(AUTH_MARKERS) {
            Self::Auth
        } else if hit(SUBSCRIPTION_MARKERS) {
            Self::Subscription
        } else if hit(TIMEOUT_MARKERS) {
            Self::Timeout
        } else if hit(INFRA_MARKERS) {
            Self::Infra
        } else {
            Self::Unknown
        }
    }

    /// Suggested user action
    #[must_use]
    pub fn hint(self) -> &'static str {
        match self {
            Self::Auth => "Re-authenticate with the deployment tool and retry",
            Self::Subscription => "Select or create a subscription, then retry",
            Self::Timeout => "The operation timed out; retry",
            Self::Infra => "Provisioning failed; check resource quotas and retry",
            Self::Unknown => "Retry the stage",
        }
    }

    /// Whether the UI should offer re-authentication
    #[inline]
    #[must_use]
    pub fn needs_reauth(self) -> bool {
        matches!(self, Self::Auth | Self::Subscription)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Subscription => "subscription",
            Self::Timeout => "timeout",
            Self::Infra => "infra",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_auth() {
        assert_eq!(
            FailureClass::classify("ERROR: not logged in, run `azd auth login`"),
            FailureClass::Auth
        );
    }

    #[test]
    fn classify_subscription() {
        assert_eq!(
            FailureClass::classify("No subscriptions found for this account"),
            FailureClass::Subscription
        );
    }

    #[test]
    fn classify_timeout_and_infra() {
        assert_eq!(FailureClass::classify("operation timed out"), FailureClass::Timeout);
        assert_eq!(
            FailureClass::classify("QuotaExceeded: quota for sku B1"),
            FailureClass::Infra
        );
        assert_eq!(FailureClass::classify("segfault"), FailureClass::Unknown);
    }

    #[test]
    fn external_error_carries_class() {
        let err = PipelineError::external("Deployment failed: resource group locked");
        assert_eq!(err.class(), Some(FailureClass::Infra));
        assert!(err.to_string().starts_with("infra failure"));
    }

    #[test]
    fn retryable_classification() {
        assert!(PipelineError::Connection("down".into()).is_retryable());
        assert!(PipelineError::external("timed out").is_retryable());
        assert!(!PipelineError::external("unauthorized").is_retryable());
        assert!(!PipelineError::NoRequirementsFound { attempts: 2 }.is_retryable());
    }

    #[test]
    fn reauth_hint() {
        assert!(FailureClass::Auth.needs_reauth());
        assert!(!FailureClass::Timeout.needs_reauth());
    }
}

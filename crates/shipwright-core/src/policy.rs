//! Per-stage retry/timeout/concurrency policies
//!
//! Every retry budget, deadline and concurrency ceiling lives here as a named
//! constant. Configuration overrides individual fields on top of the stage's
//! constant; Extract's attempt budget is fixed. Call sites read the policy and
//! never hard-code their own numbers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry, timeout and concurrency policy for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePolicy {
    /// Attempts including the first one (no backoff between attempts)
    pub max_attempts: u32,
    /// Deadline per agent call / external process, in seconds
    pub timeout_secs: u64,
    /// Concurrency ceiling for pooled stages
    pub concurrency: usize,
}

impl StagePolicy {
    /// Create new policy
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, timeout_secs: u64, concurrency: usize) -> Self {
        Self {
            max_attempts,
            timeout_secs,
            concurrency,
        }
    }

    /// Deadline as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retries after the first attempt
    #[inline]
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// With concurrency ceiling (at least 1)
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self::new(1, 120, 1)
    }
}

/// Extract attempts: the initial request plus exactly one broadened retry
pub const EXTRACT_ATTEMPTS: u32 = 2;

/// Extract: the initial attempt plus exactly one broadened retry
pub const EXTRACT_POLICY: StagePolicy = StagePolicy::new(EXTRACT_ATTEMPTS, 180, 1);

/// Analyze: one attempt per requirement, four sessions in flight
pub const ANALYZE_POLICY: StagePolicy = StagePolicy::new(1, 300, 4);

/// File issues: one attempt per gap, sequential
pub const FILE_ISSUES_POLICY: StagePolicy = StagePolicy::new(1, 60, 1);

/// Dispatch: sequential because the working copy is shared
pub const DISPATCH_POLICY: StagePolicy = StagePolicy::new(1, 600, 1);

/// Deploy: provisioning can be slow
pub const DEPLOY_POLICY: StagePolicy = StagePolicy::new(1, 1200, 1);

/// Validate: one adjudicator per requirement, four in flight
pub const VALIDATE_POLICY: StagePolicy = StagePolicy::new(1, 180, 4);

/// Field-level override of one stage's policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StagePolicyOverride {
    pub max_attempts: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
}

impl StagePolicyOverride {
    /// Layer the given fields over `base`
    #[must_use]
    pub fn apply(self, base: StagePolicy) -> StagePolicy {
        let mut policy = base;
        if let Some(attempts) = self.max_attempts {
            policy.max_attempts = attempts.max(1);
        }
        if let Some(secs) = self.timeout_secs {
            policy.timeout_secs = secs;
        }
        if let Some(concurrency) = self.concurrency {
            policy = policy.with_concurrency(concurrency);
        }
        policy
    }
}

/// Overrides as written in configuration, one optional table per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StagePolicyOverrides {
    pub extract: StagePolicyOverride,
    pub analyze: StagePolicyOverride,
    pub file_issues: StagePolicyOverride,
    pub dispatch: StagePolicyOverride,
    pub deploy: StagePolicyOverride,
    pub validate: StagePolicyOverride,
}

impl From<StagePolicyOverrides> for StagePolicies {
    fn from(overrides: StagePolicyOverrides) -> Self {
        let mut extract = overrides.extract.apply(EXTRACT_POLICY);
        if extract.max_attempts != EXTRACT_ATTEMPTS {
            tracing::warn!(
                configured = extract.max_attempts,
                fixed = EXTRACT_ATTEMPTS,
                "extract attempts are not configurable, ignoring override"
            );
            extract.max_attempts = EXTRACT_ATTEMPTS;
        }
        Self {
            extract,
            analyze: overrides.analyze.apply(ANALYZE_POLICY),
            file_issues: overrides.file_issues.apply(FILE_ISSUES_POLICY),
            dispatch: overrides.dispatch.apply(DISPATCH_POLICY),
            deploy: overrides.deploy.apply(DEPLOY_POLICY),
            validate: overrides.validate.apply(VALIDATE_POLICY),
        }
    }
}

/// Policies for every stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StagePolicyOverrides")]
pub struct StagePolicies {
    /// Extract policy
    pub extract: StagePolicy,
    /// Analyze policy
    pub analyze: StagePolicy,
    /// File issues policy
    pub file_issues: StagePolicy,
    /// Dispatch policy
    pub dispatch: StagePolicy,
    /// Deploy policy
    pub deploy: StagePolicy,
    /// Validate policy
    pub validate: StagePolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self {
            extract: EXTRACT_POLICY,
            analyze: ANALYZE_POLICY,
            file_issues: FILE_ISSUES_POLICY,
            dispatch: DISPATCH_POLICY,
            deploy: DEPLOY_POLICY,
            validate: VALIDATE_POLICY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_has_exactly_one_retry() {
        assert_eq!(EXTRACT_POLICY.retries(), 1);
    }

    #[test]
    fn pooled_stages_default_to_four() {
        assert_eq!(ANALYZE_POLICY.concurrency, 4);
        assert_eq!(VALIDATE_POLICY.concurrency, 4);
        assert_eq!(DISPATCH_POLICY.concurrency, 1);
    }

    #[test]
    fn overrides_layer_over_stage_constants() {
        let policies = StagePolicies::from(StagePolicyOverrides {
            extract: StagePolicyOverride {
                timeout_secs: Some(60),
                ..Default::default()
            },
            validate: StagePolicyOverride {
                timeout_secs: Some(30),
                ..Default::default()
            },
            analyze: StagePolicyOverride {
                concurrency: Some(0),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(policies.extract, StagePolicy::new(2, 60, 1));
        assert_eq!(policies.validate, StagePolicy::new(1, 30, 4));
        assert_eq!(policies.analyze.concurrency, 1);
        assert_eq!(policies.deploy, DEPLOY_POLICY);
    }

    #[test]
    fn extract_attempts_are_fixed() {
        let policies = StagePolicies::from(StagePolicyOverrides {
            extract: StagePolicyOverride {
                max_attempts: Some(5),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(policies.extract.max_attempts, EXTRACT_ATTEMPTS);
        assert_eq!(policies.extract.retries(), 1);
    }

    #[test]
    fn no_overrides_is_default() {
        assert_eq!(StagePolicies::from(StagePolicyOverrides::default()), StagePolicies::default());
    }

    #[test]
    fn concurrency_floor_is_one() {
        assert_eq!(ANALYZE_POLICY.with_concurrency(0).concurrency, 1);
    }

    #[test]
    fn timeout_conversion() {
        assert_eq!(VALIDATE_POLICY.timeout(), Duration::from_secs(180));
    }
}

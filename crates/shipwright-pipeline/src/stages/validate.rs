//! Validate: judge every requirement against one evidence audit

use crate::context::StageContext;
use crate::prompts;
use shipwright_agent::{run_pool, CapabilityProfile};
use shipwright_core::event::StageResult;
use shipwright_core::{
    EventEmitter, PipelineError, PipelineEvent, ProgressStep, Requirement, Tally, ValidationResult,
    VerdictSource,
};
use shipwright_evidence::{precheck, EvidenceAudit, EvidenceCollector};
use shipwright_parse::parse_verdict;
use std::sync::Arc;

/// Validate outcome
#[derive(Debug, Clone)]
pub struct Validation {
    /// One verdict per requirement, ordered by requirement index
    pub verdicts: Vec<ValidationResult>,
    pub tally: Tally,
    pub audit: Arc<EvidenceAudit>,
}

/// Collect evidence for `url` and judge each requirement against it
///
/// Deterministic pre-check failures short-circuit without an agent
/// session; everything else goes to a fresh adjudicator session.
///
/// # Errors
/// Evidence collection failure. Per-requirement failures are failing
/// verdicts, never errors.
pub async fn validate(
    ctx: &StageContext,
    collector: &EvidenceCollector,
    url: &str,
    requirements: Vec<Requirement>,
    events: &EventEmitter,
) -> Result<Validation, PipelineError> {
    events.progress(ProgressStep::CollectingEvidence, format!("Collecting evidence from {url}"));
    let audit = Arc::new(collector.collect(url).await?);
    if let Some(fatal) = &audit.fatal_error {
        events.log(format!("Evidence is partial: {fatal}"));
    }
    let evidence = serde_json::to_string_pretty(audit.as_ref())
        .map_err(|e| PipelineError::Evidence(format!("audit serialization failed: {e}")))?;

    let policy = ctx.policies().validate;
    events.progress(
        ProgressStep::Judging,
        format!("Judging {} requirement(s), {} at a time", requirements.len(), policy.concurrency),
    );

    let run = run_pool(
        requirements,
        policy.concurrency,
        |_, requirement| {
            let audit = audit.as_ref();
            let evidence = evidence.as_str();
            async move {
                let verdict = judge(ctx, audit, evidence, url, &requirement).await?;
                emit(events, &verdict);
                Ok::<_, PipelineError>(verdict)
            }
        },
        |requirement, failure| {
            let verdict = ValidationResult::fail(
                requirement,
                format!("Validation failed: {failure}"),
                VerdictSource::Failure,
            );
            emit(events, &verdict);
            verdict
        },
    )
    .await;

    let mut verdicts = run.results;
    verdicts.sort_by_key(|v| v.requirement_index);
    let tally = Tally::from_flags(verdicts.iter().map(|v| v.passed));
    tracing::info!(total = tally.total, passed = tally.passed, failed = tally.failed, "validation finished");

    Ok(Validation {
        verdicts,
        tally,
        audit,
    })
}

async fn judge(
    ctx: &StageContext,
    audit: &EvidenceAudit,
    evidence: &str,
    url: &str,
    requirement: &Requirement,
) -> Result<ValidationResult, PipelineError> {
    if let Some(auto) = precheck::check(audit, &requirement.text) {
        tracing::info!(
            requirement_index = requirement.index,
            rule = auto.rule,
            "failed by pre-check, adjudicator skipped"
        );
        return Ok(ValidationResult::fail(requirement, auto.reason, VerdictSource::PreCheck));
    }

    let label = format!("validate-{}", requirement.gap_id());
    let reply = ctx
        .ask_once(
            &label,
            CapabilityProfile::Browser,
            prompts::ADJUDICATOR_SYSTEM,
            &prompts::adjudicate_prompt(requirement, url, evidence),
            ctx.policies().validate.timeout(),
        )
        .await?;

    Ok(match parse_verdict(&reply.text) {
        Some(verdict) => ValidationResult::adjudicated(requirement, verdict.passed, verdict.details),
        None => {
            tracing::warn!(requirement_index = requirement.index, "adjudicator verdict unreadable");
            ValidationResult::fail(
                requirement,
                "Adjudicator reply contained no readable verdict",
                VerdictSource::Failure,
            )
        }
    })
}

fn emit(events: &EventEmitter, verdict: &ValidationResult) {
    events.emit(PipelineEvent::Result {
        result: StageResult::Validation(verdict.clone()),
    });
}

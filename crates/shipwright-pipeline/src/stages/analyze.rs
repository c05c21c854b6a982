//! Analyze: one gap item per requirement, in parallel

use crate::context::StageContext;
use crate::prompts;
use shipwright_agent::{run_pool, CapabilityProfile, PoolStats};
use shipwright_core::{EventEmitter, GapItem, PipelineError, PipelineEvent, ProgressStep, Requirement};
use shipwright_parse::parse_gap_fields;

/// Analyze outcome
#[derive(Debug, Clone)]
pub struct Analysis {
    /// One gap per requirement, ordered by gap id
    pub gaps: Vec<GapItem>,
    pub stats: PoolStats,
}

impl Analysis {
    #[must_use]
    pub fn degraded(&self) -> usize {
        self.gaps.iter().filter(|g| g.is_degraded()).count()
    }
}

/// Compare every requirement with the codebase
///
/// Never fails as a whole: a requirement whose analysis fails gets a
/// degraded gap item carrying the error.
pub async fn analyze(ctx: &StageContext, requirements: Vec<Requirement>, events: &EventEmitter) -> Analysis {
    let policy = ctx.policies().analyze;
    events.progress(
        ProgressStep::Analyzing,
        format!("Analyzing {} requirement(s), {} at a time", requirements.len(), policy.concurrency),
    );

    let run = run_pool(
        requirements,
        policy.concurrency,
        |_, requirement| async move {
            events.emit(PipelineEvent::GapStarted {
                id: requirement.gap_id(),
            });
            let gap = analyze_one(ctx, &requirement).await?;
            events.emit(PipelineEvent::Gap { gap: gap.clone() });
            Ok::<_, PipelineError>(gap)
        },
        |requirement, failure| {
            let gap = GapItem::degraded(requirement, failure);
            events.emit(PipelineEvent::Gap { gap: gap.clone() });
            gap
        },
    )
    .await;

    let mut gaps = run.results;
    gaps.sort_by_key(|g| g.id);
    tracing::info!(total = run.stats.total, failed = run.stats.failed, "analysis finished");
    Analysis {
        gaps,
        stats: run.stats,
    }
}

async fn analyze_one(ctx: &StageContext, requirement: &Requirement) -> Result<GapItem, PipelineError> {
    let label = format!("analyze-{}", requirement.gap_id());
    let prompt = prompts::gap_prompt(requirement, ctx.config().target.repo_slug.as_deref());
    let reply = ctx
        .ask_once(
            &label,
            CapabilityProfile::CodebaseRead,
            prompts::ANALYZE_SYSTEM,
            &prompt,
            ctx.policies().analyze.timeout(),
        )
        .await?;
    parse_gap_fields(&reply.text, requirement)
}

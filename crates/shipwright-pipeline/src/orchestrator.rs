//! Pipeline orchestrator
//!
//! Owns the [`PipelineState`] and runs one stage at a time:
//! - A stage start while another stage runs is rejected with
//!   [`PipelineError::PipelineBusy`]
//! - Each stage gets its own event stream ending in exactly one terminal event
//! - State is replaced at stage boundaries, never mutated mid-stage

use crate::context::StageContext;
use crate::stages;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shipwright_core::event::channel;
use shipwright_core::{EventEmitter, EventStream, GapItem, PipelineError, PipelineState, Requirement, Stage};
use shipwright_evidence::EvidenceCollector;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// One stage invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageCommand {
    /// Pull requirements for meetings matching `scope`; starts a new run
    Extract { scope: String },
    /// Analyze selected requirement indices (empty selects all)
    Analyze { selection: Vec<usize> },
    /// File an issue per analyzed gap
    FileIssues,
    /// Apply every analyzed gap to the working copy
    Dispatch,
    /// Deploy the working copy
    Deploy,
    /// Validate selected requirements against `url`, or the last deployment
    Validate {
        url: Option<String>,
        selection: Vec<usize>,
    },
}

impl StageCommand {
    /// Stage this command runs
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Extract { .. } => Stage::Extract,
            Self::Analyze { .. } => Stage::Analyze,
            Self::FileIssues => Stage::FileIssues,
            Self::Dispatch => Stage::Dispatch,
            Self::Deploy => Stage::Deploy,
            Self::Validate { .. } => Stage::Validate,
        }
    }
}

/// Clears the running flag when a stage ends, however it ends
#[derive(Debug)]
struct RunGuard {
    running: Arc<Mutex<Option<Stage>>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.lock().take();
    }
}

/// Stage runner and state owner
pub struct Pipeline {
    ctx: StageContext,
    collector: Arc<EvidenceCollector>,
    state: Mutex<PipelineState>,
    running: Arc<Mutex<Option<Stage>>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("ctx", &self.ctx)
            .field("running", &*self.running.lock())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create pipeline; the evidence collector shares the context's runner
    #[must_use]
    pub fn new(ctx: StageContext) -> Self {
        let collector = EvidenceCollector::new(ctx.runner(), ctx.config().evidence.clone());
        Self {
            ctx,
            collector: Arc::new(collector),
            state: Mutex::new(PipelineState::default()),
            running: Arc::new(Mutex::new(None)),
        }
    }

    /// Start from an existing state, e.g. requirements read from a file
    #[must_use]
    pub fn with_state(self, state: PipelineState) -> Self {
        *self.state.lock() = state;
        self
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state.lock().clone()
    }

    /// Stage currently running, if any
    #[must_use]
    pub fn running(&self) -> Option<Stage> {
        *self.running.lock()
    }

    fn claim(&self, stage: Stage) -> Result<RunGuard, PipelineError> {
        let mut running = self.running.lock();
        if let Some(current) = *running {
            tracing::warn!(requested = %stage, running = %current, "stage rejected, pipeline busy");
            return Err(PipelineError::PipelineBusy(current.to_string()));
        }
        *running = Some(stage);
        Ok(RunGuard {
            running: Arc::clone(&self.running),
        })
    }

    /// Start `command` on a background task
    ///
    /// Returns the stage's event stream and the task handle.
    ///
    /// # Errors
    /// [`PipelineError::PipelineBusy`] while another stage runs.
    pub fn start(self: &Arc<Self>, command: StageCommand) -> Result<(EventStream, JoinHandle<()>), PipelineError> {
        let guard = self.claim(command.stage())?;
        let (events, stream) = channel(command.stage());
        let pipeline = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            pipeline.run(command, events).await;
        });
        Ok((stream, handle))
    }

    /// Run `command` to completion on the calling task
    ///
    /// The stream ends with `complete` carrying the stage summary, or with
    /// `error`.
    ///
    /// # Errors
    /// [`PipelineError::PipelineBusy`] while another stage runs; stage
    /// failures are reported on the stream.
    pub async fn run_now(&self, command: StageCommand) -> Result<EventStream, PipelineError> {
        let _guard = self.claim(command.stage())?;
        let (events, stream) = channel(command.stage());
        self.run(command, events).await;
        Ok(stream)
    }

    async fn run(&self, command: StageCommand, events: EventEmitter) {
        let stage = command.stage();
        let span = tracing::info_span!("stage", stage = %stage, run_id = %self.state.lock().run_id);
        let outcome = self.execute(command, &events).instrument(span).await;
        match outcome {
            Ok(summary) => {
                tracing::info!(stage = %stage, "stage complete");
                events.complete(summary);
            }
            Err(e) => events.fail(&e),
        }
    }

    async fn execute(&self, command: StageCommand, events: &EventEmitter) -> Result<Value, PipelineError> {
        let ctx = &self.ctx;
        match command {
            StageCommand::Extract { scope } => {
                let extraction = stages::extract(ctx, &scope, events).await?;
                let summary = json!({
                    "meeting": extraction.meeting.title,
                    "requirements": extraction.requirements.len(),
                    "attempts": extraction.attempts,
                });
                *self.state.lock() = PipelineState::fresh(extraction.meeting, extraction.requirements);
                Ok(summary)
            }
            StageCommand::Analyze { selection } => {
                let requirements = self.requirements(&selection)?;
                let analysis = stages::analyze(ctx, requirements, events).await;
                let summary = json!({
                    "total": analysis.gaps.len(),
                    "degraded": analysis.degraded(),
                });
                self.update(|state| {
                    let gaps = merge_gaps(&state.gaps, analysis.gaps);
                    state.with_gaps(gaps)
                });
                Ok(summary)
            }
            StageCommand::FileIssues => {
                let gaps = self.gaps()?;
                let items = stages::file_issues(ctx, &gaps, events).await;
                let failed = items.iter().filter(|i| i.error.is_some()).count();
                let summary = json!({
                    "total": items.len(),
                    "filed": items.iter().filter(|i| i.is_created()).count(),
                    "assigned": items.iter().filter(|i| i.assigned).count(),
                    "failed": failed,
                });
                self.update(|state| state.with_work_items(items));
                Ok(summary)
            }
            StageCommand::Dispatch => {
                let gaps = self.gaps()?;
                let results = stages::dispatch(ctx, &gaps, events).await;
                self.update(|state| state.with_results(results));
                let tally = self.state.lock().dispatch_tally();
                Ok(json!({
                    "total": tally.total,
                    "succeeded": tally.passed,
                    "failed": tally.failed,
                }))
            }
            StageCommand::Deploy => {
                let deployment = stages::deploy(ctx, events).await?;
                let summary = json!({
                    "url": deployment.url,
                    "mode": deployment.mode,
                    "mergedBranches": deployment.merged_branches,
                });
                self.update(|state| state.with_deployment(deployment));
                Ok(summary)
            }
            StageCommand::Validate { url, selection } => {
                let url = url
                    .or_else(|| self.state.lock().deployment.as_ref().map(|d| d.url.clone()))
                    .ok_or_else(|| PipelineError::InvalidInput("no URL given and nothing deployed yet".to_string()))?;
                let requirements = self.requirements(&selection)?;
                let validation = stages::validate(ctx, &self.collector, &url, requirements, events).await?;
                let tally = validation.tally;
                self.update(|state| state.with_verdicts(validation.verdicts));
                Ok(json!({
                    "url": url,
                    "total": tally.total,
                    "passed": tally.passed,
                    "failed": tally.failed,
                }))
            }
        }
    }

    fn update(&self, f: impl FnOnce(PipelineState) -> PipelineState) {
        let mut state = self.state.lock();
        let current = std::mem::take(&mut *state);
        *state = f(current);
    }

    fn requirements(&self, selection: &[usize]) -> Result<Vec<Requirement>, PipelineError> {
        let requirements = self.state.lock().selected_requirements(selection);
        if requirements.is_empty() {
            return Err(PipelineError::InvalidInput(
                "no requirements selected; run extract first".to_string(),
            ));
        }
        Ok(requirements)
    }

    fn gaps(&self) -> Result<Vec<GapItem>, PipelineError> {
        let gaps = self.state.lock().gaps.clone();
        if gaps.is_empty() {
            return Err(PipelineError::InvalidInput("no gaps analyzed; run analyze first".to_string()));
        }
        Ok(gaps)
    }
}

/// Previous gaps with fresh ones replacing those of the same id
fn merge_gaps(previous: &[GapItem], fresh: Vec<GapItem>) -> Vec<GapItem> {
    let mut merged: Vec<GapItem> = previous
        .iter()
        .filter(|old| !fresh.iter().any(|new| new.id == old.id))
        .cloned()
        .collect();
    merged.extend(fresh);
    merged
}

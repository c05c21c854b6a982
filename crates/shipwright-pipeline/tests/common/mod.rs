//! Shared rig for pipeline tests

#![allow(dead_code)]

use serde_json::Value;
use shipwright_core::{
    Complexity, ErrorPayload, GapId, GapItem, MeetingInfo, PipelineEvent, PipelineState,
    Requirement, ShipwrightConfig,
};
use shipwright_pipeline::{Pipeline, StageCommand, StageContext};
use shipwright_test_utils::{ScriptedBackend, ScriptedRunner};
use std::sync::Arc;
use tempfile::TempDir;

/// Scripted backend and runner over a temp working copy
pub struct Rig {
    pub backend: ScriptedBackend,
    pub runner: ScriptedRunner,
    pub repo: TempDir,
    pub harness: TempDir,
}

impl Rig {
    pub fn new(backend: ScriptedBackend, runner: ScriptedRunner) -> Self {
        let harness = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(harness.path().join("node_modules/playwright")).unwrap();
        Self {
            backend,
            runner,
            repo: tempfile::tempdir().unwrap(),
            harness,
        }
    }

    pub fn config(&self) -> ShipwrightConfig {
        let mut config = ShipwrightConfig::default().with_repo_path(self.repo.path());
        config.pipeline.settle_delay_ms = 0;
        config.evidence.harness_dir = self.harness.path().to_path_buf();
        config
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline_with(|_| {})
    }

    pub fn pipeline_with(&self, tweak: impl FnOnce(&mut ShipwrightConfig)) -> Arc<Pipeline> {
        self.seeded_with(PipelineState::default(), tweak)
    }

    pub fn seeded(&self, state: PipelineState) -> Arc<Pipeline> {
        self.seeded_with(state, |_| {})
    }

    pub fn seeded_with(&self, state: PipelineState, tweak: impl FnOnce(&mut ShipwrightConfig)) -> Arc<Pipeline> {
        let mut config = self.config();
        tweak(&mut config);
        let ctx = StageContext::new(Arc::new(self.backend.clone()), self.runner.clone().into_arc(), config);
        Arc::new(Pipeline::new(ctx).with_state(state))
    }
}

/// Run one stage and collect its whole stream
pub async fn run(pipeline: &Pipeline, command: StageCommand) -> Vec<PipelineEvent> {
    pipeline.run_now(command).await.unwrap().collect().await
}

pub fn summary(events: &[PipelineEvent]) -> &Value {
    match events.last() {
        Some(PipelineEvent::Complete(summary)) => summary,
        other => panic!("expected complete, got {other:?}"),
    }
}

pub fn failure(events: &[PipelineEvent]) -> &ErrorPayload {
    match events.last() {
        Some(PipelineEvent::Error(payload)) => payload,
        other => panic!("expected error, got {other:?}"),
    }
}

/// Event names, progress events left out
pub fn names(events: &[PipelineEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter(|e| !matches!(e, PipelineEvent::Progress { .. }))
        .map(PipelineEvent::name)
        .collect()
}

pub fn requirements_state(texts: &[&str]) -> PipelineState {
    PipelineState::fresh(MeetingInfo::default(), Requirement::from_texts(texts.iter().copied()))
}

pub fn gap(id: usize, requirement: &str) -> GapItem {
    GapItem {
        id: GapId(id),
        requirement: requirement.to_string(),
        current_state: "Static landing page".to_string(),
        gap: format!("{requirement} is missing"),
        complexity: Complexity::Low,
        estimated_effort: "1 hour".to_string(),
        details: "Edit index.html".to_string(),
    }
}

pub fn gaps_state(requirements: &[&str]) -> PipelineState {
    let gaps = requirements
        .iter()
        .enumerate()
        .map(|(i, r)| gap(i + 1, r))
        .collect();
    requirements_state(requirements).with_gaps(gaps)
}

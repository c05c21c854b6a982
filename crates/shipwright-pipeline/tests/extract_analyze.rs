//! Extract and Analyze stages through the orchestrator

mod common;

use common::{failure, names, requirements_state, run, summary, Rig};
use pretty_assertions::assert_eq;
use shipwright_agent::CapabilityProfile::{CodebaseRead, MeetingData};
use shipwright_core::{Complexity, GapId, PipelineError, PipelineEvent, ProgressStep, Stage};
use shipwright_pipeline::StageCommand;
use shipwright_test_utils::{ScriptedBackend, ScriptedRunner};

const MEETING: &str = r#"Here is the meeting I found:
{"title": "Website sync", "date": "2026-10-12", "participants": ["Ana", "Ben"],
 "summary": "Compliance pass on the marketing site",
 "requirements": ["Add a contact form with reCAPTCHA", "Publish a dedicated privacy page"]}"#;

const GAP: &str = r#"{"currentState": "No form on the page", "gap": "A contact form is missing",
"complexity": "High", "estimatedEffort": "4 hours", "details": "Add a form to index.html"}"#;

fn extract(scope: &str) -> StageCommand {
    StageCommand::Extract {
        scope: scope.to_string(),
    }
}

fn steps(events: &[PipelineEvent]) -> Vec<ProgressStep> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress { step, .. } => Some(*step),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn extract_emits_meeting_then_requirements() {
    let rig = Rig::new(
        ScriptedBackend::new().reply(MeetingData, "Find the most recent meeting", MEETING),
        ScriptedRunner::new(),
    );
    let pipeline = rig.pipeline();

    let events = run(&pipeline, extract("website sync")).await;

    assert_eq!(names(&events), ["meeting-info", "requirements", "complete"]);
    assert_eq!(
        steps(&events),
        [ProgressStep::Connecting, ProgressStep::Fetching, ProgressStep::ExtractingRequirements]
    );
    assert_eq!(summary(&events)["requirements"], 2);
    assert_eq!(summary(&events)["attempts"], 1);

    let state = pipeline.state();
    assert_eq!(state.stage, Stage::Extract);
    assert_eq!(state.meeting.unwrap().title, "Website sync");
    assert_eq!(state.requirements[1].text, "Publish a dedicated privacy page");
    assert_eq!(state.requirements[1].index, 1);

    let log = rig.backend.log();
    assert_eq!(log.opened_for(MeetingData), 1);
    assert_eq!(log.closed, 1);
}

#[tokio::test]
async fn extract_retries_once_in_the_same_session() {
    let rig = Rig::new(
        ScriptedBackend::new()
            .reply_once(MeetingData, "Find the most recent meeting", "[]")
            .reply(MeetingData, "Search more broadly", MEETING),
        ScriptedRunner::new(),
    );
    let pipeline = rig.pipeline();

    let events = run(&pipeline, extract("website sync")).await;

    assert_eq!(summary(&events)["attempts"], 2);
    assert!(steps(&events).contains(&ProgressStep::Retrying));
    let log = rig.backend.log();
    assert_eq!(log.opened_for(MeetingData), 1);
    assert_eq!(log.prompts_for(MeetingData).len(), 2);
}

#[tokio::test]
async fn extract_gives_up_after_the_broadened_retry() {
    let rig = Rig::new(ScriptedBackend::new().reply_any("", "[]"), ScriptedRunner::new());
    let pipeline = rig.pipeline();

    let events = run(&pipeline, extract("nothing")).await;

    let err = failure(&events);
    assert!(err.error.contains("no requirements found after 2 attempt(s)"), "{}", err.error);
    assert!(pipeline.state().requirements.is_empty());
    assert_eq!(rig.backend.log().closed, 1);
}

#[tokio::test]
async fn extract_reports_an_empty_source() {
    let rig = Rig::new(ScriptedBackend::new(), ScriptedRunner::new());

    let events = run(&rig.pipeline(), extract("anything")).await;

    assert!(failure(&events).error.starts_with("no data found"));
}

#[tokio::test]
async fn extract_reports_unreachable_source() {
    let rig = Rig::new(
        ScriptedBackend::new().refuse_sessions("meeting connector not configured"),
        ScriptedRunner::new(),
    );

    let events = run(&rig.pipeline(), extract("anything")).await;

    let err = failure(&events);
    assert!(err.error.starts_with("connection error"), "{}", err.error);
    assert!(err.error.contains("meeting connector not configured"));
}

#[tokio::test]
async fn analyze_degrades_failed_items_and_keeps_ids() {
    let rig = Rig::new(
        ScriptedBackend::new()
            .reply(CodebaseRead, "Requirement 1:", GAP)
            .fail(CodebaseRead, "Requirement 2:", "model overloaded")
            .reply(CodebaseRead, "Requirement 3:", GAP),
        ScriptedRunner::new(),
    );
    let pipeline = rig.seeded(requirements_state(&[
        "Add a contact form",
        "Add dark mode",
        "Add a footer",
    ]));

    let events = run(&pipeline, StageCommand::Analyze { selection: vec![] }).await;

    assert_eq!(summary(&events)["total"], 3);
    assert_eq!(summary(&events)["degraded"], 1);
    let started = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::GapStarted { .. }))
        .count();
    assert_eq!(started, 3);

    let gaps = pipeline.state().gaps;
    let ids: Vec<GapId> = gaps.iter().map(|g| g.id).collect();
    assert_eq!(ids, [GapId(1), GapId(2), GapId(3)]);
    assert_eq!(gaps[0].complexity, Complexity::High);
    assert_eq!(gaps[0].requirement, "Add a contact form");
    assert!(gaps[1].is_degraded());
    assert_eq!(gaps[1].complexity, Complexity::Medium);
    assert!(gaps[1].gap.contains("model overloaded"), "{}", gaps[1].gap);

    let log = rig.backend.log();
    assert_eq!(log.opened_for(CodebaseRead), 3);
    assert!(log.opened.iter().all(|c| c.working_dir.as_deref() == Some(rig.repo.path())));
}

#[tokio::test]
async fn analyze_selection_replaces_only_selected_gaps() {
    let rig = Rig::new(
        ScriptedBackend::new().reply(CodebaseRead, "Requirement", GAP),
        ScriptedRunner::new(),
    );
    let pipeline = rig.seeded(requirements_state(&["Add a contact form", "Add dark mode"]));

    run(&pipeline, StageCommand::Analyze { selection: vec![] }).await;
    let events = run(&pipeline, StageCommand::Analyze { selection: vec![1] }).await;

    assert_eq!(summary(&events)["total"], 1);
    assert_eq!(pipeline.state().gaps.len(), 2);
    assert_eq!(rig.backend.log().opened_for(CodebaseRead), 3);
}

#[tokio::test]
async fn analyze_without_requirements_is_rejected() {
    let rig = Rig::new(ScriptedBackend::new(), ScriptedRunner::new());

    let events = run(&rig.pipeline(), StageCommand::Analyze { selection: vec![] }).await;

    assert!(failure(&events).error.starts_with("invalid input"));
    assert_eq!(rig.backend.log().opened.len(), 0);
}

#[tokio::test]
async fn second_stage_is_rejected_while_one_runs() {
    let rig = Rig::new(
        ScriptedBackend::new().stall(MeetingData, "Find the most recent meeting"),
        ScriptedRunner::new(),
    );
    let pipeline = rig.pipeline_with(|config| {
        config.pipeline.policies.extract = config.pipeline.policies.extract.with_timeout_secs(1);
    });

    let (stream, handle) = pipeline.start(extract("website sync")).unwrap();
    assert_eq!(pipeline.running(), Some(Stage::Extract));

    let busy = pipeline.start(StageCommand::Analyze { selection: vec![] }).unwrap_err();
    assert!(matches!(busy, PipelineError::PipelineBusy(ref s) if s == "extract"), "{busy}");

    handle.await.unwrap();
    let events = stream.collect().await;
    assert!(failure(&events).error.contains("timed out"));
    assert_eq!(pipeline.running(), None);
}

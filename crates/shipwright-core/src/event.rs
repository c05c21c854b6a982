//! Progress/event protocol
//!
//! Every stage writes a typed, one-directional stream of named events and
//! finishes with exactly one terminal event (`complete` or `error`).
//! [`EventEmitter::complete`] and [`EventEmitter::fail`] consume the emitter,
//! so a second terminal event cannot be written and the stream closes as
//! soon as the terminal event is sent.
//!
//! Wire shape: `{"event": "<kebab-name>", "data": {...}}`.

use crate::error::{FailureClass, PipelineError};
use crate::state::Stage;
use crate::types::{
    CodeChangeResult, GapId, GapItem, MeetingInfo, Requirement, ValidationResult, WorkItem,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Named progress steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStep {
    Connecting,
    Fetching,
    ExtractingRequirements,
    Retrying,
    Analyzing,
    FilingIssues,
    AssigningAgents,
    ResettingWorkingCopy,
    GeneratingChanges,
    WritingFiles,
    Committing,
    Merging,
    Scaffolding,
    Provisioning,
    Deploying,
    InstallingHarness,
    CollectingEvidence,
    Judging,
}

/// Payload of a `result` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageResult {
    /// Dispatch outcome
    CodeChange(CodeChangeResult),
    /// Validation verdict
    Validation(ValidationResult),
}

/// Payload of an `error` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Human-readable message
    pub error: String,
    /// Failure class for external process failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<FailureClass>,
    /// Suggested action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&PipelineError> for ErrorPayload {
    fn from(err: &PipelineError) -> Self {
        let class = err.class();
        Self {
            error: err.to_string(),
            class,
            hint: class.map(|c| c.hint().to_string()),
        }
    }
}

/// Pipeline event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PipelineEvent {
    Progress {
        step: ProgressStep,
        message: String,
    },
    MeetingInfo(MeetingInfo),
    Requirements {
        requirements: Vec<Requirement>,
    },
    GapStarted {
        id: GapId,
    },
    Gap {
        gap: GapItem,
    },
    Issue {
        issue: WorkItem,
    },
    Result {
        result: StageResult,
    },
    Log {
        message: String,
    },
    Complete(serde_json::Value),
    Error(ErrorPayload),
}

impl PipelineEvent {
    /// Wire name of this event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::MeetingInfo(_) => "meeting-info",
            Self::Requirements { .. } => "requirements",
            Self::GapStarted { .. } => "gap-started",
            Self::Gap { .. } => "gap",
            Self::Issue { .. } => "issue",
            Self::Result { .. } => "result",
            Self::Log { .. } => "log",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }

    /// Whether this event ends a stream
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }
}

/// Create a stream for one stage
#[must_use]
pub fn channel(stage: Stage) -> (EventEmitter, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventEmitter {
            stage,
            tx: Some(tx),
        },
        EventStream { rx },
    )
}

/// Writing half of a stage stream
#[derive(Debug)]
pub struct EventEmitter {
    stage: Stage,
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventEmitter {
    /// Stage this emitter belongs to
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Send a non-terminal event
    ///
    /// Terminal events must go through [`Self::complete`] / [`Self::fail`];
    /// passing one here is dropped with a warning.
    pub fn emit(&self, event: PipelineEvent) {
        if event.is_terminal() {
            tracing::warn!(stage = %self.stage, "terminal event passed to emit(), dropped");
            return;
        }
        self.send(event);
    }

    /// Send a `progress` event
    pub fn progress(&self, step: ProgressStep, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(stage = %self.stage, ?step, "{}", message);
        self.send(PipelineEvent::Progress { step, message });
    }

    /// Send a `log` event
    pub fn log(&self, message: impl Into<String>) {
        self.send(PipelineEvent::Log {
            message: message.into(),
        });
    }

    /// Finish the stream successfully
    pub fn complete(mut self, summary: serde_json::Value) {
        self.finish(PipelineEvent::Complete(summary));
    }

    /// Finish the stream with an error
    pub fn fail(mut self, err: &PipelineError) {
        tracing::error!(stage = %self.stage, error = %err, "stage failed");
        self.finish(PipelineEvent::Error(ErrorPayload::from(err)));
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // Observer may have gone away; the stage still runs to completion.
            let _ = tx.send(event);
        }
    }

    fn finish(&mut self, event: PipelineEvent) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(event);
        }
    }
}

impl Drop for EventEmitter {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(stage = %self.stage, "stage ended without a terminal event");
            self.finish(PipelineEvent::Error(ErrorPayload {
                error: format!("{} stage ended unexpectedly", self.stage),
                class: None,
                hint: None,
            }));
        }
    }
}

/// Reading half of a stage stream
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<PipelineEvent>,
}

impl EventStream {
    /// Next event, `None` once the stream is closed
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.rx.recv().await
    }

    /// Drain everything currently buffered without waiting
    #[must_use]
    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Collect events until the stream closes
    pub async fn collect(mut self) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.rx.recv().await {
            out.push(event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerdictSource;

    #[tokio::test]
    async fn exactly_one_terminal_event() {
        let (emitter, stream) = channel(Stage::Analyze);
        emitter.progress(ProgressStep::Analyzing, "analyzing 2 requirements");
        emitter.emit(PipelineEvent::GapStarted { id: GapId(1) });
        emitter.complete(serde_json::json!({ "total": 1 }));

        let events = stream.collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn dropped_emitter_reports_error() {
        let (emitter, stream) = channel(Stage::Deploy);
        emitter.log("starting");
        drop(emitter);

        let events = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].name(), "error");
    }

    #[tokio::test]
    async fn emit_rejects_terminal_events() {
        let (emitter, stream) = channel(Stage::Extract);
        emitter.emit(PipelineEvent::Complete(serde_json::json!({})));
        emitter.fail(&PipelineError::NoRequirementsFound { attempts: 2 });

        let events = stream.collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "error");
    }

    #[test]
    fn wire_shape_is_tagged() {
        let event = PipelineEvent::GapStarted { id: GapId(3) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "gap-started");
        assert_eq!(json["data"]["id"], 3);

        let progress = PipelineEvent::Progress {
            step: ProgressStep::ExtractingRequirements,
            message: "m".into(),
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["data"]["step"], "extracting-requirements");
    }

    #[test]
    fn error_payload_carries_hint() {
        let err = PipelineError::external("ERROR: not logged in");
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.class, Some(FailureClass::Auth));
        assert!(payload.hint.unwrap().contains("Re-authenticate"));
    }

    #[test]
    fn result_payload_round_trips_untagged() {
        let req = Requirement::new(0, "r");
        let event = PipelineEvent::Result {
            result: StageResult::Validation(ValidationResult::fail(
                &req,
                "d",
                VerdictSource::PreCheck,
            )),
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: PipelineEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}

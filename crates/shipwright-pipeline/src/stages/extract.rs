//! Extract: meeting source to requirement list

use crate::context::{release, StageContext};
use crate::prompts;
use shipwright_agent::CapabilityProfile;
use shipwright_core::{
    EventEmitter, MeetingInfo, PipelineError, PipelineEvent, ProgressStep, Requirement,
    EXTRACT_ATTEMPTS,
};
use shipwright_parse::parse_meeting;

/// Extract outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub meeting: MeetingInfo,
    pub requirements: Vec<Requirement>,
    /// Prompts sent, the broadened retry included
    pub attempts: u32,
}

/// Pull requirements for the meeting matching `scope`
///
/// One session; when the first answer holds no requirements the same
/// session gets one broadened request.
///
/// # Errors
/// - [`PipelineError::Connection`] when no session can be opened
/// - [`PipelineError::NoDataFound`] when the source answered with nothing at all
/// - [`PipelineError::NoRequirementsFound`] when the retry budget is spent
pub async fn extract(ctx: &StageContext, scope: &str, events: &EventEmitter) -> Result<Extraction, PipelineError> {
    let policy = ctx.policies().extract;

    events.progress(ProgressStep::Connecting, "Connecting to the meeting source");
    let mut session = ctx
        .open_session("extract", CapabilityProfile::MeetingData, prompts::MEETING_SYSTEM)
        .await?;

    let mut attempts = 0;
    let mut meeting = MeetingInfo::default();
    let mut requirements = Vec::new();
    let mut answered = false;

    while attempts < EXTRACT_ATTEMPTS && requirements.is_empty() {
        let prompt = if attempts == 0 {
            events.progress(ProgressStep::Fetching, format!("Searching meetings for \"{scope}\""));
            prompts::meeting_prompt(scope)
        } else {
            events.progress(ProgressStep::Retrying, "No requirements found, retrying with a broader search");
            prompts::meeting_retry_prompt(scope)
        };
        attempts += 1;

        let reply = match session.send_and_wait(&prompt, policy.timeout()).await {
            Ok(reply) => reply,
            Err(e) => {
                release(session).await;
                return Err(e.into());
            }
        };

        events.progress(ProgressStep::ExtractingRequirements, "Extracting requirements");
        answered |= !reply.text.trim().is_empty();
        let parsed = parse_meeting(&reply.text);
        if meeting == MeetingInfo::default() {
            meeting = parsed.meeting;
        }
        requirements = parsed.requirements;
        tracing::info!(attempt = attempts, found = requirements.len(), "meeting reply parsed");
    }
    release(session).await;

    if requirements.is_empty() {
        return Err(if answered {
            PipelineError::NoRequirementsFound { attempts }
        } else {
            PipelineError::NoDataFound(format!("meeting source returned nothing for \"{scope}\""))
        });
    }

    let requirements = Requirement::from_texts(requirements);
    events.emit(PipelineEvent::MeetingInfo(meeting.clone()));
    events.emit(PipelineEvent::Requirements {
        requirements: requirements.clone(),
    });

    Ok(Extraction {
        meeting,
        requirements,
        attempts,
    })
}

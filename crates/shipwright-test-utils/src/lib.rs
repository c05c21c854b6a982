//! Testing utilities for the Shipwright workspace
//!
//! Scripted agent backend, scripted process runner, and evidence fixtures.

#![allow(missing_docs)]

pub mod fixtures;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipwright_agent::{
    AgentBackend, AgentConversation, AgentEvent, CapabilityProfile, ProcessError, ProcessOutput,
    ProcessRunner, ProcessSpec, SessionConfig, SessionError,
};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Reply {
    /// Final message, then idle
    Text(String),
    /// Raw events, sent verbatim
    Events(Vec<AgentEvent>),
    /// Never answers
    Stall,
    /// Agent-side error
    Error(String),
}

#[derive(Debug, Clone)]
struct ReplyRule {
    profile: Option<CapabilityProfile>,
    needle: String,
    reply: Reply,
    once: bool,
}

/// What a [`ScriptedBackend`] saw
#[derive(Debug, Clone, Default)]
pub struct BackendLog {
    pub opened: Vec<SessionConfig>,
    pub prompts: Vec<(String, CapabilityProfile, String)>,
    pub closed: usize,
    pub aborted: usize,
}

impl BackendLog {
    /// Prompts sent to sessions with `profile`
    pub fn prompts_for(&self, profile: CapabilityProfile) -> Vec<&str> {
        self.prompts
            .iter()
            .filter(|(_, p, _)| *p == profile)
            .map(|(_, _, text)| text.as_str())
            .collect()
    }

    /// Sessions opened with `profile`
    pub fn opened_for(&self, profile: CapabilityProfile) -> usize {
        self.opened.iter().filter(|c| c.profile == profile).count()
    }
}

/// Agent backend answering prompts from a rule list
///
/// Rules match on capability profile and a prompt substring, first match
/// wins; `*_once` rules are consumed. Unmatched prompts get an empty reply.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    rules: Arc<Mutex<Vec<ReplyRule>>>,
    log: Arc<Mutex<BackendLog>>,
    refuse: Arc<Mutex<Option<String>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, profile: Option<CapabilityProfile>, needle: &str, reply: Reply, once: bool) -> Self {
        self.rules.lock().push(ReplyRule {
            profile,
            needle: needle.to_string(),
            reply,
            once,
        });
        self
    }

    pub fn reply(self, profile: CapabilityProfile, needle: &str, text: &str) -> Self {
        self.push(Some(profile), needle, Reply::Text(text.to_string()), false)
    }

    pub fn reply_once(self, profile: CapabilityProfile, needle: &str, text: &str) -> Self {
        self.push(Some(profile), needle, Reply::Text(text.to_string()), true)
    }

    pub fn reply_any(self, needle: &str, text: &str) -> Self {
        self.push(None, needle, Reply::Text(text.to_string()), false)
    }

    pub fn events(self, profile: CapabilityProfile, needle: &str, events: Vec<AgentEvent>) -> Self {
        self.push(Some(profile), needle, Reply::Events(events), false)
    }

    pub fn stall(self, profile: CapabilityProfile, needle: &str) -> Self {
        self.push(Some(profile), needle, Reply::Stall, false)
    }

    pub fn fail(self, profile: CapabilityProfile, needle: &str, message: &str) -> Self {
        self.push(Some(profile), needle, Reply::Error(message.to_string()), false)
    }

    /// Every `open` fails with `message`
    pub fn refuse_sessions(self, message: &str) -> Self {
        *self.refuse.lock() = Some(message.to_string());
        self
    }

    pub fn log(&self) -> BackendLog {
        self.log.lock().clone()
    }

    fn take_reply(&self, profile: CapabilityProfile, prompt: &str) -> Reply {
        let mut rules = self.rules.lock();
        let found = rules
            .iter()
            .position(|r| r.profile.map_or(true, |p| p == profile) && prompt.contains(&r.needle));
        match found {
            Some(idx) if rules[idx].once => rules.remove(idx).reply,
            Some(idx) => rules[idx].reply.clone(),
            None => Reply::Text(String::new()),
        }
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn AgentConversation>, SessionError> {
        let refused = self.refuse.lock().clone();
        if let Some(message) = refused {
            return Err(SessionError::Spawn {
                label: config.label.clone(),
                message,
            });
        }
        self.log.lock().opened.push(config.clone());
        Ok(Box::new(ScriptedConversation {
            backend: self.clone(),
            label: config.label.clone(),
            profile: config.profile,
            pending: VecDeque::new(),
            stalled: false,
        }))
    }
}

struct ScriptedConversation {
    backend: ScriptedBackend,
    label: String,
    profile: CapabilityProfile,
    pending: VecDeque<AgentEvent>,
    stalled: bool,
}

#[async_trait]
impl AgentConversation for ScriptedConversation {
    async fn send(&mut self, prompt: &str) -> Result<(), SessionError> {
        self.backend
            .log
            .lock()
            .prompts
            .push((self.label.clone(), self.profile, prompt.to_string()));
        match self.backend.take_reply(self.profile, prompt) {
            Reply::Text(text) => {
                self.pending.push_back(AgentEvent::Message { text });
                self.pending.push_back(AgentEvent::Idle);
            }
            Reply::Events(events) => self.pending.extend(events),
            Reply::Stall => self.stalled = true,
            Reply::Error(message) => self.pending.push_back(AgentEvent::Error { message }),
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<AgentEvent>, SessionError> {
        if self.stalled {
            futures::future::pending::<()>().await;
        }
        Ok(self.pending.pop_front())
    }

    async fn answer_permission(&mut self, _id: &str, _approved: bool) -> Result<(), SessionError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.backend.log.lock().closed += 1;
        Ok(())
    }

    fn abort(&mut self) {
        self.backend.log.lock().aborted += 1;
    }
}

#[derive(Debug, Clone)]
enum RunOutcome {
    Output(ProcessOutput),
    Timeout,
    NotFound,
}

#[derive(Debug, Clone)]
struct RunRule {
    program: String,
    prefix: Vec<String>,
    outcome: RunOutcome,
    once: bool,
}

/// Process runner answering from a rule list
///
/// Rules match on program and an argument prefix, first match wins;
/// `*_once` rules are consumed. Unmatched commands succeed with no output.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    rules: Arc<Mutex<Vec<RunRule>>>,
    calls: Arc<Mutex<Vec<ProcessSpec>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, program: &str, prefix: &[&str], outcome: RunOutcome, once: bool) -> Self {
        self.rules.lock().push(RunRule {
            program: program.to_string(),
            prefix: prefix.iter().map(|a| (*a).to_string()).collect(),
            outcome,
            once,
        });
        self
    }

    pub fn on(self, program: &str, prefix: &[&str], output: ProcessOutput) -> Self {
        self.push(program, prefix, RunOutcome::Output(output), false)
    }

    pub fn on_once(self, program: &str, prefix: &[&str], output: ProcessOutput) -> Self {
        self.push(program, prefix, RunOutcome::Output(output), true)
    }

    pub fn timeout_on(self, program: &str, prefix: &[&str]) -> Self {
        self.push(program, prefix, RunOutcome::Timeout, false)
    }

    pub fn missing(self, program: &str) -> Self {
        self.push(program, &[], RunOutcome::NotFound, false)
    }

    pub fn calls(&self) -> Vec<ProcessSpec> {
        self.calls.lock().clone()
    }

    /// Argument lists of every call to `program`
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program == program)
            .map(|c| c.args.clone())
            .collect()
    }

    /// Whether `program` ran with arguments starting with `prefix`
    pub fn ran(&self, program: &str, prefix: &[&str]) -> bool {
        self.calls_to(program).iter().any(|args| starts_with(args, prefix))
    }

    pub fn into_arc(self) -> Arc<dyn ProcessRunner> {
        Arc::new(self)
    }
}

fn starts_with(args: &[String], prefix: &[impl AsRef<str>]) -> bool {
    args.len() >= prefix.len() && prefix.iter().zip(args).all(|(p, a)| p.as_ref() == a)
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().push(spec.clone());
        let outcome = {
            let mut rules = self.rules.lock();
            let found = rules
                .iter()
                .position(|r| r.program == spec.program && starts_with(&spec.args, r.prefix.as_slice()));
            match found {
                Some(idx) if rules[idx].once => Some(rules.remove(idx).outcome),
                Some(idx) => Some(rules[idx].outcome.clone()),
                None => None,
            }
        };
        match outcome {
            Some(RunOutcome::Output(output)) => Ok(output),
            Some(RunOutcome::Timeout) => Err(ProcessError::Timeout {
                program: spec.program.clone(),
                secs: spec.timeout.as_secs(),
            }),
            Some(RunOutcome::NotFound) => Err(ProcessError::NotFound {
                program: spec.program.clone(),
            }),
            None => Ok(ProcessOutput::ok("")),
        }
    }
}

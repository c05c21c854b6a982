//! Shipwright command line
//!
//! Runs pipeline stages against a configured agent runtime and prints every
//! stage event as one JSON line on stdout. Logs go to stderr.

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use shipwright_agent::{CliAgentBackend, TokioProcessRunner};
use shipwright_core::{
    MeetingInfo, PipelineEvent, PipelineState, Requirement, ShipwrightConfig,
};
use shipwright_parse::{extract_file_edits, parse_requirements};
use shipwright_pipeline::{Pipeline, StageCommand, StageContext};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(cli.config.as_deref(), cli.repo.as_deref())?;
    tracing::debug!(
        repo = %config.target.repo_path.display(),
        agent = %config.agent.command,
        "configuration loaded"
    );

    let ok = match cli.command {
        Command::Run(args) => {
            let pipeline = build_pipeline(config, PipelineState::default());
            let mut plan = vec![
                StageCommand::Extract { scope: args.scope },
                StageCommand::Analyze { selection: vec![] },
            ];
            if args.file_issues {
                plan.push(StageCommand::FileIssues);
            }
            plan.extend([
                StageCommand::Dispatch,
                StageCommand::Deploy,
                StageCommand::Validate {
                    url: None,
                    selection: vec![],
                },
            ]);
            run_plan(&pipeline, plan).await?
        }
        Command::Extract(args) => {
            let pipeline = build_pipeline(config, PipelineState::default());
            run_stage(&pipeline, StageCommand::Extract { scope: args.scope }).await?
        }
        Command::Analyze(args) => {
            let state = requirements_state(&args.requirements).await?;
            let pipeline = build_pipeline(config, state);
            run_stage(&pipeline, StageCommand::Analyze { selection: vec![] }).await?
        }
        Command::Validate(args) => {
            let state = requirements_state(&args.requirements).await?;
            let pipeline = build_pipeline(config, state);
            let command = StageCommand::Validate {
                url: Some(args.url),
                selection: vec![],
            };
            run_stage(&pipeline, command).await?
        }
        Command::ParseEdits(args) => {
            let reply = tokio::fs::read_to_string(&args.file)
                .await
                .with_context(|| format!("cannot read {}", args.file.display()))?;
            let edits = extract_file_edits(&reply);
            println!("{}", serde_json::to_string_pretty(&edits)?);
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shipwright=info"));
    let plain = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let structured = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

fn load_config(path: Option<&Path>, repo: Option<&Path>) -> Result<ShipwrightConfig> {
    let config = match path {
        Some(path) => ShipwrightConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ShipwrightConfig::default(),
    };
    let config = config.with_env_overrides();
    Ok(match repo {
        Some(repo) => config.with_repo_path(repo),
        None => config,
    })
}

fn build_pipeline(config: ShipwrightConfig, state: PipelineState) -> Arc<Pipeline> {
    let backend = Arc::new(CliAgentBackend::new(config.agent.clone()));
    let ctx = StageContext::new(backend, Arc::new(TokioProcessRunner), config);
    Arc::new(Pipeline::new(ctx).with_state(state))
}

async fn requirements_state(path: &Path) -> Result<PipelineState> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read requirements from {}", path.display()))?;
    let texts = parse_requirements(&text);
    if texts.is_empty() {
        bail!("{} contains no requirements", path.display());
    }
    Ok(PipelineState::fresh(MeetingInfo::default(), Requirement::from_texts(texts)))
}

/// Run stages in order, stopping at the first failed one
async fn run_plan(pipeline: &Arc<Pipeline>, plan: Vec<StageCommand>) -> Result<bool> {
    for command in plan {
        let stage = command.stage();
        if !run_stage(pipeline, command).await? {
            tracing::warn!(stage = %stage, "stopping after failed stage");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Stream one stage's events to stdout; true when it completed
async fn run_stage(pipeline: &Arc<Pipeline>, command: StageCommand) -> Result<bool> {
    let (mut events, handle) = pipeline.start(command)?;
    let mut completed = false;
    while let Some(event) = events.recv().await {
        completed = matches!(event, PipelineEvent::Complete(_));
        let line = serde_json::to_string(&event)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .context("writing event")?;
    }
    handle.await.context("stage task panicked")?;
    Ok(completed)
}

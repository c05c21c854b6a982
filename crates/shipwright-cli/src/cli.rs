//! Command line arguments

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Meeting requirements to validated deployments
#[derive(Parser, Debug)]
#[command(name = "shipwright")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Target repository, overrides `target.repo_path`
    #[arg(short, long, global = true)]
    pub repo: Option<PathBuf>,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every stage from extraction to validation
    Run(RunArgs),

    /// Extract requirements from the latest matching meeting
    Extract(ExtractArgs),

    /// Analyze requirements from a file against the target codebase
    Analyze(RequirementsArgs),

    /// Validate a deployed site against requirements from a file
    Validate(ValidateArgs),

    /// Print the file edits found in an agent reply
    ParseEdits(ParseEditsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Meeting search scope
    #[arg(short, long)]
    pub scope: String,

    /// File tracker issues before dispatching local changes
    #[arg(long)]
    pub file_issues: bool,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Meeting search scope
    #[arg(short, long)]
    pub scope: String,
}

#[derive(Args, Debug)]
pub struct RequirementsArgs {
    /// Requirements file: JSON array of strings, or one per line
    #[arg(long)]
    pub requirements: PathBuf,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Deployed site URL
    #[arg(long)]
    pub url: String,

    /// Requirements file: JSON array of strings, or one per line
    #[arg(long)]
    pub requirements: PathBuf,
}

#[derive(Args, Debug)]
pub struct ParseEditsArgs {
    /// Saved agent reply
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::parse_from([
            "shipwright",
            "validate",
            "--url",
            "https://example.net",
            "--requirements",
            "reqs.txt",
            "--log-json",
        ]);
        assert!(cli.log_json);
        match cli.command {
            Command::Validate(args) => {
                assert_eq!(args.url, "https://example.net");
                assert_eq!(args.requirements, PathBuf::from("reqs.txt"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_defaults_to_local_dispatch() {
        let cli = Cli::parse_from(["shipwright", "run", "--scope", "weekly sync"]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.scope, "weekly sync");
                assert!(!args.file_issues);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

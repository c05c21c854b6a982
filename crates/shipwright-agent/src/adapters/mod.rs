//! Typed adapters over external CLIs
//!
//! Argument construction stays in here; stages call typed methods and get
//! classified [`shipwright_core::PipelineError`]s back.

mod deploy;
mod git;
mod issues;

pub use deploy::{scrape_deploy_url, DeployTool};
pub use git::{parse_porcelain, Git};
pub use issues::{parse_created, CreatedIssue, IssueDraft, IssueTracker};

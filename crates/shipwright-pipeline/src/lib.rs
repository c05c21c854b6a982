//! Shipwright Pipeline
//!
//! Meeting requirements to validated deployments, one stage at a time:
//! - Extract requirements from a meeting source
//! - Analyze each requirement against the target codebase
//! - File issues, or apply changes locally on one branch per gap
//! - Deploy the working copy and validate it against live evidence
//!
//! # Example
//!
//! ```rust,ignore
//! use shipwright_pipeline::{Pipeline, StageCommand, StageContext};
//! use std::sync::Arc;
//!
//! let pipeline = Arc::new(Pipeline::new(StageContext::new(backend, runner, config)));
//! let (mut events, handle) = pipeline.start(StageCommand::Extract { scope: "weekly sync".into() })?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! handle.await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod context;
pub mod orchestrator;
pub mod prompts;
pub mod scaffold;
pub mod stages;
pub mod workspace;

pub use context::StageContext;
pub use orchestrator::{Pipeline, StageCommand};
pub use stages::{Analysis, Extraction, Validation};

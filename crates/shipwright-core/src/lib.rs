//! Shipwright Core
//!
//! Shared vocabulary for the meeting-to-deployment pipeline:
//! - Data model (requirements, gaps, work items, code changes, verdicts)
//! - Error taxonomy and external-failure classification
//! - Progress/event protocol with exactly-one-terminal-event streams
//! - Owned pipeline state replaced at run boundaries
//! - Per-stage retry/timeout/concurrency policies
//! - TOML configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use shipwright_core::{event, PipelineEvent, ProgressStep, Stage};
//!
//! # async fn example() {
//! let (emitter, mut stream) = event::channel(Stage::Extract);
//! emitter.progress(ProgressStep::Connecting, "opening meeting session");
//! emitter.complete(serde_json::json!({ "requirements": 3 }));
//!
//! while let Some(event) = stream.recv().await {
//!     println!("{}", serde_json::to_string(&event).unwrap());
//! }
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod policy;
pub mod state;
pub mod types;

pub use config::ShipwrightConfig;
pub use error::{FailureClass, PipelineError, PipelineResult};
pub use event::{ErrorPayload, EventEmitter, EventStream, PipelineEvent, ProgressStep, StageResult};
pub use policy::{StagePolicies, StagePolicy, StagePolicyOverride, StagePolicyOverrides, EXTRACT_ATTEMPTS};
pub use state::{PipelineState, Stage};
pub use types::{
    CodeChangeResult, Complexity, DeployMode, Deployment, GapId, GapItem, MeetingInfo,
    Requirement, RunId, Tally, ValidationResult, VerdictSource, WorkItem,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Shipwright Core
    pub use crate::{
        CodeChangeResult, EventEmitter, GapId, GapItem, PipelineError, PipelineEvent,
        PipelineState, ProgressStep, Requirement, ShipwrightConfig, Stage, StagePolicy,
        ValidationResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

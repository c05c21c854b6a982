//! Shipwright Agent
//!
//! Runtime plumbing shared by every pipeline stage:
//! - Agent sessions with auto-approved tools and tool-call logging
//! - Pluggable agent backends (headless CLI over JSON lines)
//! - Bounded worker pool with per-item failure isolation
//! - External process runner and typed CLI adapters (git, issues, deploy)
//!
//! # Example
//!
//! ```rust,ignore
//! use shipwright_agent::{AgentSession, CapabilityProfile, CliAgentBackend, SessionConfig};
//! use std::time::Duration;
//!
//! # async fn example(backend: CliAgentBackend) -> Result<(), shipwright_agent::SessionError> {
//! let config = SessionConfig::new("analyze-1", CapabilityProfile::CodebaseRead);
//! let mut session = AgentSession::open(&backend, &config).await?;
//! let reply = session.send_and_wait("Describe the gap", Duration::from_secs(300)).await;
//! session.destroy().await?;
//! println!("{}", reply?.text);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod adapters;
pub mod backend;
pub mod cli_backend;
pub mod error;
pub mod pool;
pub mod process;
pub mod session;

pub use backend::{
    AgentBackend, AgentConversation, AgentEvent, CapabilityProfile, Response, SessionConfig,
    ToolCall,
};
pub use cli_backend::CliAgentBackend;
pub use error::{ProcessError, SessionError};
pub use pool::{run_pool, PoolFailure, PoolRun, PoolStats};
pub use process::{ProcessOutput, ProcessRunner, ProcessSpec, TokioProcessRunner, ToolDetector};
pub use session::AgentSession;

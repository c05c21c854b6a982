//! Pipeline stages
//!
//! Each stage is a free async function over a [`StageContext`] and an
//! [`EventEmitter`]; the orchestrator owns state and terminal events.
//!
//! [`StageContext`]: crate::context::StageContext
//! [`EventEmitter`]: shipwright_core::EventEmitter

pub mod analyze;
pub mod deploy;
pub mod dispatch;
pub mod extract;
pub mod issues;
pub mod validate;

pub use analyze::{analyze, Analysis};
pub use deploy::deploy;
pub use dispatch::{branch_name, dispatch};
pub use extract::{extract, Extraction};
pub use issues::file_issues;
pub use validate::{validate, Validation};

//! Shipwright Evidence
//!
//! Live-page evidence for validation:
//! - [`EvidenceCollector`] drives a Playwright harness against a deployed URL
//! - [`EvidenceAudit`] is the structured fact sheet it produces
//! - [`precheck`] settles requirements the audit answers with certainty

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod audit;
pub mod collector;
pub mod error;
pub mod precheck;
pub mod script;

pub use audit::{
    CookieConsent, CtaOutcome, EvidenceAudit, FieldFact, FormFact, HeadingFact, LinkFact, MobileFacts,
    PathProbe, Performance, ProbeOutcome,
};
pub use collector::EvidenceCollector;
pub use error::EvidenceError;
pub use precheck::{check, AutoFail, PrecheckEngine, PrecheckRule};
pub use script::{BEGIN_SENTINEL, END_SENTINEL};

//! Shipwright Parse
//!
//! Best-effort extraction of structured data from free-form agent output:
//! - JSON arrays and objects wrapped in prose or code fences
//! - Line-splitting fallback for requirement lists
//! - File edits described in several Markdown dialects
//! - Typed meeting, gap and verdict views
//!
//! Every entry point takes a single `&str` and never panics. Total failure is
//! an empty list, `None`, or a `PipelineError::Parse` for the typed helpers.
//!
//! # Example
//!
//! ```rust
//! use shipwright_parse::{extract_file_edits, extract_string_list};
//!
//! let reqs = extract_string_list(r#"["Add a contact form", "Add a privacy page"]"#);
//! assert_eq!(reqs.len(), 2);
//!
//! let edits = extract_file_edits("FILE: a.css\n```css\nbody {}\n```\n");
//! assert_eq!(edits[0].path, "a.css");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod edits;
pub mod json;
pub mod typed;

pub use edits::{
    extract_file_edits, render_file_edits, EditMatch, EditPattern, EditPatternSet, FileEdit,
};
pub use json::{extract_json_array, extract_json_object, extract_string_list, split_lines};
pub use typed::{
    parse_gap_fields, parse_meeting, parse_requirements, parse_verdict, Claim, ParsedMeeting,
    Verdict,
};

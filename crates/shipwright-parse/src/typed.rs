//! Typed views over agent replies
//!
//! Built on the JSON extractors; every helper tolerates key-name drift
//! (`currentState` / `current_state`) and prose around the payload.

use crate::json::{extract_json_array, extract_json_object, extract_string_list, get_str, get_text, split_lines, strings_from_values};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shipwright_core::{Complexity, GapItem, MeetingInfo, PipelineError, Requirement};

/// Meeting details plus the raw requirement list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMeeting {
    /// Title, date, participants, summary
    pub meeting: MeetingInfo,
    /// Requirement texts in meeting order
    pub requirements: Vec<String>,
}

/// Parse the meeting reply
///
/// Object form first (`title`, `date`, `participants`, `summary`,
/// `requirements`), then a bare array, then line splitting.
#[must_use]
pub fn parse_meeting(text: &str) -> ParsedMeeting {
    if let Some(map) = extract_json_object(text) {
        let requirements = match map.get("requirements") {
            Some(Value::Array(items)) => strings_from_values(items),
            Some(Value::String(s)) => split_lines(s),
            _ => Vec::new(),
        };
        let has_meeting_fields = ["title", "summary", "participants", "requirements"]
            .iter()
            .any(|k| map.contains_key(*k));
        if has_meeting_fields {
            return ParsedMeeting {
                meeting: meeting_info(&map),
                requirements,
            };
        }
    }

    ParsedMeeting {
        meeting: MeetingInfo::default(),
        requirements: parse_requirements(text),
    }
}

/// Parse a requirement list: JSON array, else line splitting
#[must_use]
pub fn parse_requirements(text: &str) -> Vec<String> {
    extract_string_list(text)
}

fn meeting_info(map: &Map<String, Value>) -> MeetingInfo {
    let participants = match map.get("participants").or_else(|| map.get("attendees")) {
        Some(Value::Array(items)) => strings_from_values(items),
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    MeetingInfo {
        title: get_str(map, &["title", "subject", "name"]).unwrap_or_default().to_string(),
        date: get_str(map, &["date", "startTime", "start"]).unwrap_or_default().to_string(),
        participants,
        summary: get_text(map, &["summary", "description"]).unwrap_or_default(),
    }
}

/// Parse one gap object for `requirement`
///
/// The gap id always comes from the requirement, never from the reply.
///
/// # Errors
///
/// [`PipelineError::Parse`] when no object is found or it has no `gap` text.
pub fn parse_gap_fields(text: &str, requirement: &Requirement) -> Result<GapItem, PipelineError> {
    let map = extract_json_object(text)
        .or_else(|| {
            extract_json_array(text).and_then(|items| {
                items.into_iter().find_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
            })
        })
        .ok_or_else(|| PipelineError::Parse("no gap object in analysis reply".to_string()))?;

    let gap = get_text(&map, &["gap", "gapDescription", "gap_description"])
        .ok_or_else(|| PipelineError::Parse("gap object has no `gap` field".to_string()))?;

    Ok(GapItem {
        id: requirement.gap_id(),
        requirement: requirement.text.clone(),
        current_state: get_text(&map, &["currentState", "current_state", "current"])
            .unwrap_or_else(|| "Unknown".to_string()),
        gap,
        complexity: get_str(&map, &["complexity", "difficulty"])
            .map(Complexity::parse_lenient)
            .unwrap_or_default(),
        estimated_effort: get_text(&map, &["estimatedEffort", "estimated_effort", "effort"])
            .unwrap_or_else(|| "TBD".to_string()),
        details: get_text(&map, &["details", "implementation", "notes"]).unwrap_or_default(),
    })
}

/// One checked claim in an adjudicator verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim text
    pub claim: String,
    /// Whether the evidence supports it
    pub passed: bool,
    /// Evidence cited
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub evidence: String,
}

/// Adjudicator verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall pass flag, false whenever any claim failed
    pub passed: bool,
    /// Human-readable explanation
    pub details: String,
    /// Decomposed claims
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claims: Vec<Claim>,
}

/// Parse an adjudicator verdict
///
/// Accepts `passed`/`pass` booleans or a `verdict` of `PASS`/`FAIL`. Any
/// failed claim forces the verdict to fail. `None` when no verdict can be
/// read; callers treat that as a failure.
#[must_use]
pub fn parse_verdict(text: &str) -> Option<Verdict> {
    let map = extract_json_object(text)?;

    let claims: Vec<Claim> = match map.get("claims") {
        Some(Value::Array(items)) => items.iter().filter_map(claim_from_value).collect(),
        _ => Vec::new(),
    };

    let flag = ["passed", "pass", "met"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_bool))
        .or_else(|| {
            get_str(&map, &["verdict", "result", "status"]).and_then(|v| {
                match v.to_ascii_uppercase().as_str() {
                    "PASS" | "PASSED" => Some(true),
                    "FAIL" | "FAILED" => Some(false),
                    _ => None,
                }
            })
        })?;

    let failed: Vec<&Claim> = claims.iter().filter(|c| !c.passed).collect();
    let passed = flag && failed.is_empty();

    let details = get_text(&map, &["details", "reason", "explanation"]).unwrap_or_else(|| {
        if failed.is_empty() {
            String::new()
        } else {
            failed
                .iter()
                .map(|c| format!("failed claim: {}", c.claim))
                .collect::<Vec<_>>()
                .join("; ")
        }
    });

    Some(Verdict {
        passed,
        details,
        claims,
    })
}

fn claim_from_value(value: &Value) -> Option<Claim> {
    let map = value.as_object()?;
    Some(Claim {
        claim: get_str(map, &["claim", "text", "statement"])?.to_string(),
        passed: ["passed", "pass", "met"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_bool))
            .unwrap_or(false),
        evidence: get_text(map, &["evidence", "reason"]).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn meeting_object_form() {
        let text = r#"Sure.
```json
{"title": "Website sync", "date": "2026-03-02", "participants": ["Ana", "Raj"],
 "summary": "Site refresh", "requirements": ["Add a contact form with reCAPTCHA", "Publish a privacy policy page"]}
```"#;
        let parsed = parse_meeting(text);
        assert_eq!(parsed.meeting.title, "Website sync");
        assert_eq!(parsed.meeting.participants, ["Ana", "Raj"]);
        assert_eq!(parsed.requirements.len(), 2);
    }

    #[test]
    fn meeting_array_form() {
        let parsed = parse_meeting(r#"["Add a cookie consent banner"]"#);
        assert_eq!(parsed.meeting, MeetingInfo::default());
        assert_eq!(parsed.requirements, ["Add a cookie consent banner"]);
    }

    #[test]
    fn meeting_with_empty_requirements() {
        let parsed = parse_meeting(r#"{"title": "Standup", "requirements": []}"#);
        assert_eq!(parsed.meeting.title, "Standup");
        assert!(parsed.requirements.is_empty());
    }

    #[test]
    fn participants_as_string() {
        let parsed = parse_meeting(r#"{"title": "t", "participants": "Ana, Raj; Lee"}"#);
        assert_eq!(parsed.meeting.participants, ["Ana", "Raj", "Lee"]);
    }

    #[test]
    fn gap_uses_requirement_id() {
        let req = Requirement::new(2, "Add dark mode");
        let gap = parse_gap_fields(
            r#"{"id": 99, "currentState": "Light only", "gap": "No theme toggle", "complexity": "high", "estimatedEffort": "2 days", "details": ["add toggle", "persist choice"]}"#,
            &req,
        )
        .unwrap();
        assert_eq!(gap.id, req.gap_id());
        assert_eq!(gap.complexity, Complexity::High);
        assert_eq!(gap.details, "- add toggle\n- persist choice");
    }

    #[test]
    fn gap_without_gap_field_is_parse_error() {
        let req = Requirement::new(0, "x");
        let err = parse_gap_fields(r#"{"complexity": "Low"}"#, &req).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert!(parse_gap_fields("no json", &req).is_err());
    }

    #[test]
    fn verdict_failed_claim_forces_fail() {
        let v = parse_verdict(
            r#"{"passed": true, "details": "looks good", "claims": [
                {"claim": "form exists", "passed": true},
                {"claim": "form has reCAPTCHA", "passed": false}]}"#,
        )
        .unwrap();
        assert!(!v.passed);
        assert_eq!(v.claims.len(), 2);
    }

    #[test]
    fn verdict_string_form() {
        let v = parse_verdict(r#"Verdict: {"verdict": "PASS", "reason": "banner found"}"#).unwrap();
        assert!(v.passed);
        assert_eq!(v.details, "banner found");
    }

    #[test]
    fn verdict_details_from_failed_claims() {
        let v = parse_verdict(r#"{"passed": false, "claims": [{"claim": "page exists", "passed": false}]}"#)
            .unwrap();
        assert_eq!(v.details, "failed claim: page exists");
    }

    #[test]
    fn unreadable_verdict_is_none() {
        assert!(parse_verdict("I think it passes").is_none());
        assert!(parse_verdict(r#"{"details": "no flag"}"#).is_none());
    }
}

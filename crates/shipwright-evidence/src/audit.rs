//! Evidence fact sheet about one live page
//!
//! Produced by the browser harness as JSON; every field defaults so a
//! partial audit (harness died mid-way) still deserializes.

use serde::{Deserialize, Serialize};

/// Everything the harness learned about a deployment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvidenceAudit {
    /// Audited URL
    pub url: String,
    /// URL after navigation settled
    pub final_url: String,
    /// HTTP status of the main document
    pub status: Option<u16>,
    /// Document title
    pub title: String,
    /// Headings in document order
    pub headings: Vec<HeadingFact>,
    /// Forms on the home page
    pub forms: Vec<FormFact>,
    /// Links on the home page
    pub links: Vec<LinkFact>,
    /// Computed font families in use
    pub fonts: Vec<String>,
    /// Bounded CTA click-throughs
    pub ctas: Vec<CtaOutcome>,
    /// Cookie-consent banner state
    pub cookie_consent: CookieConsent,
    /// Conventional sub-path probes
    pub probes: Vec<PathProbe>,
    /// Navigation timings
    pub performance: Performance,
    /// Mobile-friendliness facts
    pub mobile: MobileFacts,
    /// Error that stopped the harness early, if any
    pub fatal_error: Option<String>,
}

impl EvidenceAudit {
    /// Every measured form: home page, CTA landing pages and probed pages
    ///
    /// Anchor CTAs point into the home page, whose forms are already in
    /// [`EvidenceAudit::forms`].
    pub fn all_forms(&self) -> impl Iterator<Item = &FormFact> {
        self.forms
            .iter()
            .chain(self.ctas.iter().flat_map(|c| c.forms().iter()))
            .chain(self.probes.iter().flat_map(|p| p.forms.iter()))
    }

    /// Whether any page visited had a form
    #[must_use]
    pub fn any_form(&self) -> bool {
        self.all_forms().next().is_some()
            || self.ctas.iter().any(CtaOutcome::has_form)
    }

    /// Whether a CTA landed on a form whose facts were not recorded
    #[must_use]
    pub fn has_unmeasured_forms(&self) -> bool {
        self.ctas
            .iter()
            .any(|c| matches!(c, CtaOutcome::Navigation { has_form: true, forms, .. } if forms.is_empty()))
    }

    /// Probes for `path` (exact match, leading slash optional)
    pub fn probes_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a PathProbe> + 'a {
        let wanted = path.trim_start_matches('/');
        self.probes
            .iter()
            .filter(move |p| p.path.trim_start_matches('/') == wanted)
    }

    /// Whether the harness stopped early
    #[inline]
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.fatal_error.is_some()
    }
}

/// One heading
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeadingFact {
    /// 1-6
    pub level: u8,
    /// Visible text
    pub text: String,
}

/// One form
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormFact {
    /// `id` attribute
    pub id: Option<String>,
    /// `action` attribute
    pub action: Option<String>,
    /// Guessed purpose (`contact`, `newsletter`, `search`, `login`, `other`)
    pub purpose: String,
    /// Input fields
    pub fields: Vec<FieldFact>,
    /// reCAPTCHA / hCaptcha / Turnstile widget or script present
    pub has_recaptcha: bool,
    /// Checkbox whose label mentions privacy, consent or GDPR
    pub has_privacy_checkbox: bool,
    /// Submit button text
    pub submit_text: String,
    /// Page the form was found on
    pub page_url: String,
}

/// One input field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldFact {
    /// `name` attribute
    pub name: String,
    /// Input type or tag name
    pub kind: String,
    /// Associated label text
    pub label: String,
    /// `required` attribute
    pub required: bool,
}

/// One link
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkFact {
    /// Visible text
    pub text: String,
    /// Resolved href
    pub href: String,
}

/// Result of clicking one prominent call to action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum CtaOutcome {
    /// In-page anchor
    Anchor {
        /// CTA text
        text: String,
        /// Fragment target
        target: String,
        /// Target element exists
        section_found: bool,
        /// Target section contains a form
        has_form: bool,
    },
    /// Navigation to another page
    Navigation {
        /// CTA text
        text: String,
        /// Landing URL
        url: String,
        /// Landing page title
        title: String,
        /// Landing page has a form
        has_form: bool,
        /// Purpose of the first form there
        form_purpose: Option<String>,
        /// Forms on the landing page
        #[serde(default)]
        forms: Vec<FormFact>,
        /// Landing page headings
        headings: Vec<String>,
    },
    /// Click did not complete
    Failed {
        /// CTA text
        text: String,
        /// Error
        error: String,
    },
}

impl CtaOutcome {
    /// CTA text
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Anchor { text, .. } | Self::Navigation { text, .. } | Self::Failed { text, .. } => text,
        }
    }

    /// Forms measured on the landing page
    #[must_use]
    pub fn forms(&self) -> &[FormFact] {
        match self {
            Self::Navigation { forms, .. } => forms,
            Self::Anchor { .. } | Self::Failed { .. } => &[],
        }
    }

    /// Whether the click led to a form
    #[must_use]
    pub fn has_form(&self) -> bool {
        match self {
            Self::Anchor { has_form, .. } | Self::Navigation { has_form, .. } => *has_form,
            Self::Failed { .. } => false,
        }
    }
}

/// Cookie-consent banner state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CookieConsent {
    /// A consent banner or dialog was visible on load
    pub banner_found: bool,
    /// Banner text excerpt
    pub text: Option<String>,
    /// Accept control present
    pub has_accept: bool,
    /// Reject control present
    pub has_reject: bool,
}

/// What a probe found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeOutcome {
    /// Real content of its own
    Found,
    /// 4xx/5xx
    NotFound,
    /// Ended on the home page
    RedirectedToHome,
    /// Served the home page content under the probed URL
    ServesHomeContent,
    /// Navigation failed
    Error,
}

/// One sub-path probe
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathProbe {
    /// Probed path (`/privacy`)
    pub path: String,
    /// Requested URL
    pub url: String,
    /// HTTP status of the final response
    pub status: Option<u16>,
    /// URL after redirects and client-side navigation
    pub final_url: String,
    /// A real 3xx redirect happened
    pub redirected: bool,
    /// URLs of the 3xx chain, first request first
    pub redirect_chain: Vec<String>,
    /// Final URL equals the home URL
    pub redirected_to_home: bool,
    /// Title and main heading identical to the home page
    pub serves_home_content: bool,
    /// Page title
    pub title: String,
    /// First heading
    pub heading: Option<String>,
    /// Forms on the probed page
    pub forms: Vec<FormFact>,
    /// Navigation error
    pub error: Option<String>,
}

impl PathProbe {
    /// Classify the probe
    #[must_use]
    pub fn outcome(&self) -> ProbeOutcome {
        if self.error.is_some() {
            ProbeOutcome::Error
        } else if self.status.is_some_and(|s| s >= 400) {
            ProbeOutcome::NotFound
        } else if self.redirected_to_home {
            ProbeOutcome::RedirectedToHome
        } else if self.serves_home_content {
            ProbeOutcome::ServesHomeContent
        } else {
            ProbeOutcome::Found
        }
    }

    /// Short fact for verdict text: `404`, `redirectedToHome=true`, ...
    #[must_use]
    pub fn outcome_fact(&self) -> String {
        match self.outcome() {
            ProbeOutcome::Found => format!("{}", self.status.unwrap_or(200)),
            ProbeOutcome::NotFound => self
                .status
                .map_or_else(|| "not found".to_string(), |s| s.to_string()),
            ProbeOutcome::RedirectedToHome => "redirectedToHome=true".to_string(),
            ProbeOutcome::ServesHomeContent => "servesHomeContent=true".to_string(),
            ProbeOutcome::Error => format!(
                "error: {}",
                self.error.as_deref().unwrap_or("navigation failed")
            ),
        }
    }
}

/// Navigation timings in milliseconds
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Performance {
    /// DOMContentLoaded
    pub dom_content_loaded_ms: Option<f64>,
    /// load event
    pub load_ms: Option<f64>,
}

/// Mobile-friendliness facts
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MobileFacts {
    /// `<meta name="viewport">` present
    pub has_viewport_meta: bool,
    /// Content wider than the viewport at the checked width
    pub horizontal_overflow: bool,
    /// Checked viewport width in CSS pixels
    pub viewport_width: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_deserializes() {
        let audit: EvidenceAudit = serde_json::from_str(
            r#"{"url": "https://x.net", "fatalError": "page.goto: net::ERR_NAME_NOT_RESOLVED"}"#,
        )
        .unwrap();
        assert!(audit.is_partial());
        assert!(audit.forms.is_empty());
    }

    #[test]
    fn cta_wire_shape() {
        let cta: CtaOutcome = serde_json::from_str(
            r##"{"kind": "anchor", "text": "Contact us", "target": "#contact", "sectionFound": true, "hasForm": true}"##,
        )
        .unwrap();
        assert!(cta.has_form());
        assert_eq!(cta.text(), "Contact us");
    }

    #[test]
    fn cta_landing_forms_join_all_forms() {
        let audit: EvidenceAudit = serde_json::from_str(
            r#"{"ctas": [
                {"kind": "navigation", "text": "Contact us", "url": "https://x.net/contact-us", "title": "Contact",
                 "hasForm": true, "formPurpose": "contact", "headings": [],
                 "forms": [{"purpose": "contact", "hasRecaptcha": true, "pageUrl": "https://x.net/contact-us"}]},
                {"kind": "navigation", "text": "Book a demo", "url": "https://x.net/demo", "title": "Demo",
                 "hasForm": true, "formPurpose": "other", "headings": []}
            ]}"#,
        )
        .unwrap();
        let forms: Vec<&FormFact> = audit.all_forms().collect();
        assert_eq!(forms.len(), 1);
        assert!(forms[0].has_recaptcha);
        // Second CTA carries no form facts
        assert!(audit.has_unmeasured_forms());
    }

    #[test]
    fn probe_outcomes() {
        let base = PathProbe {
            path: "/privacy".into(),
            status: Some(200),
            ..PathProbe::default()
        };
        assert_eq!(base.outcome(), ProbeOutcome::Found);

        let missing = PathProbe {
            status: Some(404),
            ..base.clone()
        };
        assert_eq!(missing.outcome(), ProbeOutcome::NotFound);
        assert_eq!(missing.outcome_fact(), "404");

        let home = PathProbe {
            redirected_to_home: true,
            ..base.clone()
        };
        assert_eq!(home.outcome(), ProbeOutcome::RedirectedToHome);
        assert_eq!(home.outcome_fact(), "redirectedToHome=true");
    }

    #[test]
    fn probes_match_with_or_without_slash() {
        let audit = EvidenceAudit {
            probes: vec![PathProbe {
                path: "/terms".into(),
                ..PathProbe::default()
            }],
            ..EvidenceAudit::default()
        };
        assert_eq!(audit.probes_for("terms").count(), 1);
        assert_eq!(audit.probes_for("/terms").count(), 1);
        assert_eq!(audit.probes_for("/about").count(), 0);
    }
}

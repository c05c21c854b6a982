//! Deterministic pre-check engine
//!
//! Boolean facts in the audit settle some requirements outright. Each rule
//! recognizes the concept it owns in the requirement text and, if the audit
//! contradicts it, produces an [`AutoFail`] citing the missing fact. Rules
//! run in priority order and the first failure wins; no failure means the
//! requirement goes to the adjudicator.

use crate::audit::{EvidenceAudit, FormFact, ProbeOutcome};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;

/// Deterministic failing verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoFail {
    /// Rule that fired
    pub rule: &'static str,
    /// Human-readable reason citing the audit fact
    pub reason: String,
}

/// One pre-check rule
pub trait PrecheckRule: Send + Sync {
    /// Rule name, for logs and verdicts
    fn name(&self) -> &'static str;

    /// Higher runs first
    fn priority(&self) -> u8;

    /// Failure reason, or `None` when the rule does not apply or passes
    ///
    /// `requirement` is already lowercased.
    fn evaluate(&self, audit: &EvidenceAudit, requirement: &str) -> Option<String>;
}

/// Ordered rule set
pub struct PrecheckEngine {
    rules: Vec<Box<dyn PrecheckRule>>,
}

impl std::fmt::Debug for PrecheckEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecheckEngine")
            .field("rules", &self.names())
            .finish()
    }
}

impl Default for PrecheckEngine {
    fn default() -> Self {
        let mut engine = Self::empty();
        engine.register(Box::new(CaptchaRule));
        engine.register(Box::new(PrivacyCheckboxRule));
        engine.register(Box::new(CookieBannerRule));
        engine.register(Box::new(DedicatedPageRule));
        engine.register(Box::new(ContactFormRule));
        engine
    }
}

impl PrecheckEngine {
    /// Engine with no rules
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a rule, keeping priority order (stable for equal priorities)
    pub fn register(&mut self, rule: Box<dyn PrecheckRule>) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| Reverse(r.priority()));
    }

    /// Rule names in evaluation order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// First failing rule for `requirement`, if any
    #[must_use]
    pub fn check(&self, audit: &EvidenceAudit, requirement: &str) -> Option<AutoFail> {
        let text = requirement.to_lowercase();
        self.rules.iter().find_map(|rule| {
            rule.evaluate(audit, &text).map(|reason| {
                tracing::debug!(rule = rule.name(), %reason, "pre-check auto-fail");
                AutoFail {
                    rule: rule.name(),
                    reason,
                }
            })
        })
    }
}

static DEFAULT_ENGINE: Lazy<PrecheckEngine> = Lazy::new(PrecheckEngine::default);

/// Run the default rule set
#[must_use]
pub fn check(audit: &EvidenceAudit, requirement: &str) -> Option<AutoFail> {
    DEFAULT_ENGINE.check(audit, requirement)
}

fn describe(form: &FormFact) -> String {
    let name = form
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map_or_else(|| format!("{} form", purpose(form)), |id| format!("form #{id}"));
    if form.page_url.is_empty() {
        name
    } else {
        format!("{name} on {}", form.page_url)
    }
}

fn purpose(form: &FormFact) -> &str {
    if form.purpose.is_empty() {
        "unnamed"
    } else {
        &form.purpose
    }
}

/// Forms a user submits data through; search and login boxes do not count
fn submission_forms(audit: &EvidenceAudit) -> Vec<&FormFact> {
    let forms: Vec<&FormFact> = audit.all_forms().collect();
    let relevant: Vec<&FormFact> = forms
        .iter()
        .copied()
        .filter(|f| !matches!(f.purpose.as_str(), "search" | "login"))
        .collect();
    if relevant.is_empty() {
        forms
    } else {
        relevant
    }
}

/// Every form that was seen also had its facts recorded
///
/// Form rules only fail on measured booleans; a form known to exist but not
/// inspected leaves the verdict to the adjudicator.
fn forms_fully_measured(audit: &EvidenceAudit) -> bool {
    !audit.has_unmeasured_forms() && (audit.all_forms().next().is_some() || !audit.any_form())
}

/// reCAPTCHA / captcha protection
struct CaptchaRule;

impl PrecheckRule for CaptchaRule {
    fn name(&self) -> &'static str {
        "captcha"
    }

    fn priority(&self) -> u8 {
        100
    }

    fn evaluate(&self, audit: &EvidenceAudit, requirement: &str) -> Option<String> {
        if !requirement.contains("captcha") {
            return None;
        }
        let forms = submission_forms(audit);
        if forms.iter().any(|f| f.has_recaptcha) || !forms_fully_measured(audit) {
            return None;
        }
        if forms.is_empty() {
            return Some("no form found on the page or probed pages, so hasRecaptcha=false".to_string());
        }
        let cited: Vec<String> = forms.iter().map(|f| describe(f)).collect();
        Some(format!("hasRecaptcha=false on every form ({})", cited.join(", ")))
    }
}

static CHECKBOX: Lazy<Regex> = Lazy::new(|| Regex::new(r"check[\s-]?box|tick[\s-]?box").expect("valid regex"));
static CONSENT_TOPIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"privacy|consent|gdpr|data protection").expect("valid regex"));

/// Privacy / consent checkbox on a form
struct PrivacyCheckboxRule;

impl PrecheckRule for PrivacyCheckboxRule {
    fn name(&self) -> &'static str {
        "privacy-checkbox"
    }

    fn priority(&self) -> u8 {
        90
    }

    fn evaluate(&self, audit: &EvidenceAudit, requirement: &str) -> Option<String> {
        let mentioned = (CHECKBOX.is_match(requirement) && CONSENT_TOPIC.is_match(requirement))
            || requirement.contains("gdpr consent");
        if !mentioned || audit.all_forms().any(|f| f.has_privacy_checkbox) || !forms_fully_measured(audit) {
            return None;
        }
        let count = audit.all_forms().count();
        Some(if count == 0 {
            "no form found, so hasPrivacyCheckbox=false".to_string()
        } else {
            format!("hasPrivacyCheckbox=false on all {count} form(s)")
        })
    }
}

static BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcookies?\b.{0,30}\b(banner|consent|notice|pop-?up|bar|dialog)").expect("valid regex"));

/// Cookie-consent banner
struct CookieBannerRule;

impl PrecheckRule for CookieBannerRule {
    fn name(&self) -> &'static str {
        "cookie-banner"
    }

    fn priority(&self) -> u8 {
        80
    }

    fn evaluate(&self, audit: &EvidenceAudit, requirement: &str) -> Option<String> {
        if !BANNER.is_match(requirement) || audit.cookie_consent.banner_found {
            return None;
        }
        Some("cookieConsent.bannerFound=false: no cookie consent banner was visible on load".to_string())
    }
}

static DEDICATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(privacy|cookies?|terms|about|contact)\b[\w\s&'-]{0,30}?\b(page|policy)\b|\b(dedicated|separate|standalone)\b")
        .expect("valid regex")
});

/// Topic keyword and the probe paths that satisfy it
const PAGE_TOPICS: &[(&str, &[&str])] = &[
    ("privacy", &["/privacy", "/privacy-policy"]),
    ("cookie", &["/cookies", "/cookie-policy"]),
    ("terms", &["/terms"]),
    ("about", &["/about"]),
    ("contact", &["/contact"]),
];

/// Dedicated page that must exist on its own URL
struct DedicatedPageRule;

impl PrecheckRule for DedicatedPageRule {
    fn name(&self) -> &'static str {
        "dedicated-page"
    }

    fn priority(&self) -> u8 {
        70
    }

    fn evaluate(&self, audit: &EvidenceAudit, requirement: &str) -> Option<String> {
        if !DEDICATED.is_match(requirement) {
            return None;
        }
        for (topic, paths) in PAGE_TOPICS {
            if !requirement.contains(topic) || (*topic == "contact" && !mentions_contact_page(requirement)) {
                continue;
            }
            let probes: Vec<_> = paths.iter().flat_map(|p| audit.probes_for(p)).collect();
            if probes.is_empty() || probes.iter().any(|p| p.outcome() == ProbeOutcome::Found) {
                continue;
            }
            let cited: Vec<String> = probes
                .iter()
                .map(|p| format!("{} -> {}", p.path, p.outcome_fact()))
                .collect();
            return Some(format!("no dedicated {topic} page exists: {}", cited.join("; ")));
        }
        None
    }
}

/// "contact form" alone is a form requirement, not a page requirement
fn mentions_contact_page(requirement: &str) -> bool {
    requirement.contains("contact page")
        || requirement.contains("contact us page")
        || (requirement.contains("contact") && requirement.contains("dedicated") && !requirement.contains("contact form"))
}

/// Contact form somewhere on the site
struct ContactFormRule;

impl PrecheckRule for ContactFormRule {
    fn name(&self) -> &'static str {
        "contact-form"
    }

    fn priority(&self) -> u8 {
        60
    }

    fn evaluate(&self, audit: &EvidenceAudit, requirement: &str) -> Option<String> {
        if !requirement.contains("contact form") || audit.any_form() {
            return None;
        }
        Some("no form found on the page, its CTA targets or any probed contact page".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{CookieConsent, CtaOutcome, PathProbe};

    fn form(purpose: &str, recaptcha: bool, privacy: bool) -> FormFact {
        FormFact {
            purpose: purpose.into(),
            has_recaptcha: recaptcha,
            has_privacy_checkbox: privacy,
            page_url: "https://site.example/".into(),
            ..FormFact::default()
        }
    }

    fn contact_cta(forms: Vec<FormFact>) -> CtaOutcome {
        CtaOutcome::Navigation {
            text: "Contact us".into(),
            url: "https://site.example/contact-us".into(),
            title: "Contact".into(),
            has_form: true,
            form_purpose: Some("contact".into()),
            forms,
            headings: vec![],
        }
    }

    fn probe(path: &str, status: u16, home: bool) -> PathProbe {
        PathProbe {
            path: path.into(),
            status: Some(status),
            redirected_to_home: home,
            ..PathProbe::default()
        }
    }

    #[test]
    fn rule_order() {
        assert_eq!(
            PrecheckEngine::default().names(),
            ["captcha", "privacy-checkbox", "cookie-banner", "dedicated-page", "contact-form"]
        );
    }

    #[test]
    fn captcha_missing_fails() {
        let audit = EvidenceAudit {
            forms: vec![form("contact", false, false)],
            ..EvidenceAudit::default()
        };
        let fail = check(&audit, "Add a contact form with reCAPTCHA").unwrap();
        assert_eq!(fail.rule, "captcha");
        assert!(fail.reason.contains("hasRecaptcha=false"));
    }

    #[test]
    fn captcha_present_defers() {
        let audit = EvidenceAudit {
            forms: vec![form("search", false, false), form("contact", true, false)],
            ..EvidenceAudit::default()
        };
        assert_eq!(check(&audit, "Protect the contact form with a captcha"), None);
    }

    #[test]
    fn captcha_with_no_forms_fails() {
        let fail = check(&EvidenceAudit::default(), "Use reCAPTCHA v3").unwrap();
        assert!(fail.reason.contains("no form"));
    }

    #[test]
    fn form_rules_defer_when_a_form_was_not_inspected() {
        let audit = EvidenceAudit {
            ctas: vec![contact_cta(vec![])],
            ..EvidenceAudit::default()
        };
        assert_eq!(check(&audit, "Protect the contact form with reCAPTCHA"), None);
        assert_eq!(check(&audit, "Add a GDPR consent checkbox to the contact form"), None);

        let audit = EvidenceAudit {
            forms: vec![form("newsletter", false, false)],
            ctas: vec![contact_cta(vec![])],
            ..EvidenceAudit::default()
        };
        assert_eq!(check(&audit, "Protect the contact form with reCAPTCHA"), None);
    }

    #[test]
    fn cta_landing_forms_are_judged() {
        let mut landing = form("contact", true, false);
        landing.page_url = "https://site.example/contact-us".into();
        let audit = EvidenceAudit {
            ctas: vec![contact_cta(vec![landing])],
            ..EvidenceAudit::default()
        };
        assert_eq!(check(&audit, "Protect the contact form with reCAPTCHA"), None);

        let fail = check(&audit, "The contact form needs a privacy consent checkbox").unwrap();
        assert_eq!(fail.rule, "privacy-checkbox");
        assert!(fail.reason.contains("hasPrivacyCheckbox=false on all 1 form(s)"), "{}", fail.reason);
    }

    #[test]
    fn privacy_checkbox() {
        let mut audit = EvidenceAudit {
            forms: vec![form("contact", true, false)],
            ..EvidenceAudit::default()
        };
        let req = "The form needs a privacy consent checkbox";
        assert_eq!(check(&audit, req).unwrap().rule, "privacy-checkbox");
        audit.forms[0].has_privacy_checkbox = true;
        assert_eq!(check(&audit, req), None);
    }

    #[test]
    fn cookie_banner() {
        let mut audit = EvidenceAudit::default();
        let req = "Show a cookie consent banner on first visit";
        let fail = check(&audit, req).unwrap();
        assert!(fail.reason.contains("bannerFound=false"));
        audit.cookie_consent = CookieConsent {
            banner_found: true,
            ..CookieConsent::default()
        };
        assert_eq!(check(&audit, req), None);
    }

    #[test]
    fn dedicated_page_404_and_redirect() {
        let audit = EvidenceAudit {
            probes: vec![probe("/privacy", 404, false), probe("/privacy-policy", 200, true)],
            ..EvidenceAudit::default()
        };
        let fail = check(&audit, "Publish a dedicated privacy page").unwrap();
        assert_eq!(fail.rule, "dedicated-page");
        assert!(fail.reason.contains("/privacy -> 404"));
        assert!(fail.reason.contains("/privacy-policy -> redirectedToHome=true"));
    }

    #[test]
    fn dedicated_page_found_on_alternate_path() {
        let audit = EvidenceAudit {
            probes: vec![probe("/privacy", 404, false), probe("/privacy-policy", 200, false)],
            ..EvidenceAudit::default()
        };
        assert_eq!(check(&audit, "Add a privacy policy page"), None);
    }

    #[test]
    fn unprobed_topic_defers() {
        assert_eq!(check(&EvidenceAudit::default(), "Add a terms page"), None);
    }

    #[test]
    fn contact_form_is_not_a_page_requirement() {
        let audit = EvidenceAudit {
            forms: vec![form("contact", false, false)],
            probes: vec![probe("/contact", 404, false)],
            ..EvidenceAudit::default()
        };
        assert_eq!(check(&audit, "Add a contact form to the homepage"), None);
        assert_eq!(
            check(&audit, "Create a dedicated contact page").unwrap().rule,
            "dedicated-page"
        );
    }

    #[test]
    fn contact_form_missing() {
        let fail = check(&EvidenceAudit::default(), "Add a contact form").unwrap();
        assert_eq!(fail.rule, "contact-form");
    }

    #[test]
    fn unrelated_requirement_defers() {
        assert_eq!(check(&EvidenceAudit::default(), "Use the brand font Inter"), None);
    }
}

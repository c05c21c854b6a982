//! Evidence and repository fixtures

use shipwright_agent::ProcessOutput;
use shipwright_evidence::{
    CookieConsent, EvidenceAudit, FormFact, HeadingFact, PathProbe, BEGIN_SENTINEL, END_SENTINEL,
};
use std::path::Path;

pub const SITE: &str = "https://site.example";

pub fn form(purpose: &str, has_recaptcha: bool, has_privacy_checkbox: bool) -> FormFact {
    FormFact {
        id: Some(format!("{purpose}-form")),
        purpose: purpose.to_string(),
        has_recaptcha,
        has_privacy_checkbox,
        submit_text: "Send".to_string(),
        page_url: format!("{SITE}/"),
        ..FormFact::default()
    }
}

pub fn probe(path: &str, status: u16) -> PathProbe {
    PathProbe {
        path: path.to_string(),
        url: format!("{SITE}{path}"),
        status: Some(status),
        final_url: format!("{SITE}{path}"),
        title: if status < 400 { format!("{path} | Site") } else { "Not Found".to_string() },
        ..PathProbe::default()
    }
}

pub fn probe_redirected_home(path: &str) -> PathProbe {
    PathProbe {
        redirected: true,
        redirect_chain: vec![format!("{SITE}{path}")],
        redirected_to_home: true,
        final_url: format!("{SITE}/"),
        title: "Site".to_string(),
        ..probe(path, 200)
    }
}

/// Home page with a contact form lacking reCAPTCHA and no privacy page
pub fn contact_without_captcha() -> EvidenceAudit {
    EvidenceAudit {
        url: SITE.to_string(),
        final_url: format!("{SITE}/"),
        status: Some(200),
        title: "Site".to_string(),
        headings: vec![HeadingFact {
            level: 1,
            text: "Welcome".to_string(),
        }],
        forms: vec![form("contact", false, false)],
        probes: vec![probe("/privacy", 404), probe("/privacy-policy", 404), probe("/about", 200)],
        ..EvidenceAudit::default()
    }
}

/// Home page that satisfies the common compliance checks
pub fn compliant_site() -> EvidenceAudit {
    EvidenceAudit {
        forms: vec![form("contact", true, true)],
        cookie_consent: CookieConsent {
            banner_found: true,
            text: Some("We use cookies".to_string()),
            has_accept: true,
            has_reject: true,
        },
        probes: vec![probe("/privacy", 200), probe("/terms", 200), probe("/contact", 200)],
        ..contact_without_captcha()
    }
}

/// Harness stdout carrying `audit` between the sentinels
pub fn harness_stdout(audit: &EvidenceAudit) -> String {
    let json = serde_json::to_string(audit).unwrap_or_default();
    format!("Downloading browsers...\n{BEGIN_SENTINEL}\n{json}\n{END_SENTINEL}\n")
}

pub fn harness_output(audit: &EvidenceAudit) -> ProcessOutput {
    ProcessOutput::ok(harness_stdout(audit))
}

/// Temp directory holding `files` (relative path, content)
pub fn temp_tree(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    for (path, content) in files {
        write_file(dir.path(), path, content);
    }
    dir
}

pub fn write_file(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(full, content).expect("write fixture file");
}

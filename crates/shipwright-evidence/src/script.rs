//! Browser harness script
//!
//! A self-contained Playwright (Node, CommonJS) script that audits one URL
//! and prints the audit JSON between two sentinel lines. The script never
//! exits without printing: fatal errors land in `fatalError` and whatever
//! was gathered so far is still emitted.

use crate::error::EvidenceError;
use serde::Serialize;

/// Line printed before the audit JSON
pub const BEGIN_SENTINEL: &str = "__SHIPWRIGHT_EVIDENCE_BEGIN__";

/// Line printed after the audit JSON
pub const END_SENTINEL: &str = "__SHIPWRIGHT_EVIDENCE_END__";

/// Width used for the mobile check
pub const MOBILE_WIDTH: u32 = 375;

/// Values injected into the script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOptions {
    /// Page to audit
    pub url: String,
    /// Sub-paths probed for dedicated pages
    pub probe_paths: Vec<String>,
    /// CTA click-through cap
    pub max_clicks: usize,
    /// Per-navigation timeout
    pub nav_timeout_ms: u64,
    /// Mobile viewport width
    pub mobile_width: u32,
    /// Begin sentinel
    pub begin: &'static str,
    /// End sentinel
    pub end: &'static str,
}

impl ScriptOptions {
    /// Options for `url` with default timings
    #[must_use]
    pub fn new(url: impl Into<String>, probe_paths: Vec<String>, max_clicks: usize) -> Self {
        Self {
            url: url.into(),
            probe_paths,
            max_clicks,
            nav_timeout_ms: 20_000,
            mobile_width: MOBILE_WIDTH,
            begin: BEGIN_SENTINEL,
            end: END_SENTINEL,
        }
    }
}

/// Render the harness script
///
/// # Errors
/// [`EvidenceError::Malformed`] if the options fail to serialize.
pub fn render_script(options: &ScriptOptions) -> Result<String, EvidenceError> {
    let config = serde_json::to_string(options)?;
    Ok(TEMPLATE.replace("__CONFIG__", &config))
}

/// Audit JSON between the last begin sentinel and the end sentinel after it
#[must_use]
pub fn extract_audit_json(stdout: &str) -> Option<&str> {
    let start = stdout.rfind(BEGIN_SENTINEL)? + BEGIN_SENTINEL.len();
    let rest = &stdout[start..];
    let end = rest.find(END_SENTINEL)?;
    let json = rest[..end].trim();
    (!json.is_empty()).then_some(json)
}

const TEMPLATE: &str = r##"'use strict';
const { chromium } = require('playwright');
const CONFIG = __CONFIG__;

function norm(u) {
  try {
    const x = new URL(u);
    x.hash = '';
    x.search = '';
    const s = x.toString();
    return s.endsWith('/') ? s.slice(0, -1) : s;
  } catch (e) {
    return String(u || '');
  }
}

function errText(e, max) {
  return String((e && e.message) || e).slice(0, max);
}

async function pageFacts(page) {
  return page.evaluate(() => {
    const text = (el) =>
      ((el && (el.innerText || el.textContent || el.value)) || '').trim().replace(/\s+/g, ' ').slice(0, 200);
    const labelOf = (input) => {
      if (input.id) {
        const l = document.querySelector('label[for="' + CSS.escape(input.id) + '"]');
        if (l) return text(l);
      }
      const wrap = input.closest('label');
      if (wrap) return text(wrap);
      return input.getAttribute('aria-label') || input.getAttribute('placeholder') || '';
    };
    const purposeOf = (form) => {
      const t = [form.innerText, form.getAttribute('action'), form.id, form.className].join(' ').toLowerCase();
      if (/search/.test(t) && form.querySelectorAll('input').length <= 2) return 'search';
      if (form.querySelector('input[type="password"]') || /log ?in|sign ?in/.test(t)) return 'login';
      if (/newsletter|subscribe/.test(t) && !form.querySelector('textarea')) return 'newsletter';
      if (form.querySelector('textarea') || /message|contact|enquir|inquir|get in touch/.test(t)) return 'contact';
      return 'other';
    };
    const pageCaptcha = !!document.querySelector(
      'script[src*="recaptcha"], script[src*="hcaptcha"], script[src*="turnstile"]'
    );
    const captcha = (form) =>
      pageCaptcha ||
      !!form.querySelector(
        '.g-recaptcha, .h-captcha, .cf-turnstile, [data-sitekey], iframe[src*="recaptcha"], iframe[src*="hcaptcha"], input[name="g-recaptcha-response"]'
      );
    const privacyBox = (form) =>
      Array.from(form.querySelectorAll('input[type="checkbox"]')).some((c) =>
        /privacy|consent|gdpr|data protection|terms/i.test(labelOf(c) + ' ' + (c.name || ''))
      );
    const forms = Array.from(document.querySelectorAll('form')).map((f) => ({
      id: f.id || null,
      action: f.getAttribute('action'),
      purpose: purposeOf(f),
      fields: Array.from(f.querySelectorAll('input, textarea, select'))
        .filter((i) => i.type !== 'hidden')
        .map((i) => ({
          name: i.name || '',
          kind: i.tagName.toLowerCase() === 'input' ? i.type || 'text' : i.tagName.toLowerCase(),
          label: labelOf(i),
          required: !!i.required,
        })),
      hasRecaptcha: captcha(f),
      hasPrivacyCheckbox: privacyBox(f),
      submitText: text(f.querySelector('button[type="submit"], input[type="submit"], button')),
      pageUrl: location.href,
    }));
    const headings = Array.from(document.querySelectorAll('h1, h2, h3, h4, h5, h6'))
      .map((h) => ({ level: Number(h.tagName[1]), text: text(h) }))
      .filter((h) => h.text);
    return { title: document.title || '', headings, forms };
  });
}

async function collectHome(page, audit) {
  const facts = await pageFacts(page);
  audit.title = facts.title;
  audit.headings = facts.headings;
  audit.forms = facts.forms;
  audit.links = await page.evaluate(() =>
    Array.from(document.querySelectorAll('a[href]'))
      .slice(0, 200)
      .map((a) => ({ text: (a.innerText || '').trim().slice(0, 120), href: a.href }))
  );
  audit.fonts = await page.evaluate(() => {
    const seen = new Set();
    document.querySelectorAll('body, h1, h2, h3, p, a, button').forEach((el) => seen.add(getComputedStyle(el).fontFamily));
    return Array.from(seen);
  });
  audit.performance = await page.evaluate(() => {
    const n = performance.getEntriesByType('navigation')[0];
    return n ? { domContentLoadedMs: n.domContentLoadedEventEnd, loadMs: n.loadEventEnd } : {};
  });
  audit.cookieConsent = await page.evaluate(() => {
    const sel =
      '[id*="cookie" i], [class*="cookie" i], [id*="consent" i], [class*="consent" i], [aria-label*="cookie" i], #onetrust-banner-sdk, #CybotCookiebotDialog';
    const el = Array.from(document.querySelectorAll(sel)).find((e) => {
      const r = e.getBoundingClientRect();
      const st = getComputedStyle(e);
      return r.width > 0 && r.height > 0 && st.visibility !== 'hidden' && st.display !== 'none' && /cookie|consent/i.test(e.innerText || '');
    });
    if (!el) return { bannerFound: false, text: null, hasAccept: false, hasReject: false };
    const labels = Array.from(el.querySelectorAll('button, a, [role="button"]')).map((b) => (b.innerText || '').toLowerCase());
    return {
      bannerFound: true,
      text: (el.innerText || '').trim().slice(0, 300),
      hasAccept: labels.some((b) => /accept|agree|allow|got it|ok/.test(b)),
      hasReject: labels.some((b) => /reject|decline|deny|necessary only|refuse/.test(b)),
    };
  });
}

async function collectMobile(context, audit) {
  const page = await context.newPage();
  try {
    await page.setViewportSize({ width: CONFIG.mobileWidth, height: 812 });
    await page.goto(CONFIG.url, { waitUntil: 'load' });
    audit.mobile = await page.evaluate(
      (w) => ({
        hasViewportMeta: !!document.querySelector('meta[name="viewport"]'),
        horizontalOverflow: document.documentElement.scrollWidth > w + 1,
        viewportWidth: w,
      }),
      CONFIG.mobileWidth
    );
  } finally {
    await page.close().catch(() => {});
  }
}

async function collectCtas(page, context, audit) {
  const ctas = await page.evaluate((max) => {
    const re = /contact|get started|sign up|book|demo|quote|start|join|learn more|request|try|subscribe|get in touch/i;
    return Array.from(document.querySelectorAll('a, button'))
      .filter((el) => {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0 && re.test(el.innerText || '');
      })
      .slice(0, max)
      .map((el) => ({ text: (el.innerText || '').trim().slice(0, 80), href: el.getAttribute('href') || '' }));
  }, CONFIG.maxClicks);

  for (const cta of ctas) {
    try {
      if (cta.href.startsWith('#')) {
        const facts = await page.evaluate((h) => {
          const id = h.slice(1);
          const el = id ? document.getElementById(id) || document.querySelector('[name="' + CSS.escape(id) + '"]') : null;
          return { sectionFound: !!el, hasForm: !!(el && (el.tagName === 'FORM' || el.querySelector('form'))) };
        }, cta.href);
        audit.ctas.push({ kind: 'anchor', text: cta.text, target: cta.href, ...facts });
        continue;
      }
      const p = await context.newPage();
      try {
        if (cta.href) {
          await p.goto(new URL(cta.href, audit.finalUrl || CONFIG.url).toString(), { waitUntil: 'load' });
        } else {
          await p.goto(audit.finalUrl || CONFIG.url, { waitUntil: 'load' });
          await p.getByText(cta.text, { exact: true }).first().click();
          await p.waitForLoadState('load');
        }
        const f = await pageFacts(p);
        audit.ctas.push({
          kind: 'navigation',
          text: cta.text,
          url: p.url(),
          title: f.title,
          hasForm: f.forms.length > 0,
          formPurpose: f.forms.length ? f.forms[0].purpose : null,
          forms: f.forms,
          headings: f.headings.slice(0, 10).map((h) => h.text),
        });
      } finally {
        await p.close().catch(() => {});
      }
    } catch (e) {
      audit.ctas.push({ kind: 'failed', text: cta.text, error: errText(e, 300) });
    }
  }
}

async function collectProbes(context, audit) {
  const homeNorm = norm(audit.finalUrl || CONFIG.url);
  const homeKey = audit.title + '|' + ((audit.headings[0] || {}).text || '');
  for (const path of CONFIG.probePaths) {
    const url = new URL(path, CONFIG.url).toString();
    const probe = {
      path,
      url,
      status: null,
      finalUrl: '',
      redirected: false,
      redirectChain: [],
      redirectedToHome: false,
      servesHomeContent: false,
      title: '',
      heading: null,
      forms: [],
      error: null,
    };
    const p = await context.newPage();
    try {
      const r = await p.goto(url, { waitUntil: 'load' });
      await p.waitForTimeout(500);
      probe.status = r ? r.status() : null;
      probe.finalUrl = p.url();
      if (r) {
        const chain = [];
        let req = r.request().redirectedFrom();
        while (req) {
          chain.unshift(req.url());
          req = req.redirectedFrom();
        }
        probe.redirectChain = chain;
        probe.redirected = chain.length > 0;
      }
      probe.redirectedToHome = norm(probe.finalUrl) === homeNorm;
      const f = await pageFacts(p);
      probe.title = f.title;
      probe.heading = f.headings.length ? f.headings[0].text : null;
      probe.forms = f.forms;
      probe.servesHomeContent = !probe.redirectedToHome && f.title + '|' + (probe.heading || '') === homeKey;
    } catch (e) {
      probe.error = errText(e, 300);
    } finally {
      await p.close().catch(() => {});
    }
    audit.probes.push(probe);
  }
}

(async () => {
  const audit = {
    url: CONFIG.url,
    finalUrl: '',
    status: null,
    title: '',
    headings: [],
    forms: [],
    links: [],
    fonts: [],
    ctas: [],
    cookieConsent: { bannerFound: false, text: null, hasAccept: false, hasReject: false },
    probes: [],
    performance: {},
    mobile: { hasViewportMeta: false, horizontalOverflow: false, viewportWidth: CONFIG.mobileWidth },
    fatalError: null,
  };
  let browser;
  try {
    browser = await chromium.launch({ headless: true });
    const context = await browser.newContext({ ignoreHTTPSErrors: true });
    context.setDefaultTimeout(CONFIG.navTimeoutMs);
    const page = await context.newPage();
    const resp = await page.goto(CONFIG.url, { waitUntil: 'load' });
    audit.status = resp ? resp.status() : null;
    audit.finalUrl = page.url();
    await collectHome(page, audit);
    await collectMobile(context, audit).catch((e) => console.error('mobile check failed: ' + errText(e, 200)));
    await collectCtas(page, context, audit);
    await collectProbes(context, audit);
  } catch (e) {
    audit.fatalError = errText(e, 500);
  } finally {
    if (browser) await browser.close().catch(() => {});
    process.stdout.write('\n' + CONFIG.begin + '\n' + JSON.stringify(audit) + '\n' + CONFIG.end + '\n');
  }
})();
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_injected_once() {
        let script = render_script(&ScriptOptions::new(
            "https://site.example",
            vec!["/privacy".into()],
            5,
        ))
        .unwrap();
        assert!(!script.contains("__CONFIG__"));
        assert!(script.contains(r#""url":"https://site.example""#));
        assert!(script.contains(r#""probePaths":["/privacy"]"#));
        assert!(script.contains(r#""maxClicks":5"#));
        assert!(script.contains(BEGIN_SENTINEL));
    }

    #[test]
    fn audit_between_sentinels() {
        let stdout = format!(
            "npm warn something\n{BEGIN_SENTINEL}\n{{\"url\":\"u\"}}\n{END_SENTINEL}\n"
        );
        assert_eq!(extract_audit_json(&stdout), Some("{\"url\":\"u\"}"));
        assert_eq!(extract_audit_json("no sentinels"), None);
        assert_eq!(extract_audit_json(&format!("{BEGIN_SENTINEL}\n{{}}")), None);
        assert_eq!(
            extract_audit_json(&format!("{BEGIN_SENTINEL}\n{END_SENTINEL}")),
            None
        );
    }
}

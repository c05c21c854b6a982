//! Built-in file-edit patterns, highest priority first

use super::document::Document;
use super::{EditMatch, EditPattern};
use once_cell::sync::Lazy;
use regex::Regex;

/// Bytes of prose searched before a block by the bare-path fallback
pub const BARE_PATH_WINDOW: usize = 200;

static FILE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[#>*_\-\s]*(?:\*\*|__)?\s*file(?:\s*(?:path|name))?\s*:\s*(.+)$")
        .expect("valid regex")
});

static BOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[-*+]\s+|\d+[.)]\s+)?(?:\*\*|__)(.+?)(?:\*\*|__)\s*:?$").expect("valid regex")
});

static BACKTICKED: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\s]+)`").expect("valid regex"));

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_./\\@~+\-\[\]()]+").expect("valid regex"));

static HEADING_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:\d+[.)]\s*)?(?:(?:file|path|updated|new|create|created|modify|modified)\s*:?\s+)?")
        .expect("valid regex")
});

/// Extension-less names accepted as paths
const BARE_NAMES: &[&str] = &[
    "Dockerfile",
    "Makefile",
    "Procfile",
    "LICENSE",
    "Gemfile",
    "Rakefile",
    "Jenkinsfile",
    "Containerfile",
];

/// `FILE: path` on the line directly above the block
#[derive(Debug, Default, Clone, Copy)]
pub struct FileMarker;

impl EditPattern for FileMarker {
    fn name(&self) -> &'static str {
        "file-marker"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn find(&self, doc: &Document<'_>) -> Vec<EditMatch> {
        (0..doc.blocks.len())
            .filter_map(|idx| {
                let line = doc.preceding_line(idx)?;
                let raw = FILE_MARKER.captures(line)?.get(1)?.as_str();
                let path = clean_path(raw).filter(|p| looks_like_path(p))?;
                Some(EditMatch { block: idx, path })
            })
            .collect()
    }
}

/// Path in the fence info string: ```` ```css:src/a.css ````
#[derive(Debug, Default, Clone, Copy)]
pub struct FenceSuffix;

impl EditPattern for FenceSuffix {
    fn name(&self) -> &'static str {
        "fence-suffix"
    }

    fn priority(&self) -> u32 {
        80
    }

    fn find(&self, doc: &Document<'_>) -> Vec<EditMatch> {
        doc.blocks
            .iter()
            .enumerate()
            .filter_map(|(idx, block)| {
                let (_, raw) = block.info.split_once(':')?;
                let path = clean_path(raw).filter(|p| looks_like_path(p))?;
                Some(EditMatch { block: idx, path })
            })
            .collect()
    }
}

/// Bold path on the line above the block: `**src/a.css**`
#[derive(Debug, Default, Clone, Copy)]
pub struct BoldMarker;

impl EditPattern for BoldMarker {
    fn name(&self) -> &'static str {
        "bold-marker"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn find(&self, doc: &Document<'_>) -> Vec<EditMatch> {
        (0..doc.blocks.len())
            .filter_map(|idx| {
                let line = doc.preceding_line(idx)?;
                let inner = BOLD.captures(line)?.get(1)?.as_str();
                let path = path_in_label(inner)?;
                Some(EditMatch { block: idx, path })
            })
            .collect()
    }
}

/// Markdown heading naming the file, directly introducing the block
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadingPath;

impl EditPattern for HeadingPath {
    fn name(&self) -> &'static str {
        "heading"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn find(&self, doc: &Document<'_>) -> Vec<EditMatch> {
        (0..doc.blocks.len())
            .filter_map(|idx| {
                let heading = doc.heading_before(idx)?;
                let label = HEADING_PREFIX.replace(&heading.text, "");
                let path = path_in_label(&label)?;
                Some(EditMatch { block: idx, path })
            })
            .collect()
    }
}

/// Last path-like token shortly before the block
///
/// Only consulted when no other pattern matched anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct BarePath;

impl EditPattern for BarePath {
    fn name(&self) -> &'static str {
        "bare-path"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn is_fallback(&self) -> bool {
        true
    }

    fn find(&self, doc: &Document<'_>) -> Vec<EditMatch> {
        (0..doc.blocks.len())
            .filter_map(|idx| {
                let window = doc.window_before(idx, BARE_PATH_WINDOW);
                let path = TOKEN
                    .find_iter(window)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .filter_map(|m| clean_path(m.as_str()))
                    .find(|p| looks_like_path(p))?;
                Some(EditMatch { block: idx, path })
            })
            .collect()
    }
}

/// Normalize a raw path candidate
///
/// Strips decoration (backticks, quotes, emphasis, trailing colon), a leading
/// `./`, and converts backslashes. `None` for empty or whitespace-containing
/// candidates and URLs.
#[must_use]
pub fn clean_path(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '*' | ':' | ','))
        .trim_end_matches('.')
        .trim();
    let mut path = trimmed.replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    if path.is_empty() || path.contains(char::is_whitespace) || path.contains("://") {
        return None;
    }
    Some(path)
}

/// Whether `path` names a file
///
/// The last segment needs an extension with at least one non-digit character
/// (so `v1.2` is rejected) or must be a well-known extension-less name.
#[must_use]
pub fn looks_like_path(path: &str) -> bool {
    if path.ends_with('/') || path.split('/').any(|seg| seg == "..") {
        return false;
    }
    let Some(name) = path.rsplit('/').next() else {
        return false;
    };
    if BARE_NAMES.contains(&name) {
        return true;
    }
    match name.rsplit_once('.') {
        Some((_, ext)) => {
            !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && ext.chars().any(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Path inside a label: the whole label, else a single backticked token
fn path_in_label(label: &str) -> Option<String> {
    if let Some(path) = clean_path(label).filter(|p| looks_like_path(p)) {
        return Some(path);
    }
    BACKTICKED
        .captures_iter(label)
        .filter_map(|c| c.get(1))
        .filter_map(|m| clean_path(m.as_str()))
        .find(|p| looks_like_path(p))
}

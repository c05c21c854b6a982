//! File-edit extraction from coding-agent output
//!
//! Agents describe file edits in several Markdown dialects. Each dialect is an
//! [`EditPattern`]; an [`EditPatternSet`] runs them in priority order:
//! - `FILE: path` marker above a fence
//! - `lang:path` fence info string
//! - bold path above a fence
//! - heading naming the path
//! - bare path-like token shortly before a fence (fallback)
//!
//! The first pattern to claim a path wins, a block is used at most once, and
//! fallback patterns only run when nothing else matched.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

mod document;
mod patterns;

pub use document::{Document, FencedBlock, Heading};
pub use patterns::{
    clean_path, looks_like_path, BarePath, BoldMarker, FenceSuffix, FileMarker, HeadingPath,
    BARE_PATH_WINDOW,
};

/// One file to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    /// Normalized relative path
    pub path: String,
    /// Full file content, leading/trailing blank lines trimmed
    pub content: String,
}

impl FileEdit {
    /// Create new edit
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A pattern's claim on a fenced block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditMatch {
    /// Index into [`Document::blocks`]
    pub block: usize,
    /// Normalized path
    pub path: String,
}

/// One way of pairing fenced blocks with file paths
pub trait EditPattern: Send + Sync + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Higher runs first
    fn priority(&self) -> u32;

    /// Fallback patterns only run when no regular pattern matched
    fn is_fallback(&self) -> bool {
        false
    }

    /// Claims in block order
    fn find(&self, doc: &Document<'_>) -> Vec<EditMatch>;
}

/// Ordered set of edit patterns
pub struct EditPatternSet {
    patterns: Vec<Box<dyn EditPattern>>,
}

impl Default for EditPatternSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register(FileMarker);
        set.register(FenceSuffix);
        set.register(BoldMarker);
        set.register(HeadingPath);
        set.register(BarePath);
        set
    }
}

impl std::fmt::Debug for EditPatternSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditPatternSet")
            .field("patterns", &self.names())
            .finish()
    }
}

impl EditPatternSet {
    /// Create set without patterns
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Register a pattern
    pub fn register<P: EditPattern>(&mut self, pattern: P) {
        self.patterns.push(Box::new(pattern));
        // Stable sort keeps registration order among equal priorities
        self.patterns
            .sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Pattern names in run order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name()).collect()
    }

    /// Extract file edits from `text`
    ///
    /// Never fails; unrecognized text yields an empty list.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<FileEdit> {
        let doc = Document::parse(text);
        if doc.blocks.is_empty() {
            return Vec::new();
        }

        let mut claimed = vec![false; doc.blocks.len()];
        let mut edits: IndexMap<String, FileEdit> = IndexMap::new();

        for pattern in self.patterns.iter().filter(|p| !p.is_fallback()) {
            apply(pattern.as_ref(), &doc, &mut claimed, &mut edits);
        }
        if edits.is_empty() {
            for pattern in self.patterns.iter().filter(|p| p.is_fallback()) {
                apply(pattern.as_ref(), &doc, &mut claimed, &mut edits);
            }
        }

        tracing::debug!(
            blocks = doc.blocks.len(),
            edits = edits.len(),
            "extracted file edits"
        );
        edits.into_values().collect()
    }
}

fn apply(
    pattern: &dyn EditPattern,
    doc: &Document<'_>,
    claimed: &mut [bool],
    edits: &mut IndexMap<String, FileEdit>,
) {
    for m in pattern.find(doc) {
        let Some(block) = doc.blocks.get(m.block) else {
            continue;
        };
        if claimed[m.block] || edits.contains_key(&m.path) {
            continue;
        }
        let content = trim_blank_lines(block.body);
        if content.is_empty() {
            continue;
        }
        tracing::trace!(pattern = pattern.name(), path = %m.path, "edit matched");
        claimed[m.block] = true;
        edits.insert(m.path.clone(), FileEdit::new(m.path, content));
    }
}

/// Extract file edits with the default pattern set
#[must_use]
pub fn extract_file_edits(text: &str) -> Vec<FileEdit> {
    EditPatternSet::default().extract(text)
}

/// Drop leading and trailing blank lines, keep interior text verbatim
#[must_use]
pub fn trim_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Render edits in the `FILE:` dialect
///
/// The fence grows past any backtick run inside the content, so the output
/// extracts back to the same edits.
#[must_use]
pub fn render_file_edits(edits: &[FileEdit]) -> String {
    let mut out = String::new();
    for edit in edits {
        let longest = edit
            .content
            .lines()
            .map(|l| l.trim_start().chars().take_while(|c| *c == '`').count())
            .max()
            .unwrap_or(0);
        let fence = "`".repeat(longest.max(2) + 1);
        out.push_str("FILE: ");
        out.push_str(&edit.path);
        out.push('\n');
        out.push_str(&fence);
        out.push('\n');
        out.push_str(&edit.content);
        out.push('\n');
        out.push_str(&fence);
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn default_order() {
        assert_eq!(
            EditPatternSet::default().names(),
            ["file-marker", "fence-suffix", "bold-marker", "heading", "bare-path"]
        );
    }

    #[test]
    fn marker_and_suffix_blocks() {
        let text = "Here are the changes.\n\nFILE: a.css\n```css\n\nbody { color: red; }\n\n```\n\n```js:b.js\nconsole.log(1);\n```\n";
        let edits = extract_file_edits(text);
        assert_eq!(
            edits,
            vec![
                FileEdit::new("a.css", "body { color: red; }"),
                FileEdit::new("b.js", "console.log(1);"),
            ]
        );
    }

    #[test]
    fn marker_and_bold_blocks_without_duplicates() {
        let text = "FILE: a.css\n```css\n\na { color: red; }\n\n```\n\n**b.js**\n```js\nb();\n```\n\n**a.css**\n```css\nagain\n```\n";
        let edits = extract_file_edits(text);
        assert_eq!(
            edits,
            vec![
                FileEdit::new("a.css", "a { color: red; }"),
                FileEdit::new("b.js", "b();"),
            ]
        );
    }

    #[test]
    fn first_claim_on_a_path_wins() {
        let text = "FILE: a.css\n```css\nfirst\n```\n```css:a.css\nsecond\n```\n";
        let edits = extract_file_edits(text);
        assert_eq!(edits, vec![FileEdit::new("a.css", "first")]);
    }

    #[test]
    fn block_is_used_once() {
        // Heading and marker both point at the only block
        let text = "## other.css\nFILE: a.css\n```css\nx\n```\n";
        let edits = extract_file_edits(text);
        assert_eq!(edits, vec![FileEdit::new("a.css", "x")]);
    }

    #[test]
    fn fallback_only_without_other_matches() {
        let text = "Put this into src/app.js:\n```js\nrun();\n```\n";
        assert_eq!(extract_file_edits(text), vec![FileEdit::new("src/app.js", "run();")]);

        let text = "FILE: a.css\n```css\na{}\n```\nAlso src/app.js:\n```js\nrun();\n```\n";
        assert_eq!(extract_file_edits(text), vec![FileEdit::new("a.css", "a{}")]);
    }

    #[test]
    fn truncated_reply_yields_no_edit() {
        let text = "FILE: a.css\n```css\na { color: red; }\n";
        assert!(extract_file_edits(text).is_empty());
    }

    #[test]
    fn no_blocks_no_edits() {
        assert!(extract_file_edits("I could not make any changes.").is_empty());
        assert!(extract_file_edits("").is_empty());
    }

    #[test]
    fn render_survives_backticks_in_content() {
        let edits = vec![FileEdit::new("README.md", "```sh\nmake\n```")];
        assert_eq!(extract_file_edits(&render_file_edits(&edits)), edits);
    }

    #[test]
    fn interior_blank_lines_kept() {
        assert_eq!(trim_blank_lines("\n\na\n\nb\n  \n"), "a\n\nb");
        assert_eq!(trim_blank_lines(" \n\n"), "");
    }

    fn edit_strategy() -> impl Strategy<Value = FileEdit> {
        (
            "[a-z]{1,8}(/[a-z]{1,8}){0,2}\\.(js|css|html|rs)",
            prop::collection::vec("[a-zA-Z0-9 =;(){}<>]{1,30}", 1..6),
        )
            .prop_map(|(path, lines)| {
                FileEdit::new(path, trim_blank_lines(&lines.join("\n")))
            })
            .prop_filter("non-empty content", |e| !e.content.is_empty())
    }

    proptest! {
        #[test]
        fn extraction_is_idempotent(edits in prop::collection::vec(edit_strategy(), 0..5)) {
            let once = extract_file_edits(&render_file_edits(&edits));
            let twice = extract_file_edits(&render_file_edits(&once));
            prop_assert_eq!(once, twice);
        }
    }
}

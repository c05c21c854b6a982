//! Fenced-block and heading scan shared by every edit pattern

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// One fenced code block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Byte offset of the opening fence line
    pub start: usize,
    /// Byte offset just past the closing fence line
    pub end: usize,
    /// Info string after the opening fence (`rust`, `css:src/a.css`, ...)
    pub info: &'a str,
    /// Raw body between the fences
    pub body: &'a str,
}

/// Markdown heading with its byte span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Heading level 1-6
    pub level: u8,
    /// Plain text (inline code included, emphasis markers dropped)
    pub text: String,
    /// Byte offset of the heading start
    pub start: usize,
    /// Byte offset just past the heading
    pub end: usize,
}

/// Pre-scanned agent output
#[derive(Debug, Clone)]
pub struct Document<'a> {
    /// Original text
    pub text: &'a str,
    /// Closed fenced blocks in order of appearance
    pub blocks: Vec<FencedBlock<'a>>,
    /// Headings outside code blocks
    pub headings: Vec<Heading>,
}

impl<'a> Document<'a> {
    /// Scan `text`
    #[must_use]
    pub fn parse(text: &'a str) -> Self {
        Self {
            text,
            blocks: fenced_blocks(text),
            headings: headings(text),
        }
    }

    /// Text between the previous block (or start of input) and block `idx`
    #[must_use]
    pub fn gap_before(&self, idx: usize) -> &'a str {
        let Some(block) = self.blocks.get(idx) else {
            return "";
        };
        let from = idx
            .checked_sub(1)
            .and_then(|prev| self.blocks.get(prev))
            .map_or(0, |prev| prev.end);
        &self.text[from.min(block.start)..block.start]
    }

    /// Last non-blank line in the gap before block `idx`
    #[must_use]
    pub fn preceding_line(&self, idx: usize) -> Option<&'a str> {
        self.gap_before(idx)
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
    }

    /// Up to `max_bytes` of the gap before block `idx`, cut on a char boundary
    #[must_use]
    pub fn window_before(&self, idx: usize, max_bytes: usize) -> &'a str {
        let gap = self.gap_before(idx);
        let mut cut = gap.len().saturating_sub(max_bytes);
        while !gap.is_char_boundary(cut) {
            cut += 1;
        }
        &gap[cut..]
    }

    /// Heading that directly introduces block `idx`
    ///
    /// The heading must come after the previous block and be the last heading
    /// before this one.
    #[must_use]
    pub fn heading_before(&self, idx: usize) -> Option<&Heading> {
        let block = self.blocks.get(idx)?;
        let floor = idx
            .checked_sub(1)
            .and_then(|prev| self.blocks.get(prev))
            .map_or(0, |prev| prev.end);
        self.headings
            .iter()
            .rev()
            .find(|h| h.end <= block.start)
            .filter(|h| h.start >= floor)
    }
}

/// Scan closed fenced blocks (``` or ~~~, three or more)
///
/// Unterminated blocks are ignored: a truncated response must not turn into a
/// truncated file. pulldown-cmark closes an open fence at end of input, so
/// fences are matched line by line here instead.
#[must_use]
pub(super) fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let lines: Vec<(usize, &str)> = line_offsets(text).collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let (offset, line) = lines[i];
        let Some((fence_char, fence_len, info)) = opening_fence(line) else {
            i += 1;
            continue;
        };

        let body_start = offset + line.len();
        let close = lines[i + 1..]
            .iter()
            .position(|(_, l)| is_closing_fence(l, fence_char, fence_len))
            .map(|p| i + 1 + p);

        match close {
            Some(j) => {
                let (close_offset, close_line) = lines[j];
                blocks.push(FencedBlock {
                    start: offset,
                    end: close_offset + close_line.len(),
                    info,
                    body: &text[body_start..close_offset],
                });
                i = j + 1;
            }
            None => i += 1,
        }
    }
    blocks
}

/// Headings outside code blocks, via pulldown-cmark
#[must_use]
pub(super) fn headings(text: &str) -> Vec<Heading> {
    let mut out = Vec::new();
    let mut current: Option<Heading> = None;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(Heading {
                    level: heading_level(level),
                    text: String::new(),
                    start: range.start,
                    end: range.end,
                });
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some(h) = current.as_mut() {
                    h.text.push_str(&t);
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut h) = current.take() {
                    h.end = range.end;
                    h.text = h.text.trim().to_string();
                    out.push(h);
                }
            }
            _ => {}
        }
    }
    out
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Lines with their byte offsets, newline included in each line
fn line_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0usize, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

fn opening_fence(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start();
    let fence_char = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let fence_len = trimmed.chars().take_while(|c| *c == fence_char).count();
    if fence_len < 3 {
        return None;
    }
    let info = trimmed[fence_len..].trim();
    if fence_char == '`' && info.contains('`') {
        return None;
    }
    Some((fence_char, fence_len, info))
}

fn is_closing_fence(line: &str, fence_char: char, fence_len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= fence_len && trimmed.chars().all(|c| c == fence_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_blocks_with_info() {
        let text = "intro\n```css:a.css\nbody { }\n```\ntext\n~~~\nplain\n~~~\n";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].info, "css:a.css");
        assert_eq!(blocks[0].body, "body { }\n");
        assert_eq!(blocks[1].info, "");
        assert_eq!(blocks[1].body, "plain\n");
    }

    #[test]
    fn longer_fence_contains_shorter() {
        let text = "````md\n```js\nx\n```\n````\n";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, "```js\nx\n```\n");
    }

    #[test]
    fn unterminated_block_is_ignored() {
        assert!(fenced_blocks("```js\nconst a = 1;\n").is_empty());
    }

    #[test]
    fn heading_inside_code_is_not_a_heading() {
        let text = "## src/app.py\n```python\n# comment\nprint()\n```\n";
        let hs = headings(text);
        assert_eq!(hs.len(), 1);
        assert_eq!(hs[0].text, "src/app.py");
    }

    #[test]
    fn heading_before_requires_no_block_in_between() {
        let text = "## a.js\n```js\n1\n```\n```js\n2\n```\n";
        let doc = Document::parse(text);
        assert!(doc.heading_before(0).is_some());
        assert!(doc.heading_before(1).is_none());
    }

    #[test]
    fn window_respects_char_boundaries() {
        let text = "ééééé see path.js\n```\nx\n```\n";
        let doc = Document::parse(text);
        let w = doc.window_before(0, 15);
        assert!(w.ends_with("path.js\n"));
    }

    #[test]
    fn preceding_line_skips_blank_lines() {
        let text = "FILE: a.css\n\n```css\na{}\n```\n";
        let doc = Document::parse(text);
        assert_eq!(doc.preceding_line(0), Some("FILE: a.css"));
    }
}

//! Heading-scoped section parsing for prose documents.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// A heading and the text under it, up to the next heading of any level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading text without markers; empty for the preamble
    pub heading: String,

    /// Heading level 1-6; 0 for the preamble
    pub level: u8,

    /// First line of the section, the heading itself (1-indexed)
    pub start_line: usize,

    /// Last line of the section (1-indexed, inclusive)
    pub end_line: usize,

    /// Body text, excluding the heading line(s)
    pub content: String,
}

/// A document as an ordered list of sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub sections: Vec<Section>,
}

struct HeadingSpan {
    level: u8,
    text: String,
    start_line: usize,
    end_line: usize,
}

/// Parse Markdown into sections.
///
/// ATX (`# Title`) and Setext (`Title\n=====`) headings both start a
/// section; `#` lines inside fenced or indented code do not. Text before the
/// first heading becomes a level-0 section with an empty heading.
pub fn parse_markdown(text: &str) -> ParsedDocument {
    let line_starts = line_starts(text);
    let lines: Vec<&str> = text.lines().collect();
    let headings = collect_headings(text, &line_starts);

    if headings.is_empty() {
        return parse_plain(text);
    }

    let mut sections = Vec::with_capacity(headings.len() + 1);

    let first_start = headings[0].start_line;
    if first_start > 1 {
        sections.push(Section {
            heading: String::new(),
            level: 0,
            start_line: 1,
            end_line: first_start - 1,
            content: body(&lines, 1, first_start - 1),
        });
    }

    for (i, heading) in headings.iter().enumerate() {
        let end_line = headings
            .get(i + 1)
            .map(|next| next.start_line - 1)
            .unwrap_or(lines.len())
            .max(heading.end_line);

        sections.push(Section {
            heading: heading.text.clone(),
            level: heading.level,
            start_line: heading.start_line,
            end_line,
            content: body(&lines, heading.end_line + 1, end_line),
        });
    }

    ParsedDocument { sections }
}

/// Treat the whole text as a single untitled section.
pub fn parse_plain(text: &str) -> ParsedDocument {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return ParsedDocument::default();
    }

    ParsedDocument {
        sections: vec![Section {
            heading: String::new(),
            level: 0,
            start_line: 1,
            end_line: lines.len(),
            content: body(&lines, 1, lines.len()),
        }],
    }
}

fn collect_headings(text: &str, line_starts: &[usize]) -> Vec<HeadingSpan> {
    let mut headings = Vec::new();
    let mut current: Option<HeadingSpan> = None;

    for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(HeadingSpan {
                    level: level as u8,
                    text: String::new(),
                    start_line: line_of(line_starts, range.start),
                    end_line: line_of(line_starts, last_content_byte(text, range.start, range.end)),
                });
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push(' ');
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut heading) = current.take() {
                    heading.text = heading.text.trim().to_string();
                    headings.push(heading);
                }
            }
            _ => {}
        }
    }

    headings
}

/// Byte offset of the start of every line.
fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// 1-indexed line containing byte `offset`.
fn line_of(line_starts: &[usize], offset: usize) -> usize {
    match line_starts.binary_search(&offset) {
        Ok(i) => i + 1,
        Err(i) => i,
    }
}

/// Offset of the last byte in `start..end` that is not a line terminator.
fn last_content_byte(text: &str, start: usize, end: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = end.min(bytes.len());
    while i > start + 1 && matches!(bytes[i - 1], b'\n' | b'\r') {
        i -= 1;
    }
    i.saturating_sub(1).max(start)
}

/// Lines `from..=to` (1-indexed) with leading and trailing blank lines removed.
fn body(lines: &[&str], from: usize, to: usize) -> String {
    if from > to || from > lines.len() {
        return String::new();
    }
    let slice = &lines[from - 1..to.min(lines.len())];

    let first = slice.iter().position(|l| !l.trim().is_empty());
    let last = slice.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => slice[first..=last].join("\n"),
        _ => String::new(),
    }
}

//! Size-bounded text splitting shared by the doc chunker and the embedding batcher.
//!
//! Sizes are measured in characters, not bytes, and splits never land inside
//! a UTF-8 code point.

/// Number of characters in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into blank-line separated paragraphs.
///
/// Runs of blank (whitespace-only) lines collapse into a single boundary and
/// never produce empty paragraphs.
pub fn paragraphs(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                result.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        result.push(current.join("\n"));
    }

    result
}

/// Greedily pack paragraphs into buffers of at most `max_chars`.
///
/// The buffer is flushed whenever adding the next paragraph would exceed the
/// ceiling and the buffer is non-empty. A paragraph that alone exceeds the
/// ceiling is emitted whole: paragraphs are never broken here.
pub fn pack_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    pack(paragraphs(text), "\n\n", max_chars, |p| vec![p.to_string()])
}

/// Split `text` into pieces that each fit `max_chars`.
///
/// Paragraph boundaries are preferred, then line boundaries, and a single
/// line longer than the ceiling is cut at exact character offsets. Text that
/// already fits is returned unchanged as one piece.
pub fn split_to_fit(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    pack(paragraphs(text), "\n\n", max_chars, |paragraph| {
        pack(paragraph.lines(), "\n", max_chars, |line| {
            hard_split(line, max_chars)
        })
    })
}

/// Cut `text` every `max_chars` characters.
pub fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

fn pack<I, S, F>(parts: I, separator: &str, max_chars: usize, mut oversized: F) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(&str) -> Vec<String>,
{
    let separator_len = char_len(separator);
    let mut pieces = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    for part in parts {
        let part = part.as_ref();
        if part.trim().is_empty() {
            continue;
        }
        let part_len = char_len(part);

        if part_len > max_chars {
            if !buffer.is_empty() {
                pieces.push(std::mem::take(&mut buffer));
                buffer_len = 0;
            }
            pieces.extend(oversized(part));
            continue;
        }

        if !buffer.is_empty() && buffer_len + separator_len + part_len > max_chars {
            pieces.push(std::mem::take(&mut buffer));
            buffer_len = 0;
        }

        if !buffer.is_empty() {
            buffer.push_str(separator);
            buffer_len += separator_len;
        }
        buffer.push_str(part);
        buffer_len += part_len;
    }

    if !buffer.is_empty() {
        pieces.push(buffer);
    }

    pieces
}

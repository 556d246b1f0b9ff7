//! Symbol end-line detection.
//!
//! A [`BoundaryStrategy`] answers one question: given the lines of a file and
//! the line where a symbol was declared, on which line does it end? The
//! chunking pipeline only depends on this contract, so a real parser can
//! replace the heuristics below per language.

/// Strategy for finding where a symbol ends.
pub trait BoundaryStrategy: Send + Sync {
    /// Return the 0-based index of the symbol's last line.
    ///
    /// `start` is the 0-based declaration line and must be `< lines.len()`.
    /// The result is always in `start..lines.len()`.
    fn end_line(&self, lines: &[&str], start: usize) -> usize;
}

/// Brace balancing for C-family syntax.
///
/// If the declaration line or a following line opens a brace, depth is
/// tracked character by character until it returns to zero. Otherwise the
/// symbol ends on the first line terminated by `;`, on the line before the
/// first blank line, or after `max_lines` lines.
///
/// Braces inside strings and comments are counted like any other brace.
#[derive(Debug, Clone)]
pub struct BraceBalance {
    pub max_lines: usize,
}

impl Default for BraceBalance {
    fn default() -> Self {
        Self { max_lines: 50 }
    }
}

impl BoundaryStrategy for BraceBalance {
    fn end_line(&self, lines: &[&str], start: usize) -> usize {
        let last = lines.len().saturating_sub(1);
        let cap = (start + self.max_lines.max(1) - 1).min(last);
        let mut depth: i64 = 0;
        let mut opened = false;

        for (i, line) in lines.iter().enumerate().skip(start) {
            for ch in line.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' if opened => depth -= 1,
                    _ => {}
                }
            }

            if opened {
                if depth <= 0 {
                    return i;
                }
                continue;
            }

            if line.trim_end().ends_with(';') {
                return i;
            }
            if i > start && line.trim().is_empty() {
                return i - 1;
            }
            if i >= cap {
                return i;
            }
        }

        last
    }
}

/// Indentation scoping for Python-like syntax.
///
/// The symbol covers every following line that is blank or indented deeper
/// than the declaration, up to `max_lines` lines; trailing blank lines are
/// not included.
#[derive(Debug, Clone)]
pub struct Indentation {
    pub max_lines: usize,
}

impl Default for Indentation {
    fn default() -> Self {
        Self { max_lines: 50 }
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

impl BoundaryStrategy for Indentation {
    fn end_line(&self, lines: &[&str], start: usize) -> usize {
        let base = indent_width(lines[start]);
        let cap = start + self.max_lines.max(1) - 1;
        let mut end = start;

        for (i, line) in lines.iter().enumerate().skip(start + 1) {
            if i > cap {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            if indent_width(line) > base {
                end = i;
            } else {
                break;
            }
        }

        end
    }
}

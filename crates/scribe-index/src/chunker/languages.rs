//! Per-language symbol patterns and boundary strategies.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use super::boundary::{BoundaryStrategy, BraceBalance, Indentation};
use super::SymbolType;

/// A named declaration pattern. Capture group 1 is the symbol name.
pub struct SymbolPattern {
    pub symbol_type: SymbolType,
    pub regex: Regex,
}

/// Everything the code chunker needs to extract symbols for one language.
pub struct LanguageRules {
    /// Tried in order; the first match wins
    pub patterns: Vec<SymbolPattern>,

    /// Lines starting with one of these (after indentation) are never tested
    pub comment_prefixes: &'static [&'static str],

    pub boundary: Box<dyn BoundaryStrategy>,
}

impl LanguageRules {
    /// Match a line against the patterns, returning the symbol type and name.
    pub fn match_line(&self, line: &str) -> Option<(SymbolType, String)> {
        let trimmed = line.trim_start();
        if trimmed.is_empty()
            || self
                .comment_prefixes
                .iter()
                .any(|prefix| trimmed.starts_with(prefix))
        {
            return None;
        }

        self.patterns.iter().find_map(|pattern| {
            pattern
                .regex
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|name| (pattern.symbol_type, name.as_str().to_string()))
        })
    }
}

const C_FAMILY_COMMENTS: &[&str] = &["//", "/*", "*"];
const HASH_COMMENTS: &[&str] = &["#"];

fn compile(patterns: &[(SymbolType, &str)]) -> Result<Vec<SymbolPattern>> {
    patterns
        .iter()
        .map(|(symbol_type, pattern)| {
            Ok(SymbolPattern {
                symbol_type: *symbol_type,
                regex: Regex::new(pattern)
                    .with_context(|| format!("invalid symbol pattern: {pattern}"))?,
            })
        })
        .collect()
}

/// TypeScript and JavaScript declarations.
///
/// Arrow-function assignments are tried before plain exported bindings so
/// `export const handler = async () => {}` is a function, not a const.
pub fn ecmascript(max_unbraced_lines: usize) -> Result<LanguageRules> {
    const IDENT: &str = r"[A-Za-z_$][\w$]*";
    let patterns = [
        (
            SymbolType::Function,
            format!(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*({IDENT})"),
        ),
        (
            SymbolType::Class,
            format!(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+({IDENT})"),
        ),
        (
            SymbolType::Interface,
            format!(r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+({IDENT})"),
        ),
        (
            SymbolType::Type,
            format!(r"^\s*(?:export\s+)?(?:declare\s+)?type\s+({IDENT})\s*(?:<[^=]*>)?\s*="),
        ),
        (
            SymbolType::Function,
            format!(
                r"^\s*(?:export\s+)?(?:const|let|var)\s+({IDENT})\s*(?::[^=]*)?=\s*(?:async\s+)?(?:function\b|\(.*\)\s*(?::.*)?=>|\(\s*$|{IDENT}\s*=>)"
            ),
        ),
        (
            SymbolType::Const,
            format!(r"^\s*export\s+(?:const|let)\s+({IDENT})"),
        ),
    ];
    let patterns: Vec<(SymbolType, &str)> =
        patterns.iter().map(|(t, p)| (*t, p.as_str())).collect();

    Ok(LanguageRules {
        patterns: compile(&patterns)?,
        comment_prefixes: C_FAMILY_COMMENTS,
        boundary: Box::new(BraceBalance {
            max_lines: max_unbraced_lines,
        }),
    })
}

/// Rust items. Structs, enums and impl blocks map to `class`, traits to `interface`.
pub fn rust(max_unbraced_lines: usize) -> Result<LanguageRules> {
    const VIS: &str = r"(?:pub(?:\([^)]*\))?\s+)?";
    let patterns = [
        (
            SymbolType::Function,
            format!(
                r#"^\s*{VIS}(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#
            ),
        ),
        (
            SymbolType::Class,
            format!(r"^\s*{VIS}(?:struct|enum|union)\s+([A-Za-z_]\w*)"),
        ),
        (
            SymbolType::Class,
            r"^\s*(?:unsafe\s+)?impl\b(?:\s*<[^>]*>)?\s+(?:[A-Za-z_][\w:]*(?:<[^>]*>)?\s+for\s+)?([A-Za-z_]\w*)"
                .to_string(),
        ),
        (
            SymbolType::Interface,
            format!(r"^\s*{VIS}(?:unsafe\s+)?trait\s+([A-Za-z_]\w*)"),
        ),
        (SymbolType::Type, format!(r"^\s*{VIS}type\s+([A-Za-z_]\w*)")),
        (
            SymbolType::Const,
            format!(r"^\s*{VIS}(?:const|static)\s+(?:mut\s+)?([A-Za-z_]\w*)\s*:"),
        ),
    ];
    let patterns: Vec<(SymbolType, &str)> =
        patterns.iter().map(|(t, p)| (*t, p.as_str())).collect();

    Ok(LanguageRules {
        patterns: compile(&patterns)?,
        comment_prefixes: &["//"],
        boundary: Box::new(BraceBalance {
            max_lines: max_unbraced_lines,
        }),
    })
}

/// Go declarations.
pub fn go(max_unbraced_lines: usize) -> Result<LanguageRules> {
    Ok(LanguageRules {
        patterns: compile(&[
            (
                SymbolType::Function,
                r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)",
            ),
            (SymbolType::Class, r"^type\s+([A-Za-z_]\w*)\s+struct\b"),
            (SymbolType::Interface, r"^type\s+([A-Za-z_]\w*)\s+interface\b"),
            (SymbolType::Type, r"^type\s+([A-Za-z_]\w*)\b"),
            (SymbolType::Const, r"^(?:const|var)\s+([A-Za-z_]\w*)"),
        ])?,
        comment_prefixes: C_FAMILY_COMMENTS,
        boundary: Box::new(BraceBalance {
            max_lines: max_unbraced_lines,
        }),
    })
}

/// Python definitions, scoped by indentation.
pub fn python(max_lines: usize) -> Result<LanguageRules> {
    Ok(LanguageRules {
        patterns: compile(&[
            (SymbolType::Function, r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)"),
            (SymbolType::Class, r"^\s*class\s+([A-Za-z_]\w*)"),
        ])?,
        comment_prefixes: HASH_COMMENTS,
        boundary: Box::new(Indentation { max_lines }),
    })
}

/// Detect a language name from a file extension.
///
/// Languages without symbol rules are still named so chunks carry the
/// language in their metadata.
pub fn detect_language(path: &Path) -> Option<String> {
    let language = match path.extension()?.to_str()? {
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "rs" => "rust",
        "go" => "go",
        "py" => "python",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "sh" | "bash" => "shell",
        _ => return None,
    };
    Some(language.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecmascript_patterns() {
        let rules = ecmascript(50).unwrap();
        let cases = [
            ("export async function loadUser(id) {", SymbolType::Function, "loadUser"),
            ("function* gen() {", SymbolType::Function, "gen"),
            ("export default class Store {", SymbolType::Class, "Store"),
            ("export interface Options {", SymbolType::Interface, "Options"),
            ("type Pair<A, B> = [A, B];", SymbolType::Type, "Pair"),
            ("export const handler = async (req) => {", SymbolType::Function, "handler"),
            ("const add = (a: number, b: number): number => a + b;", SymbolType::Function, "add"),
            ("const double = x => x * 2;", SymbolType::Function, "double"),
            ("export const DEFAULTS = {", SymbolType::Const, "DEFAULTS"),
        ];
        for (line, ty, name) in cases {
            assert_eq!(
                rules.match_line(line),
                Some((ty, name.to_string())),
                "line: {line}"
            );
        }
    }

    #[test]
    fn test_ecmascript_skips_comments_and_plain_statements() {
        let rules = ecmascript(50).unwrap();
        assert!(rules.match_line("// function commented() {").is_none());
        assert!(rules.match_line(" * class InDocComment").is_none());
        assert!(rules.match_line("const local = 5;").is_none());
        assert!(rules.match_line("return value;").is_none());
        assert!(rules.match_line("   ").is_none());
    }

    #[test]
    fn test_rust_patterns() {
        let rules = rust(50).unwrap();
        assert_eq!(
            rules.match_line("pub(crate) async fn run(&self) -> Result<()> {"),
            Some((SymbolType::Function, "run".to_string()))
        );
        assert_eq!(
            rules.match_line("pub struct Config {"),
            Some((SymbolType::Class, "Config".to_string()))
        );
        assert_eq!(
            rules.match_line("impl<T: Clone> Display for Wrapper<T> {"),
            Some((SymbolType::Class, "Wrapper".to_string()))
        );
        assert_eq!(
            rules.match_line("pub trait Store: Send + Sync {"),
            Some((SymbolType::Interface, "Store".to_string()))
        );
        assert_eq!(
            rules.match_line("pub const MAX: usize = 4;"),
            Some((SymbolType::Const, "MAX".to_string()))
        );
        assert!(rules.match_line("#[derive(Debug)]").is_none());
    }

    #[test]
    fn test_go_patterns() {
        let rules = go(50).unwrap();
        assert_eq!(
            rules.match_line("func (s *Server) Start(ctx context.Context) error {"),
            Some((SymbolType::Function, "Start".to_string()))
        );
        assert_eq!(
            rules.match_line("type Server struct {"),
            Some((SymbolType::Class, "Server".to_string()))
        );
        assert_eq!(
            rules.match_line("type Reader interface {"),
            Some((SymbolType::Interface, "Reader".to_string()))
        );
    }

    #[test]
    fn test_python_patterns() {
        let rules = python(50).unwrap();
        assert_eq!(
            rules.match_line("async def fetch(url):"),
            Some((SymbolType::Function, "fetch".to_string()))
        );
        assert_eq!(
            rules.match_line("class Cache(object):"),
            Some((SymbolType::Class, "Cache".to_string()))
        );
        assert!(rules.match_line("# def not_code():").is_none());
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("a/b.ts")), Some("typescript".to_string()));
        assert_eq!(detect_language(Path::new("x.jsx")), Some("javascript".to_string()));
        assert_eq!(detect_language(Path::new("lib.rs")), Some("rust".to_string()));
        assert_eq!(detect_language(Path::new("main.java")), Some("java".to_string()));
        assert_eq!(detect_language(Path::new("README")), None);
        assert_eq!(detect_language(Path::new("notes.xyz")), None);
    }
}

//! Symbol-aware code chunking.
//!
//! Declarations are found line by line with per-language patterns and their
//! extent comes from the language's [`BoundaryStrategy`]. Files in languages
//! without rules, or where no symbol survives, are cut into overlapping line
//! windows instead.
//!
//! [`BoundaryStrategy`]: super::boundary::BoundaryStrategy

use std::collections::HashMap;

use anyhow::{bail, Result};
use tracing::debug;

use super::languages::{self, LanguageRules};
use super::{chunk_id, Chunk, CodeMetadata, SymbolType};
use crate::splitter::char_len;

/// Configuration for [`CodeChunker`].
#[derive(Debug, Clone)]
pub struct CodeChunkerConfig {
    /// Lines per fallback window
    pub window_lines: usize,

    /// Lines shared by consecutive fallback windows
    pub window_overlap: usize,

    /// Fallback windows with less trimmed text than this are dropped
    pub min_window_chars: usize,

    /// Symbols spanning fewer lines than this are dropped
    pub min_symbol_lines: usize,

    /// Hard cap for symbols whose end cannot be found by braces or indentation
    pub max_symbol_lines: usize,
}

impl Default for CodeChunkerConfig {
    fn default() -> Self {
        Self {
            window_lines: 60,
            window_overlap: 10,
            min_window_chars: 50,
            min_symbol_lines: 2,
            max_symbol_lines: 50,
        }
    }
}

/// Splits source files into symbol-scoped chunks.
pub struct CodeChunker {
    config: CodeChunkerConfig,
    rules: HashMap<&'static str, LanguageRules>,
}

impl CodeChunker {
    /// Create a chunker, compiling the symbol patterns for every supported language.
    pub fn new(config: CodeChunkerConfig) -> Result<Self> {
        if config.window_lines == 0 {
            bail!("window_lines must be greater than zero");
        }
        if config.window_overlap >= config.window_lines {
            bail!(
                "window_overlap ({}) must be smaller than window_lines ({})",
                config.window_overlap,
                config.window_lines
            );
        }

        let cap = config.max_symbol_lines;
        let mut rules = HashMap::new();
        rules.insert("typescript", languages::ecmascript(cap)?);
        rules.insert("javascript", languages::ecmascript(cap)?);
        rules.insert("rust", languages::rust(cap)?);
        rules.insert("go", languages::go(cap)?);
        rules.insert("python", languages::python(cap)?);

        Ok(Self { config, rules })
    }

    /// Create a chunker with default settings (60-line windows, 10 lines of overlap).
    pub fn with_defaults() -> Result<Self> {
        Self::new(CodeChunkerConfig::default())
    }

    pub fn config(&self) -> &CodeChunkerConfig {
        &self.config
    }

    /// Whether `language` has symbol extraction rules.
    pub fn supports_symbols(&self, language: &str) -> bool {
        self.rules.contains_key(language)
    }

    /// Chunk source text.
    ///
    /// `language` is recorded on every chunk; when it has no rules, or no
    /// symbol is found, the file is chunked into line windows.
    pub fn chunk_source(&self, source: &str, path: &str, language: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = source.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        if let Some(rules) = self.rules.get(language) {
            let chunks = self.extract_symbols(&lines, path, language, rules);
            if !chunks.is_empty() {
                return chunks;
            }
            debug!(path, language, "No symbols found, using line windows");
        }

        self.window_chunks(&lines, path, language)
    }

    fn extract_symbols(
        &self,
        lines: &[&str],
        path: &str,
        language: &str,
        rules: &LanguageRules,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut cursor = 0;

        while cursor < lines.len() {
            let Some((symbol_type, name)) = rules.match_line(lines[cursor]) else {
                cursor += 1;
                continue;
            };

            let end = rules.boundary.end_line(lines, cursor).max(cursor);
            let span = end - cursor + 1;

            if span >= self.config.min_symbol_lines {
                let start_line = cursor + 1;
                chunks.push(Chunk {
                    id: chunk_id(path, &name, start_line),
                    path: path.to_string(),
                    section: name,
                    content: lines[cursor..=end].join("\n"),
                    start_line,
                    end_line: end + 1,
                    code: Some(CodeMetadata {
                        language: language.to_string(),
                        symbol_type,
                    }),
                });
            }

            cursor = end + 1;
        }

        chunks
    }

    fn window_chunks(&self, lines: &[&str], path: &str, language: &str) -> Vec<Chunk> {
        let step = self.config.window_lines - self.config.window_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.config.window_lines).min(lines.len());
            let text = lines[start..end].join("\n");
            let content = text.trim();

            if char_len(content) >= self.config.min_window_chars {
                let section = format!("lines {}-{}", start + 1, end);
                chunks.push(Chunk {
                    id: chunk_id(path, &section, start + 1),
                    path: path.to_string(),
                    section,
                    content: content.to_string(),
                    start_line: start + 1,
                    end_line: end,
                    code: Some(CodeMetadata {
                        language: language.to_string(),
                        symbol_type: SymbolType::Block,
                    }),
                });
            }

            if end >= lines.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> CodeChunker {
        CodeChunker::with_defaults().unwrap()
    }

    fn symbol(chunk: &Chunk) -> SymbolType {
        chunk.code.as_ref().unwrap().symbol_type
    }

    #[test]
    fn test_chunk_typescript_source() {
        let source = r#"import { x } from "./x";

export interface Options {
  verbose: boolean;
}

export function run(opts: Options): number {
  if (opts.verbose) {
    console.log("running");
  }
  return 1;
}

export const handler = async (req: Request) => {
  return run({ verbose: false });
};

export class Store {
  private items: string[] = [];
}
"#;
        let chunks = chunker().chunk_source(source, "src/app.ts", "typescript");
        let names: Vec<&str> = chunks.iter().map(|c| c.section.as_str()).collect();
        assert_eq!(names, vec!["Options", "run", "handler", "Store"]);

        assert_eq!(symbol(&chunks[0]), SymbolType::Interface);
        assert_eq!(symbol(&chunks[1]), SymbolType::Function);
        assert_eq!(symbol(&chunks[2]), SymbolType::Function);
        assert_eq!(symbol(&chunks[3]), SymbolType::Class);

        let run = &chunks[1];
        assert_eq!((run.start_line, run.end_line), (7, 12));
        assert!(run.content.starts_with("export function run"));
        assert!(run.content.ends_with('}'));
        assert_eq!(run.id, "src/app.ts#run@7");
        assert_eq!(run.code.as_ref().unwrap().language, "typescript");
    }

    #[test]
    fn test_chunk_rust_source() {
        let source = r#"
pub struct Foo {
    x: i32,
}

impl Foo {
    pub fn new(x: i32) -> Self {
        Self { x }
    }
}

pub fn standalone() -> i32 {
    42
}
"#;
        let chunks = chunker().chunk_source(source, "lib.rs", "rust");
        assert_eq!(chunks.len(), 3);

        assert_eq!(chunks[0].section, "Foo");
        assert_eq!(symbol(&chunks[0]), SymbolType::Class);
        // impl block covers its methods; they are not chunked separately
        assert_eq!(chunks[1].section, "Foo");
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (6, 10));
        assert_eq!(chunks[2].section, "standalone");
        assert_eq!(symbol(&chunks[2]), SymbolType::Function);
    }

    #[test]
    fn test_chunk_python_source() {
        let source = r#"class MyClass:
    def __init__(self, x):
        self.x = x

    def get_x(self):
        return self.x

def standalone():
    return 42
"#;
        let chunks = chunker().chunk_source(source, "mod.py", "python");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section, "MyClass");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 6));
        assert_eq!(chunks[1].section, "standalone");
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (8, 9));
    }

    #[test]
    fn test_single_line_symbols_are_dropped() {
        let source = "fn a() { 1 }\n\nfn b() {\n    2\n}\n";
        let chunks = chunker().chunk_source(source, "x.rs", "rust");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section, "b");
    }

    #[test]
    fn test_commented_declarations_ignored() {
        let source = "// function ghost() {\n//   nothing\n// }\nfunction real() {\n  return 1;\n}\n";
        let chunks = chunker().chunk_source(source, "a.js", "javascript");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section, "real");
        assert_eq!(chunks[0].start_line, 4);
    }

    #[test]
    fn test_unsupported_language_uses_windows() {
        let lines: Vec<String> = (1..=130)
            .map(|i| format!("    System.out.println(\"line number {i}\");"))
            .collect();
        let source = lines.join("\n");

        let chunks = chunker().chunk_source(&source, "Main.java", "java");
        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(ranges, vec![(1, 60), (51, 110), (101, 130)]);
        assert_eq!(chunks[1].section, "lines 51-110");
        assert!(chunks.iter().all(|c| symbol(c) == SymbolType::Block));
        assert_eq!(chunks[0].code.as_ref().unwrap().language, "java");
    }

    #[test]
    fn test_no_symbols_falls_back_to_windows() {
        let source = "console.log('booting the application server now');\nstart();\nconsole.log('done');\n";
        let chunks = chunker().chunk_source(source, "main.js", "javascript");
        assert_eq!(chunks.len(), 1);
        assert_eq!(symbol(&chunks[0]), SymbolType::Block);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
    }

    #[test]
    fn test_tiny_windows_are_discarded() {
        let chunks = chunker().chunk_source("x = 1\n\n\n", "tiny.sh", "shell");
        assert!(chunks.is_empty());
        assert!(chunker().chunk_source("", "empty.rs", "rust").is_empty());
    }

    #[test]
    fn test_window_content_is_trimmed() {
        let source = format!("\n\n\n   {}   \n\n", "y".repeat(80));
        let chunks = chunker().chunk_source(&source, "data.txt", "text");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "y".repeat(80));
    }

    #[test]
    fn test_invalid_window_config_rejected() {
        let config = CodeChunkerConfig {
            window_lines: 10,
            window_overlap: 10,
            ..Default::default()
        };
        assert!(CodeChunker::new(config).is_err());
    }

    #[test]
    fn test_supports_symbols() {
        let chunker = chunker();
        assert!(chunker.supports_symbols("typescript"));
        assert!(chunker.supports_symbols("python"));
        assert!(!chunker.supports_symbols("java"));
    }
}

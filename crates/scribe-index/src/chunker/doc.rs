//! Prose chunking: one chunk per section, paragraph-packed when a section is large.

use tracing::debug;

use super::markdown::{parse_markdown, parse_plain, ParsedDocument};
use super::{chunk_id, Chunk};
use crate::splitter::{char_len, pack_paragraphs};

/// Configuration for [`DocChunker`].
#[derive(Debug, Clone)]
pub struct DocChunkerConfig {
    /// Sections longer than this are split at paragraph boundaries
    pub max_section_chars: usize,
}

impl Default for DocChunkerConfig {
    fn default() -> Self {
        Self {
            max_section_chars: 1000,
        }
    }
}

/// Splits parsed documents into heading-scoped chunks.
#[derive(Debug, Clone, Default)]
pub struct DocChunker {
    config: DocChunkerConfig,
}

impl DocChunker {
    pub fn new(config: DocChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DocChunkerConfig {
        &self.config
    }

    /// Chunk a Markdown file's text.
    pub fn chunk_markdown(&self, path: &str, text: &str) -> Vec<Chunk> {
        self.chunk_document(path, &parse_markdown(text))
    }

    /// Chunk a plain-text file as a single untitled section.
    pub fn chunk_plain(&self, path: &str, text: &str) -> Vec<Chunk> {
        self.chunk_document(path, &parse_plain(text))
    }

    /// Chunk an already-parsed document.
    ///
    /// Whitespace-only sections produce nothing. A section within the ceiling
    /// is one chunk; a larger one becomes several, each id suffixed `-0`,
    /// `-1`, ... in order.
    pub fn chunk_document(&self, path: &str, doc: &ParsedDocument) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for section in &doc.sections {
            if section.content.trim().is_empty() {
                continue;
            }

            let base_id = chunk_id(path, &section.heading, section.start_line);
            let pieces = if char_len(&section.content) <= self.config.max_section_chars {
                vec![section.content.clone()]
            } else {
                pack_paragraphs(&section.content, self.config.max_section_chars)
            };

            let multi = pieces.len() > 1;
            if multi {
                debug!(
                    path,
                    section = %section.heading,
                    pieces = pieces.len(),
                    "Split oversized section"
                );
            }

            for (i, content) in pieces.into_iter().enumerate() {
                chunks.push(Chunk {
                    id: if multi {
                        format!("{base_id}-{i}")
                    } else {
                        base_id.clone()
                    },
                    path: path.to_string(),
                    section: section.heading.clone(),
                    content,
                    start_line: section.start_line,
                    end_line: section.end_line,
                    code: None,
                });
            }
        }

        chunks
    }
}

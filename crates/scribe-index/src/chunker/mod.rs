//! Splitting prose and source files into retrieval-sized chunks.
//!
//! - [`DocChunker`] works on heading-scoped sections of a parsed document.
//! - [`CodeChunker`] works on symbol-scoped units found by per-language
//!   patterns, falling back to overlapping line windows.

pub mod boundary;
pub mod code;
pub mod doc;
pub mod languages;
pub mod markdown;

pub use boundary::{BoundaryStrategy, BraceBalance, Indentation};
pub use code::{CodeChunker, CodeChunkerConfig};
pub use doc::{DocChunker, DocChunkerConfig};
pub use markdown::{parse_markdown, parse_plain, ParsedDocument, Section};

use serde::{Deserialize, Serialize};

/// Kind of code construct a chunk covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolType {
    Function,
    Class,
    Interface,
    Type,
    Const,
    /// Fixed-size line window (no symbol detected)
    Block,
}

impl SymbolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Const => "const",
            Self::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "function" => Some(Self::Function),
            "class" => Some(Self::Class),
            "interface" => Some(Self::Interface),
            "type" => Some(Self::Type),
            "const" => Some(Self::Const),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

/// Code-only chunk metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMetadata {
    /// Detected language, e.g. "typescript"
    pub language: String,

    /// Construct the chunk covers
    pub symbol_type: SymbolType,
}

/// A unit of text ready to be embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic logical id (path + section/symbol + line offset)
    pub id: String,

    /// Corpus-relative path of the source file
    pub path: String,

    /// Heading text for docs, symbol name for code
    pub section: String,

    /// The text that gets embedded and stored
    pub content: String,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// Present for chunks produced by the code chunker
    pub code: Option<CodeMetadata>,
}

/// Derive the logical id of a chunk.
///
/// The same path, section and start line always give the same id, so
/// re-indexing an unchanged unit overwrites its previous point.
pub fn chunk_id(path: &str, section: &str, start_line: usize) -> String {
    format!("{path}#{section}@{start_line}")
}

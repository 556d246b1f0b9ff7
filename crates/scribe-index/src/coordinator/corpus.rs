//! The two corpora: what files they contain and how those files are chunked.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Result};
use ignore::WalkBuilder;
use tracing::debug;

use crate::chunker::languages::detect_language;
use crate::chunker::{Chunk, CodeChunker, DocChunker};
use crate::lexical::SearchRoot;
use crate::manifest::CorpusKind;

/// Directories never indexed, even when not gitignored.
const SKIP_DIRS: &[&str] = &[
    "target",
    "node_modules",
    ".git",
    "vendor",
    "__pycache__",
    "dist",
    "build",
];

/// A file found by a corpus scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Corpus-relative path with `/` separators (label-prefixed for code)
    pub path: String,

    pub absolute: PathBuf,
}

/// A set of files that is indexed into one collection.
pub trait Corpus: Send + Sync {
    fn kind(&self) -> CorpusKind;

    /// Vector store collection holding this corpus.
    fn collection(&self) -> &str;

    /// Every indexable file, sorted by path.
    fn scan(&self) -> Result<Vec<SourceFile>>;

    /// Split one file's text into chunks.
    fn chunk(&self, file: &SourceFile, text: &str) -> Vec<Chunk>;

    /// Directories for exact search.
    fn search_roots(&self) -> Vec<SearchRoot>;

    /// File globs for exact search, matching what `scan` picks up.
    fn globs(&self) -> Vec<String>;
}

/// Prose documentation under a single root.
pub struct DocCorpus {
    root: PathBuf,
    extensions: Vec<String>,
    collection: String,
    chunker: DocChunker,
}

impl DocCorpus {
    pub fn new(
        root: impl Into<PathBuf>,
        extensions: Vec<String>,
        collection: impl Into<String>,
        chunker: DocChunker,
    ) -> Self {
        Self {
            root: root.into(),
            extensions,
            collection: collection.into(),
            chunker,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Corpus for DocCorpus {
    fn kind(&self) -> CorpusKind {
        CorpusKind::Docs
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn scan(&self) -> Result<Vec<SourceFile>> {
        collect_files(&self.root, "", &self.extensions)
    }

    fn chunk(&self, file: &SourceFile, text: &str) -> Vec<Chunk> {
        match extension(&file.absolute) {
            Some("md" | "markdown" | "mdx") => self.chunker.chunk_markdown(&file.path, text),
            _ => self.chunker.chunk_plain(&file.path, text),
        }
    }

    fn search_roots(&self) -> Vec<SearchRoot> {
        vec![SearchRoot::new(&self.root, "")]
    }

    fn globs(&self) -> Vec<String> {
        globs_for(&self.extensions)
    }
}

/// A labelled source tree. The label prefixes every path from this root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRoot {
    pub label: String,
    pub dir: PathBuf,
}

/// Source code under one or more labelled roots.
pub struct CodeCorpus {
    roots: Vec<CodeRoot>,
    extensions: Vec<String>,
    collection: String,
    chunker: CodeChunker,
}

impl CodeCorpus {
    pub fn new(
        roots: Vec<CodeRoot>,
        extensions: Vec<String>,
        collection: impl Into<String>,
        chunker: CodeChunker,
    ) -> Result<Self> {
        for (i, root) in roots.iter().enumerate() {
            if root.label.is_empty() || root.label.contains('/') {
                bail!("invalid code root label {:?}", root.label);
            }
            if roots[..i].iter().any(|r| r.label == root.label) {
                bail!("duplicate code root label {:?}", root.label);
            }
        }

        Ok(Self {
            roots,
            extensions,
            collection: collection.into(),
            chunker,
        })
    }

    pub fn roots(&self) -> &[CodeRoot] {
        &self.roots
    }
}

impl Corpus for CodeCorpus {
    fn kind(&self) -> CorpusKind {
        CorpusKind::Code
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn scan(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for root in &self.roots {
            files.extend(collect_files(&root.dir, &root.label, &self.extensions)?);
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn chunk(&self, file: &SourceFile, text: &str) -> Vec<Chunk> {
        let language = detect_language(&file.absolute)
            .or_else(|| extension(&file.absolute).map(str::to_string))
            .unwrap_or_else(|| "text".to_string());
        self.chunker.chunk_source(text, &file.path, &language)
    }

    fn search_roots(&self) -> Vec<SearchRoot> {
        self.roots
            .iter()
            .map(|r| SearchRoot::new(&r.dir, &r.label))
            .collect()
    }

    fn globs(&self) -> Vec<String> {
        globs_for(&self.extensions)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

fn globs_for(extensions: &[String]) -> Vec<String> {
    extensions.iter().map(|e| format!("*.{e}")).collect()
}

/// Walk `root` respecting `.gitignore`, keeping files with a listed extension.
fn collect_files(root: &Path, label: &str, extensions: &[String]) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        bail!("corpus root {:?} is not a directory", root);
    }

    let mut files = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .require_git(false)
        .build();

    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(ext) = extension(path) else {
            continue;
        };
        if !extensions.iter().any(|e| e == ext) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        if relative
            .components()
            .any(|c| matches!(c, Component::Normal(n) if SKIP_DIRS.iter().any(|s| n == *s)))
        {
            continue;
        }

        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let path_label = if label.is_empty() {
            relative
        } else {
            format!("{label}/{relative}")
        };

        files.push(SourceFile {
            path: path_label,
            absolute: path.to_path_buf(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("Found {} files under {:?}", files.len(), root);
    Ok(files)
}

//! Exact text search over the raw file tree with ripgrep.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::search::SearchResult;

/// Errors from running ripgrep.
#[derive(Error, Debug)]
pub enum LexicalError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ripgrep exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("search root does not exist: {0}")]
    MissingRoot(PathBuf),
}

/// A directory to search, and the label its results are reported under.
#[derive(Debug, Clone)]
pub struct SearchRoot {
    pub dir: PathBuf,

    /// Prefix for result paths; empty for none
    pub label: String,
}

impl SearchRoot {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
        }
    }

    fn display_path(&self, relative: &str) -> String {
        let relative = relative.strip_prefix("./").unwrap_or(relative);
        if self.label.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.label, relative)
        }
    }
}

/// One `match` record from `rg --json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgMatch {
    pub path: String,
    pub line_number: usize,
    pub text: String,
}

/// Runs `rg --json` and turns matches into search results.
#[derive(Debug, Clone)]
pub struct LexicalSearcher {
    binary: String,
    fixed_strings: bool,
    globs: Vec<String>,
}

impl Default for LexicalSearcher {
    fn default() -> Self {
        Self::new("rg")
    }
}

impl LexicalSearcher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            fixed_strings: false,
            globs: Vec::new(),
        }
    }

    /// Treat the query as a literal string instead of a regex.
    pub fn fixed_strings(mut self, fixed: bool) -> Self {
        self.fixed_strings = fixed;
        self
    }

    /// Only search files matching these globs (e.g. `*.md`).
    pub fn with_globs(mut self, globs: Vec<String>) -> Self {
        self.globs = globs;
        self
    }

    /// Search every root, one result per file, at most `limit` results.
    pub async fn search(
        &self,
        roots: &[SearchRoot],
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, LexicalError> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for root in roots {
            if results.len() >= limit {
                break;
            }
            for m in self.run(&root.dir, query).await? {
                let path = root.display_path(&m.path);
                if !seen.insert(path.clone()) {
                    continue;
                }
                results.push(SearchResult {
                    id: format!("{}:{}", path, m.line_number),
                    section: format!("line {}", m.line_number),
                    path,
                    content: m.text,
                    score: 1.0,
                    start_line: Some(m.line_number),
                    end_line: Some(m.line_number),
                    language: None,
                    symbol_type: None,
                });
                if results.len() >= limit {
                    break;
                }
            }
        }

        debug!(query, results = results.len(), "Exact search complete");
        Ok(results)
    }

    /// Run ripgrep in `dir`; no matches is an empty list, not an error.
    async fn run(&self, dir: &Path, query: &str) -> Result<Vec<RgMatch>, LexicalError> {
        if !dir.is_dir() {
            return Err(LexicalError::MissingRoot(dir.to_path_buf()));
        }

        let mut command = Command::new(&self.binary);
        command
            .current_dir(dir)
            .arg("--json")
            .arg("--sort")
            .arg("path")
            .arg("--max-count")
            .arg("1");
        if self.fixed_strings {
            command.arg("--fixed-strings");
        }
        for glob in &self.globs {
            command.arg("--glob").arg(glob);
        }
        command.arg("--").arg(query).arg(".");

        let output = command.output().await.map_err(|source| LexicalError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        if output.status.code() == Some(1) {
            return Ok(Vec::new());
        }
        if !output.status.success() {
            return Err(LexicalError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_rg_json(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Extract `match` records from `rg --json` output.
///
/// Other record types, malformed lines and non-UTF-8 paths are skipped.
pub fn parse_rg_json(output: &str) -> Vec<RgMatch> {
    let mut matches = Vec::new();

    for line in output.lines() {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if json.get("type").and_then(|t| t.as_str()) != Some("match") {
            continue;
        }
        let Some(data) = json.get("data") else {
            continue;
        };

        let Some(path) = data
            .get("path")
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };
        let line_number = data
            .get("line_number")
            .and_then(|n| n.as_u64())
            .unwrap_or(0) as usize;
        let text = data
            .get("lines")
            .and_then(|l| l.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("");

        matches.push(RgMatch {
            path: path.to_string(),
            line_number,
            text: text.trim_end_matches(['\n', '\r']).to_string(),
        });
    }

    matches
}

//! Index manifest for tracking embedded files and their content hashes.
//!
//! The manifest is a change-detection index, not a content store: it records
//! which corpus-relative paths were successfully embedded and upserted, under
//! which content hash, and how many points they produced. Chunk content only
//! lives in the vector store.
//!
//! One file holds both corpora (`docs` and `code`). Each coordinator owns a
//! [`CorpusManifest`] for its corpus and persists it through a shared
//! [`ManifestStore`], which merges the sub-map into the on-disk file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Current manifest schema version. Files with any other version are ignored.
pub const MANIFEST_VERSION: u32 = 1;

/// Default manifest file name inside the state directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// The two corpora tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusKind {
    Docs,
    Code,
}

impl CorpusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docs => "docs",
            Self::Code => "code",
        }
    }
}

impl std::fmt::Display for CorpusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one embedded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// SHA-256 of the file content at the time it was embedded
    pub hash: String,

    /// Number of points upserted for this file
    pub chunk_count: usize,

    /// When the file was embedded
    pub embedded_at: DateTime<Utc>,
}

/// On-disk manifest covering both corpora.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,

    #[serde(default)]
    pub docs: BTreeMap<String, ManifestEntry>,

    #[serde(default)]
    pub code: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Only the version field, read before attempting a full parse.
#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl Manifest {
    /// Create a new empty manifest at the current schema version.
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION,
            docs: BTreeMap::new(),
            code: BTreeMap::new(),
        }
    }

    /// Entries for one corpus.
    pub fn corpus(&self, kind: CorpusKind) -> &BTreeMap<String, ManifestEntry> {
        match kind {
            CorpusKind::Docs => &self.docs,
            CorpusKind::Code => &self.code,
        }
    }

    /// Mutable entries for one corpus.
    pub fn corpus_mut(&mut self, kind: CorpusKind) -> &mut BTreeMap<String, ManifestEntry> {
        match kind {
            CorpusKind::Docs => &mut self.docs,
            CorpusKind::Code => &mut self.code,
        }
    }

    /// Load a manifest, reporting exactly why it could not be used.
    pub fn try_load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(ManifestError::Io)?;

        let header: VersionHeader = serde_json::from_str(&content).map_err(ManifestError::Parse)?;
        if header.version != MANIFEST_VERSION {
            return Err(ManifestError::VersionMismatch {
                found: header.version,
                expected: MANIFEST_VERSION,
            });
        }

        serde_json::from_str(&content).map_err(ManifestError::Parse)
    }

    /// Load a manifest, degrading to an empty one when the file is missing,
    /// corrupt, or written by a different schema version.
    ///
    /// An empty manifest forces a full re-index, which is always safe.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(manifest) => manifest,
            Err(ManifestError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No manifest at {:?}, starting empty", path);
                Self::new()
            }
            Err(e) => {
                warn!("Ignoring unusable manifest at {:?}: {}", path, e);
                Self::new()
            }
        }
    }

    /// Save the manifest atomically (write to a temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(ManifestError::Io)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(ManifestError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(ManifestError::Io)?;
        fs::rename(&tmp, path).map_err(ManifestError::Io)
    }
}

/// The manifest sub-map owned by a single coordinator.
#[derive(Debug, Clone)]
pub struct CorpusManifest {
    kind: CorpusKind,
    entries: BTreeMap<String, ManifestEntry>,
}

impl CorpusManifest {
    /// Create an empty manifest for `kind`.
    pub fn new(kind: CorpusKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> CorpusKind {
        self.kind
    }

    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn entries(&self) -> &BTreeMap<String, ManifestEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record that `path` was embedded and upserted with `hash`.
    pub fn record(&mut self, path: impl Into<String>, hash: impl Into<String>, chunk_count: usize) {
        self.entries.insert(
            path.into(),
            ManifestEntry {
                hash: hash.into(),
                chunk_count,
                embedded_at: Utc::now(),
            },
        );
    }

    /// Forget a path.
    pub fn remove(&mut self, path: &str) -> Option<ManifestEntry> {
        self.entries.remove(path)
    }

    /// Forget every path (used to force a full re-index).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Total number of points across all files.
    pub fn total_chunks(&self) -> usize {
        self.entries.values().map(|e| e.chunk_count).sum()
    }
}

/// Shared handle to the manifest file.
///
/// Saves are serialized through an in-process lock and merge only the
/// caller's corpus, so Doc and Code coordinators never clobber each other.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Manifest stored as [`MANIFEST_FILE`] under `state_dir`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(MANIFEST_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the whole manifest (empty on any problem).
    pub fn load(&self) -> Manifest {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Manifest::load_or_default(&self.path)
    }

    /// Load one corpus sub-map.
    pub fn load_corpus(&self, kind: CorpusKind) -> CorpusManifest {
        let manifest = self.load();
        CorpusManifest {
            kind,
            entries: manifest.corpus(kind).clone(),
        }
    }

    /// Write `corpus` into the on-disk manifest, leaving the other corpus intact.
    pub fn save_corpus(&self, corpus: &CorpusManifest) -> Result<(), ManifestError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut manifest = Manifest::load_or_default(&self.path);
        *manifest.corpus_mut(corpus.kind) = corpus.entries.clone();
        manifest.save(&self.path)?;
        debug!(
            corpus = %corpus.kind,
            files = corpus.len(),
            "Saved manifest to {:?}",
            self.path
        );
        Ok(())
    }
}

/// Errors that can occur when working with manifests.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Manifest version {found} does not match expected version {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_manifest_new() {
        let manifest = Manifest::new();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert!(manifest.docs.is_empty());
        assert!(manifest.code.is_empty());
    }

    #[test]
    fn test_corpus_record_and_remove() {
        let mut corpus = CorpusManifest::new(CorpusKind::Docs);
        corpus.record("guide.md", "h1", 3);
        corpus.record("api.md", "h2", 2);

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.total_chunks(), 5);
        assert_eq!(corpus.get("guide.md").unwrap().hash, "h1");

        // Re-recording replaces the entry
        corpus.record("guide.md", "h3", 1);
        assert_eq!(corpus.total_chunks(), 3);
        assert_eq!(corpus.get("guide.md").unwrap().hash, "h3");

        let removed = corpus.remove("api.md");
        assert_eq!(removed.unwrap().chunk_count, 2);
        assert!(!corpus.contains("api.md"));
        assert!(corpus.remove("api.md").is_none());
    }

    #[test]
    fn test_manifest_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join(MANIFEST_FILE);

        let mut manifest = Manifest::new();
        manifest.docs.insert(
            "guide.md".to_string(),
            ManifestEntry {
                hash: "abc".to_string(),
                chunk_count: 4,
                embedded_at: Utc::now(),
            },
        );
        manifest.save(&path).unwrap();
        assert!(path.exists());

        let loaded = Manifest::try_load(&path).unwrap();
        assert_eq!(loaded.docs.len(), 1);
        assert_eq!(loaded.docs["guide.md"].chunk_count, 4);
        assert!(loaded.code.is_empty());
    }

    #[test]
    fn test_manifest_json_shape() {
        let mut manifest = Manifest::new();
        manifest.code.insert(
            "app/src/main.ts".to_string(),
            ManifestEntry {
                hash: "h".to_string(),
                chunk_count: 2,
                embedded_at: Utc::now(),
            },
        );
        let json: serde_json::Value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["code"]["app/src/main.ts"]["hash"], "h");
        assert_eq!(json["code"]["app/src/main.ts"]["chunkCount"], 2);
        assert!(json["code"]["app/src/main.ts"]["embeddedAt"].is_string());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::load_or_default(&dir.path().join("nope.json"));
        assert!(manifest.docs.is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Manifest::try_load(&path),
            Err(ManifestError::Parse(_))
        ));
        let manifest = Manifest::load_or_default(&path);
        assert!(manifest.docs.is_empty() && manifest.code.is_empty());
    }

    #[test]
    fn test_load_version_mismatch_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(
            &path,
            r#"{"version": 99, "docs": {"a.md": {"hash": "x", "chunkCount": 1, "embeddedAt": "2024-01-01T00:00:00Z"}}, "code": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            Manifest::try_load(&path),
            Err(ManifestError::VersionMismatch { found: 99, expected: 1 })
        ));
        assert!(Manifest::load_or_default(&path).docs.is_empty());
    }

    #[test]
    fn test_store_merges_corpora() {
        let dir = tempdir().unwrap();
        let store = ManifestStore::in_dir(dir.path());

        let mut docs = store.load_corpus(CorpusKind::Docs);
        docs.record("readme.md", "d1", 2);
        store.save_corpus(&docs).unwrap();

        let mut code = store.load_corpus(CorpusKind::Code);
        assert!(code.is_empty());
        code.record("app/lib.ts", "c1", 5);
        store.save_corpus(&code).unwrap();

        let manifest = store.load();
        assert_eq!(manifest.docs.len(), 1);
        assert_eq!(manifest.code.len(), 1);
        assert_eq!(store.load_corpus(CorpusKind::Docs).get("readme.md").unwrap().hash, "d1");
    }

    #[test]
    fn test_corpus_kind_str() {
        assert_eq!(CorpusKind::Docs.as_str(), "docs");
        assert_eq!(CorpusKind::Code.to_string(), "code");
    }
}

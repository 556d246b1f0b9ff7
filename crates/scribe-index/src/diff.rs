//! Change detection between the files on disk and the manifest.

use std::collections::{BTreeMap, HashMap};

use crate::manifest::ManifestEntry;

/// Classification of every known path for one sync run.
///
/// Never persisted; recomputed at the start of each run. List order is not
/// meaningful (paths are sorted only to make logs reproducible).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ManifestDiff {
    /// True when nothing needs to be embedded or deleted.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Number of paths that require work.
    pub fn pending(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}

/// Compare current `path -> hash` against the manifest entries.
///
/// - **added**: in `current`, not in the manifest
/// - **changed**: in both, hashes differ
/// - **unchanged**: in both, hashes equal
/// - **removed**: in the manifest, not in `current`
pub fn diff(
    current: &HashMap<String, String>,
    manifest: &BTreeMap<String, ManifestEntry>,
) -> ManifestDiff {
    let mut result = ManifestDiff::default();

    for (path, hash) in current {
        match manifest.get(path) {
            None => result.added.push(path.clone()),
            Some(entry) if entry.hash != *hash => result.changed.push(path.clone()),
            Some(_) => result.unchanged.push(path.clone()),
        }
    }

    result.removed = manifest
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();

    result.added.sort();
    result.changed.sort();
    result.unchanged.sort();
    result
}

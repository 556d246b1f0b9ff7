//! Vector store interface.
//!
//! The engine only needs four operations from a vector database: create a
//! collection, upsert points, search, and delete every point of a file. Two
//! backends implement them: [`QdrantStore`] for production and
//! [`InMemoryVectorStore`] for tests and offline use.

pub mod memory;
pub mod qdrant;

pub use memory::InMemoryVectorStore;
pub use qdrant::{QdrantConfig, QdrantStore};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunker::SymbolType;

/// Namespace for deriving point ids from logical chunk ids.
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d4e_8a3b_5c7d_9e0f_1a2b_3c4d_5e6f);

/// Stable point id (UUIDv5) for a logical chunk id.
pub fn point_id(logical_id: &str) -> String {
    Uuid::new_v5(&POINT_NAMESPACE, logical_id.as_bytes()).to_string()
}

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

/// Metadata stored with each vector point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Logical chunk id the point id was derived from
    pub chunk_id: String,

    /// Corpus-relative path of the source file
    pub path: String,

    /// Heading or symbol name
    pub section: String,

    /// The embedded text
    pub content: String,

    /// Starting line number (1-indexed)
    pub start_line: usize,

    /// Ending line number (1-indexed)
    pub end_line: usize,

    /// Code chunks only
    pub language: Option<String>,

    /// Code chunks only: "function", "class", ...
    pub symbol_type: Option<String>,
}

/// A point to upsert.
#[derive(Debug, Clone)]
pub struct Point {
    /// UUID string, see [`point_id`]
    pub id: String,

    pub vector: Vec<f32>,

    pub payload: PointPayload,
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,

    /// Similarity score (higher is better)
    pub score: f32,

    pub payload: PointPayload,
}

/// Filter conditions for search. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Only paths starting with this prefix
    pub path_prefix: Option<String>,

    /// Only chunks in this language
    pub language: Option<String>,

    /// Only chunks of one of these symbol types (empty means any)
    pub symbol_types: Vec<SymbolType>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_symbol_types(mut self, types: Vec<SymbolType>) -> Self {
        self.symbol_types = types;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.path_prefix.is_none() && self.language.is_none() && self.symbol_types.is_empty()
    }

    /// Whether a payload satisfies every condition.
    pub fn matches(&self, payload: &PointPayload) -> bool {
        if let Some(prefix) = &self.path_prefix {
            if !payload.path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if payload.language.as_deref() != Some(language.as_str()) {
                return false;
            }
        }
        if !self.symbol_types.is_empty() {
            let symbol = payload.symbol_type.as_deref().and_then(SymbolType::parse);
            if !symbol.is_some_and(|s| self.symbol_types.contains(&s)) {
                return false;
            }
        }
        true
    }
}

/// Narrow contract the engine needs from a vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(
        &self,
        collection: &str,
        dimensions: usize,
        distance: DistanceMetric,
    ) -> Result<()>;

    /// Insert or replace points by id; returns once the write is applied.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    /// Nearest points to `vector`, best first.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>>;

    /// Delete every point whose payload `path` equals `path`.
    async fn delete_by_path(&self, collection: &str, path: &str) -> Result<()>;

    /// Number of points in the collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Drop the collection and all its points.
    async fn delete_collection(&self, collection: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(path: &str, language: Option<&str>, symbol: Option<&str>) -> PointPayload {
        PointPayload {
            path: path.to_string(),
            language: language.map(String::from),
            symbol_type: symbol.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = point_id("docs/a.md#Intro@1");
        assert_eq!(a, point_id("docs/a.md#Intro@1"));
        assert_ne!(a, point_id("docs/a.md#Intro@2"));
        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
    }

    #[test]
    fn test_filter_path_prefix() {
        let filter = SearchFilter::new().with_path_prefix("api/");
        assert!(filter.matches(&payload("api/auth.md", None, None)));
        assert!(!filter.matches(&payload("guide/api.md", None, None)));
    }

    #[test]
    fn test_filter_language_and_symbols() {
        let filter = SearchFilter::new()
            .with_language("rust")
            .with_symbol_types(vec![SymbolType::Function, SymbolType::Class]);

        assert!(filter.matches(&payload("a.rs", Some("rust"), Some("function"))));
        assert!(!filter.matches(&payload("a.rs", Some("rust"), Some("const"))));
        assert!(!filter.matches(&payload("a.go", Some("go"), Some("function"))));
        assert!(!filter.matches(&payload("a.md", None, None)));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = SearchFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&payload("anything", None, None)));
    }
}

//! Search result types shared by every retrieval mode.

use serde::{Deserialize, Serialize};

use crate::chunker::SymbolType;
use crate::store::SearchHit;

/// How a query is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Vector similarity against the chunk store
    #[default]
    Semantic,
    /// ripgrep over the raw file tree
    Exact,
    /// Semantic candidates re-ranked by embedding similarity
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Exact => "exact",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semantic" => Some(Self::Semantic),
            "exact" => Some(Self::Exact),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// A search result.
///
/// Scores are only comparable within one mode: cosine similarity for
/// semantic, a constant 1.0 for exact, re-ranked similarity for hybrid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Point id (semantic/hybrid) or `path:line` (exact)
    pub id: String,
    /// Corpus-relative path
    pub path: String,
    /// Heading, symbol name, or matched line label
    pub section: String,
    /// Chunk text, or the matching line for exact search
    pub content: String,
    /// Relevance score (higher is better)
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_type: Option<SymbolType>,
}

impl From<SearchHit> for SearchResult {
    fn from(hit: SearchHit) -> Self {
        let payload = hit.payload;
        Self {
            id: hit.id,
            path: payload.path,
            section: payload.section,
            content: payload.content,
            score: hit.score,
            start_line: (payload.start_line > 0).then_some(payload.start_line),
            end_line: (payload.end_line > 0).then_some(payload.end_line),
            language: payload.language,
            symbol_type: payload.symbol_type.as_deref().and_then(SymbolType::parse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PointPayload;

    #[test]
    fn test_search_mode_parse() {
        for mode in [SearchMode::Semantic, SearchMode::Exact, SearchMode::Hybrid] {
            assert_eq!(SearchMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(SearchMode::parse("fuzzy"), None);
        assert_eq!(SearchMode::default(), SearchMode::Semantic);
    }

    #[test]
    fn test_result_from_code_hit() {
        let hit = SearchHit {
            id: "id-1".to_string(),
            score: 0.8,
            payload: PointPayload {
                chunk_id: "web/app.ts#run@3".to_string(),
                path: "web/app.ts".to_string(),
                section: "run".to_string(),
                content: "function run() {}".to_string(),
                start_line: 3,
                end_line: 9,
                language: Some("typescript".to_string()),
                symbol_type: Some("function".to_string()),
            },
        };

        let result = SearchResult::from(hit);
        assert_eq!(result.path, "web/app.ts");
        assert_eq!(result.start_line, Some(3));
        assert_eq!(result.symbol_type, Some(SymbolType::Function));
        assert!((result.score - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_doc_result_serializes_without_code_fields() {
        let result = SearchResult {
            id: "x".to_string(),
            path: "a.md".to_string(),
            section: "Intro".to_string(),
            content: "hi".to_string(),
            score: 1.0,
            start_line: None,
            end_line: None,
            language: None,
            symbol_type: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("language").is_none());
        assert_eq!(json["section"], "Intro");
    }
}

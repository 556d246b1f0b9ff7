//! Re-ranking of search candidates.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::search::SearchResult;

/// Trait for re-scoring a candidate set against a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return at most `limit` results, best first.
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        limit: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// Scores each candidate by cosine similarity between its own embedding and
/// the query embedding.
///
/// Candidate sets no larger than `limit` are returned untouched, without any
/// provider call. Ties keep their incoming order.
pub struct EmbeddingReranker<E: EmbeddingProvider> {
    provider: Arc<E>,
}

impl<E: EmbeddingProvider> EmbeddingReranker<E> {
    pub fn new(provider: Arc<E>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<E: EmbeddingProvider> Reranker for EmbeddingReranker<E> {
    async fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        if results.len() <= limit {
            return Ok(results);
        }

        debug!(candidates = results.len(), limit, "Re-ranking");

        let query_vector = self
            .provider
            .embed(query)
            .await
            .context("Failed to embed query for re-ranking")?;

        for result in &mut results {
            let vector = self
                .provider
                .embed(&result.content)
                .await
                .with_context(|| format!("Failed to embed candidate {}", result.id))?;
            result.score = cosine_similarity(&query_vector, &vector);
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddings;

    fn candidate(i: usize) -> SearchResult {
        SearchResult {
            id: format!("c{i}"),
            path: format!("doc{i}.md"),
            section: String::new(),
            content: format!("candidate text number {i}"),
            score: 0.0,
            start_line: None,
            end_line: None,
            language: None,
            symbol_type: None,
        }
    }

    #[tokio::test]
    async fn test_rerank_sorts_and_truncates() {
        let provider = Arc::new(MockEmbeddings::new(16));
        let reranker = EmbeddingReranker::new(provider.clone());
        let candidates: Vec<SearchResult> = (0..10).map(candidate).collect();

        let ranked = reranker.rerank("query", candidates.clone(), 5).await.unwrap();
        assert_eq!(ranked.len(), 5);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));

        let ids: Vec<&String> = candidates.iter().map(|c| &c.id).collect();
        assert!(ranked.iter().all(|r| ids.contains(&&r.id)));

        // one query embedding plus one per candidate
        assert_eq!(provider.calls(), 11);
    }

    #[tokio::test]
    async fn test_small_candidate_sets_untouched() {
        let provider = Arc::new(MockEmbeddings::new(16));
        let reranker = EmbeddingReranker::new(provider.clone());
        let candidates: Vec<SearchResult> = (0..3).map(candidate).collect();

        let ranked = reranker.rerank("query", candidates.clone(), 5).await.unwrap();
        assert_eq!(ranked, candidates);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_ties_keep_input_order() {
        let provider = Arc::new(MockEmbeddings::new(16));
        let reranker = EmbeddingReranker::new(provider);
        // identical content gives identical scores
        let candidates: Vec<SearchResult> = (0..4)
            .map(|i| SearchResult {
                content: "same".to_string(),
                ..candidate(i)
            })
            .collect();

        let ranked = reranker.rerank("q", candidates, 2).await.unwrap();
        assert_eq!(ranked[0].id, "c0");
        assert_eq!(ranked[1].id, "c1");
    }
}

//! Index coordinator.
//!
//! An [`IndexCoordinator`] owns one corpus: it keeps that corpus's
//! collection in step with the files on disk and answers queries against
//! it. A sync run goes
//!
//! `ensure collection -> scan -> diff -> removed -> changed -> added -> save`
//!
//! and only touches files whose content hash differs from the manifest.

pub mod corpus;

pub use corpus::{CodeCorpus, CodeRoot, Corpus, DocCorpus, SourceFile};

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::chunker::Chunk;
use crate::diff::{diff, ManifestDiff};
use crate::embeddings::{BatchConfig, EmbeddingBatcher, EmbeddingProvider};
use crate::hasher::content_hash;
use crate::lexical::LexicalSearcher;
use crate::manifest::{CorpusKind, CorpusManifest, ManifestStore};
use crate::progress::{ProgressSink, SyncPhase, SyncProgress, SyncReport, TracingSink};
use crate::reranker::{EmbeddingReranker, Reranker};
use crate::search::{SearchMode, SearchResult};
use crate::store::{point_id, DistanceMetric, Point, PointPayload, SearchFilter, VectorStore};

/// Coordinator over the documentation corpus.
pub type DocIndexCoordinator<E> = IndexCoordinator<E, DocCorpus>;

/// Coordinator over the code corpus.
pub type CodeIndexCoordinator<E> = IndexCoordinator<E, CodeCorpus>;

/// Tuning for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Save the manifest after this many added files
    pub checkpoint_every: usize,

    /// Metric used when the collection is created
    pub distance: DistanceMetric,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 25,
            distance: DistanceMetric::Cosine,
        }
    }
}

/// Manifest summary for one corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStatus {
    pub corpus: CorpusKind,
    pub collection: String,
    pub files: usize,
    pub chunks: usize,
    pub last_embedded: Option<DateTime<Utc>>,
}

/// Keeps one corpus indexed and searchable.
pub struct IndexCoordinator<E: EmbeddingProvider, C: Corpus> {
    corpus: C,
    batcher: EmbeddingBatcher<E>,
    store: Arc<dyn VectorStore>,
    reranker: Box<dyn Reranker>,
    lexical: LexicalSearcher,
    manifest_store: ManifestStore,
    manifest: CorpusManifest,
    sink: Arc<dyn ProgressSink>,
    config: CoordinatorConfig,
}

impl<E: EmbeddingProvider + 'static, C: Corpus> IndexCoordinator<E, C> {
    /// Create a coordinator, loading the corpus's manifest entries.
    pub fn new(
        corpus: C,
        embeddings: Arc<E>,
        store: Arc<dyn VectorStore>,
        manifest_store: ManifestStore,
        batch_config: BatchConfig,
    ) -> Result<Self> {
        let batcher = EmbeddingBatcher::new(embeddings.clone(), batch_config)
            .context("Invalid batching configuration")?;
        let manifest = manifest_store.load_corpus(corpus.kind());
        let lexical = LexicalSearcher::default().with_globs(corpus.globs());

        debug!(
            corpus = %corpus.kind(),
            files = manifest.len(),
            "Loaded manifest"
        );

        Ok(Self {
            corpus,
            batcher,
            store,
            reranker: Box::new(EmbeddingReranker::new(embeddings)),
            lexical,
            manifest_store,
            manifest,
            sink: Arc::new(TracingSink),
            config: CoordinatorConfig::default(),
        })
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Replace the exact-search backend. Globs are reset to the corpus's extensions.
    pub fn with_lexical(mut self, lexical: LexicalSearcher) -> Self {
        self.lexical = lexical.with_globs(self.corpus.globs());
        self
    }

    pub fn corpus(&self) -> &C {
        &self.corpus
    }

    pub fn manifest(&self) -> &CorpusManifest {
        &self.manifest
    }

    /// Provider calls made by this coordinator's batcher so far.
    pub fn embedding_calls(&self) -> usize {
        self.batcher.calls()
    }

    pub fn status(&self) -> CorpusStatus {
        CorpusStatus {
            corpus: self.corpus.kind(),
            collection: self.corpus.collection().to_string(),
            files: self.manifest.len(),
            chunks: self.manifest.total_chunks(),
            last_embedded: self.manifest.entries().values().map(|e| e.embedded_at).max(),
        }
    }

    /// Drop the collection and forget every file, so the next sync re-embeds everything.
    pub async fn reset(&mut self) -> Result<()> {
        info!(corpus = %self.corpus.kind(), "Resetting index");
        if let Err(e) = self.store.delete_collection(self.corpus.collection()).await {
            warn!("Failed to delete collection {}: {:#}", self.corpus.collection(), e);
        }
        self.manifest.clear();
        self.save_manifest()
    }

    /// Bring the collection in line with the files on disk.
    ///
    /// Per-file failures are reported and retried on the next run. Only an
    /// unreachable vector store, an unreadable corpus root, or a manifest
    /// that cannot be saved fail the whole run. When `cancel` fires, the
    /// run stops between files, saves the manifest, and returns a report
    /// marked interrupted.
    pub async fn sync(&mut self, cancel: &CancellationToken) -> Result<SyncReport> {
        let span = info_span!(
            "sync",
            corpus = %self.corpus.kind(),
            collection = self.corpus.collection()
        );
        self.sync_inner(cancel).instrument(span).await
    }

    async fn sync_inner(&mut self, cancel: &CancellationToken) -> Result<SyncReport> {
        let calls_before = self.batcher.calls();
        let mut progress = SyncProgress::new(self.corpus.kind(), self.sink.clone());

        self.store
            .ensure_collection(
                self.corpus.collection(),
                self.batcher.provider().dimensions(),
                self.config.distance,
            )
            .await
            .with_context(|| {
                format!(
                    "Vector store unavailable (collection {})",
                    self.corpus.collection()
                )
            })?;

        let files = self.corpus.scan().context("Failed to scan corpus")?;
        let (current, locations) = self.hash_files(files);
        let plan = diff(&current, self.manifest.entries());
        progress.planned(&plan);

        if plan.is_noop() {
            info!("Index is up to date ({} files)", plan.unchanged.len());
        }

        let interrupted = self
            .apply(&plan, &locations, cancel, &mut progress)
            .await?;

        self.save_manifest()?;
        let calls = self.batcher.calls() - calls_before;
        Ok(progress.finish(calls, interrupted))
    }

    /// Hash every readable file.
    ///
    /// A file that cannot be read keeps its recorded hash when the manifest
    /// knows it, so it is neither re-embedded nor removed this run.
    fn hash_files(
        &self,
        files: Vec<SourceFile>,
    ) -> (HashMap<String, String>, HashMap<String, SourceFile>) {
        let mut current = HashMap::with_capacity(files.len());
        let mut locations = HashMap::with_capacity(files.len());

        for file in files {
            match std::fs::read_to_string(&file.absolute) {
                Ok(text) => {
                    current.insert(file.path.clone(), content_hash(&text));
                }
                Err(e) => match self.manifest.get(&file.path) {
                    Some(entry) => {
                        warn!(path = %file.path, "Unreadable, keeping previous index: {}", e);
                        current.insert(file.path.clone(), entry.hash.clone());
                    }
                    None => {
                        warn!(path = %file.path, "Unreadable, skipping: {}", e);
                        continue;
                    }
                },
            }
            locations.insert(file.path.clone(), file);
        }

        (current, locations)
    }

    /// Run the three phases. Returns whether the run was cancelled.
    async fn apply(
        &mut self,
        plan: &ManifestDiff,
        locations: &HashMap<String, SourceFile>,
        cancel: &CancellationToken,
        progress: &mut SyncProgress,
    ) -> Result<bool> {
        progress.begin_phase(SyncPhase::Removing, plan.removed.len());
        for path in &plan.removed {
            if cancel.is_cancelled() {
                return Ok(true);
            }
            match self.store.delete_by_path(self.corpus.collection(), path).await {
                Ok(()) => {
                    self.manifest.remove(path);
                    progress.file_done(path, 0);
                }
                Err(e) => progress.file_failed(path, &e),
            }
        }

        progress.begin_phase(SyncPhase::Updating, plan.changed.len());
        for path in &plan.changed {
            if cancel.is_cancelled() {
                return Ok(true);
            }
            match self.index_file(path, locations).await {
                Ok(chunks) => progress.file_done(path, chunks),
                Err(e) => {
                    self.manifest.remove(path);
                    progress.file_failed(path, &e);
                }
            }
        }

        progress.begin_phase(SyncPhase::Adding, plan.added.len());
        let mut since_checkpoint = 0;
        for path in &plan.added {
            if cancel.is_cancelled() {
                return Ok(true);
            }
            match self.index_file(path, locations).await {
                Ok(chunks) => {
                    progress.file_done(path, chunks);
                    since_checkpoint += 1;
                    if since_checkpoint >= self.config.checkpoint_every.max(1) {
                        self.save_manifest()?;
                        since_checkpoint = 0;
                    }
                }
                Err(e) => progress.file_failed(path, &e),
            }
        }

        Ok(false)
    }

    /// Replace every point of `path` with freshly embedded chunks and record it.
    ///
    /// Existing points are deleted first, so a file retried after a failed
    /// run never keeps stale points. Returns the number of points written.
    async fn index_file(
        &mut self,
        path: &str,
        locations: &HashMap<String, SourceFile>,
    ) -> Result<usize> {
        let file = locations
            .get(path)
            .with_context(|| format!("{path} vanished during sync"))?;
        let text = std::fs::read_to_string(&file.absolute)
            .with_context(|| format!("Failed to read {path}"))?;
        let hash = content_hash(&text);
        let chunks = self.corpus.chunk(file, &text);

        let collection = self.corpus.collection();
        self.store
            .delete_by_path(collection, path)
            .await
            .with_context(|| format!("Failed to clear old points of {path}"))?;

        let points = self.embed_chunks(&chunks).await?;
        let count = points.len();
        self.store
            .upsert(collection, points)
            .await
            .with_context(|| format!("Failed to upsert {path}"))?;

        debug!(path, chunks = chunks.len(), points = count, "Indexed file");
        self.manifest.record(path, hash, count);
        Ok(count)
    }

    /// Embed chunks into points. A chunk split for size yields one point per
    /// piece, its logical id suffixed `~{part}`.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Point>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let pieces = self.batcher.embed_many(&texts).await?;

        let points = pieces
            .into_iter()
            .map(|piece| {
                let chunk = &chunks[piece.source];
                let logical_id = if self.batcher.is_oversized(&texts[piece.source]) {
                    format!("{}~{}", chunk.id, piece.part)
                } else {
                    chunk.id.clone()
                };

                Point {
                    id: point_id(&logical_id),
                    vector: piece.vector,
                    payload: PointPayload {
                        chunk_id: logical_id,
                        path: chunk.path.clone(),
                        section: chunk.section.clone(),
                        content: piece.text,
                        start_line: chunk.start_line,
                        end_line: chunk.end_line,
                        language: chunk.code.as_ref().map(|c| c.language.clone()),
                        symbol_type: chunk
                            .code
                            .as_ref()
                            .map(|c| c.symbol_type.as_str().to_string()),
                    },
                }
            })
            .collect();

        Ok(points)
    }

    fn save_manifest(&self) -> Result<()> {
        self.manifest_store
            .save_corpus(&self.manifest)
            .with_context(|| format!("Failed to save manifest to {:?}", self.manifest_store.path()))
    }

    /// Vector search, best first.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        let vector = self
            .batcher
            .embed_query(query)
            .await
            .context("Failed to embed query")?;

        let hits = self
            .store
            .search(self.corpus.collection(), vector, limit, filter)
            .await?;

        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    /// ripgrep over the corpus files, one result per file.
    pub async fn exact_search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        Ok(self
            .lexical
            .search(&self.corpus.search_roots(), query, limit)
            .await?)
    }

    /// Semantic search for twice the limit, re-ranked down to `limit`.
    pub async fn hybrid_search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self
            .semantic_search(query, limit.saturating_mul(2), filter)
            .await?;
        self.reranker.rerank(query, candidates, limit).await
    }

    /// Dispatch on `mode`. Exact search ignores `filter` apart from a path prefix.
    pub async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        match mode {
            SearchMode::Semantic => self.semantic_search(query, limit, filter).await,
            SearchMode::Hybrid => self.hybrid_search(query, limit, filter).await,
            SearchMode::Exact => {
                let prefix = filter.and_then(|f| f.path_prefix.as_deref());
                let mut results = self
                    .exact_search(query, if prefix.is_some() { limit.saturating_mul(4) } else { limit })
                    .await?;
                if let Some(prefix) = prefix {
                    results.retain(|r| r.path.starts_with(prefix));
                    results.truncate(limit);
                }
                Ok(results)
            }
        }
    }
}

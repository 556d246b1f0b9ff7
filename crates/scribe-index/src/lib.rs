//! Incremental indexing and hybrid retrieval for documentation and code.
//!
//! This crate provides:
//! - Content-hash manifests so only changed files are re-embedded
//! - Section-aware markdown chunking and symbol-aware code chunking
//! - Token-budgeted embedding batches with oversized-text splitting
//! - Vector storage in Qdrant (or in memory for tests)
//! - Semantic, exact (ripgrep) and hybrid search

pub mod chunker;
pub mod coordinator;
pub mod diff;
pub mod embeddings;
pub mod hasher;
pub mod lexical;
pub mod manifest;
pub mod progress;
pub mod reranker;
pub mod search;
pub mod splitter;
pub mod store;

// Re-exports
pub use chunker::{
    Chunk, CodeChunker, CodeChunkerConfig, CodeMetadata, DocChunker, DocChunkerConfig, SymbolType,
};
pub use coordinator::{
    CodeCorpus, CodeIndexCoordinator, CodeRoot, CoordinatorConfig, Corpus, CorpusStatus,
    DocCorpus, DocIndexCoordinator, IndexCoordinator, SourceFile,
};
pub use diff::{diff, ManifestDiff};
pub use embeddings::{
    BatchConfig, EmbeddingBatcher, EmbeddingError, EmbeddingProvider, OpenAiEmbeddings,
};
pub use hasher::content_hash;
pub use lexical::{LexicalError, LexicalSearcher, SearchRoot};
pub use manifest::{CorpusKind, CorpusManifest, Manifest, ManifestEntry, ManifestError, ManifestStore};
pub use progress::{NoProgress, ProgressEvent, ProgressSink, SyncPhase, SyncReport, TracingSink};
pub use reranker::{EmbeddingReranker, Reranker};
pub use search::{SearchMode, SearchResult};
pub use store::{
    DistanceMetric, InMemoryVectorStore, Point, PointPayload, QdrantConfig, QdrantStore,
    SearchFilter, SearchHit, VectorStore,
};

/// Default collection for the documentation corpus
pub const DEFAULT_DOCS_COLLECTION: &str = "scribe-docs";

/// Default collection for the code corpus
pub const DEFAULT_CODE_COLLECTION: &str = "scribe-code";

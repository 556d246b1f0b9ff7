//! Builds the indexing engine from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use scribe_config::Config;
use scribe_index::chunker::CodeChunkerConfig;
use scribe_index::{
    BatchConfig, CodeChunker, CodeCorpus, CodeIndexCoordinator, CodeRoot, CoordinatorConfig,
    DocChunker, DocChunkerConfig, DocCorpus, DocIndexCoordinator, LexicalSearcher,
    ManifestStore, OpenAiEmbeddings, ProgressSink, QdrantConfig, QdrantStore, VectorStore,
};

/// Shared pieces every coordinator is built from.
pub struct Engine {
    config: Config,
    embeddings: Arc<OpenAiEmbeddings>,
    store: Arc<dyn VectorStore>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config.embeddings.resolve_api_key()?;
        Self::build(config, api_key)
    }

    /// An engine for exact search only. Needs no API key; the provider
    /// it carries is never called.
    pub fn for_exact_search(config: Config) -> Result<Self> {
        Self::build(config, String::new())
    }

    fn build(config: Config, api_key: String) -> Result<Self> {
        let embeddings = OpenAiEmbeddings::new(
            api_key,
            Some(config.embeddings.model.clone()),
            Some(config.embeddings.dimensions),
        )
        .with_base_url(config.embeddings.base_url.clone())
        .with_max_retries(config.embeddings.max_retries);

        let store = QdrantStore::connect(&QdrantConfig {
            url: config.qdrant.url.clone(),
            api_key: config.qdrant.api_key.clone(),
        })?;

        Ok(Self {
            config,
            embeddings: Arc::new(embeddings),
            store: Arc::new(store),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn docs(&self, sink: Arc<dyn ProgressSink>) -> Result<DocIndexCoordinator<OpenAiEmbeddings>> {
        let docs = &self.config.docs;
        let corpus = DocCorpus::new(
            docs.root_path(),
            docs.extensions.clone(),
            docs.collection.clone(),
            DocChunker::new(DocChunkerConfig {
                max_section_chars: docs.max_section_chars,
            }),
        );

        Ok(DocIndexCoordinator::new(
            corpus,
            self.embeddings.clone(),
            self.store.clone(),
            manifest_store(&self.config),
            batch_config(&self.config),
        )?
        .with_config(self.coordinator_config())
        .with_lexical(self.lexical())
        .with_progress(sink))
    }

    pub fn code(&self, sink: Arc<dyn ProgressSink>) -> Result<CodeIndexCoordinator<OpenAiEmbeddings>> {
        let code = &self.config.code;
        let roots = code
            .roots
            .iter()
            .map(|r| CodeRoot {
                label: r.label.clone(),
                dir: r.dir(),
            })
            .collect();
        let chunker = CodeChunker::new(CodeChunkerConfig {
            window_lines: code.window_lines,
            window_overlap: code.window_overlap,
            max_symbol_lines: code.max_symbol_lines,
            ..Default::default()
        })?;
        let corpus = CodeCorpus::new(roots, code.extensions.clone(), code.collection.clone(), chunker)?;

        Ok(CodeIndexCoordinator::new(
            corpus,
            self.embeddings.clone(),
            self.store.clone(),
            manifest_store(&self.config),
            batch_config(&self.config),
        )?
        .with_config(self.coordinator_config())
        .with_lexical(self.lexical())
        .with_progress(sink))
    }

    fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            checkpoint_every: self.config.index.checkpoint_every,
            ..Default::default()
        }
    }

    fn lexical(&self) -> LexicalSearcher {
        LexicalSearcher::new(self.config.search.ripgrep.clone())
            .fixed_strings(self.config.search.fixed_strings)
    }
}

/// Manifest location; needs no network or API key.
pub fn manifest_store(config: &Config) -> ManifestStore {
    ManifestStore::in_dir(&config.index.state_path())
}

pub fn batch_config(config: &Config) -> BatchConfig {
    let b = &config.batching;
    BatchConfig {
        max_tokens_per_batch: b.max_tokens_per_batch,
        chars_per_token: b.chars_per_token,
        max_chars_per_text: b.max_chars_per_text,
        oversized_batch_size: b.oversized_batch_size,
        flush_threshold: b.flush_threshold,
    }
}

/// Create the state directory if needed.
pub fn ensure_state_dir(config: &Config) -> Result<()> {
    let dir = config.index.state_path();
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_batch_config_mirrors_settings() {
        let mut config = Config::default();
        config.batching.max_chars_per_text = 4000;
        let batch = batch_config(&config);
        assert_eq!(batch.max_chars_per_text, 4000);
        assert_eq!(batch.max_chars_per_batch(), config.batching.max_chars_per_batch());
        assert!(batch.validate().is_ok());
    }

    #[tokio::test]
    async fn test_exact_search_engine_needs_no_api_key() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.embeddings.api_key = None;
        config.index.state_dir = dir.path().join("state").to_string_lossy().into_owned();
        config.docs.root = dir.path().to_string_lossy().into_owned();

        let engine = Engine::for_exact_search(config).unwrap();
        assert!(engine.docs(Arc::new(scribe_index::NoProgress)).is_ok());
    }

    #[test]
    fn test_manifest_lives_in_state_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.index.state_dir = dir.path().join("state").to_string_lossy().into_owned();

        ensure_state_dir(&config).unwrap();
        let store = manifest_store(&config);
        assert!(store.path().starts_with(dir.path().join("state")));
    }
}

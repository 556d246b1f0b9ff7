//! Size-aware batching in front of an [`EmbeddingProvider`].
//!
//! Two limits apply. Each provider call carries at most
//! `max_tokens_per_batch * chars_per_token` characters, and no single text may
//! exceed `max_chars_per_text`. Texts above the per-text ceiling are split
//! into sub-chunks that are embedded, and later stored, as separate units.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use super::{EmbeddingError, EmbeddingProvider};
use crate::splitter::{char_len, split_to_fit};

/// Limits for [`EmbeddingBatcher`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Token budget of a single provider call
    pub max_tokens_per_batch: usize,

    /// Characters assumed per token when converting the budget
    pub chars_per_token: f32,

    /// Ceiling for a single text; larger texts are split
    pub max_chars_per_text: usize,

    /// Maximum number of sub-chunks sent in one call
    pub oversized_batch_size: usize,

    /// A batch past this fraction of the budget is flushed early
    pub flush_threshold: f32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: 8000,
            chars_per_token: 2.0,
            max_chars_per_text: 6000,
            oversized_batch_size: 50,
            flush_threshold: 0.9,
        }
    }
}

impl BatchConfig {
    /// Character budget of a single provider call.
    pub fn max_chars_per_batch(&self) -> usize {
        (self.max_tokens_per_batch as f64 * self.chars_per_token as f64) as usize
    }

    pub fn validate(&self) -> Result<(), BatchConfigError> {
        if self.max_tokens_per_batch == 0 {
            return Err(BatchConfigError::Zero("max_tokens_per_batch"));
        }
        if self.max_chars_per_text == 0 {
            return Err(BatchConfigError::Zero("max_chars_per_text"));
        }
        if self.oversized_batch_size == 0 {
            return Err(BatchConfigError::Zero("oversized_batch_size"));
        }
        if !(self.chars_per_token.is_finite() && self.chars_per_token > 0.0) {
            return Err(BatchConfigError::CharsPerToken(self.chars_per_token));
        }
        if !(self.flush_threshold > 0.0 && self.flush_threshold <= 1.0) {
            return Err(BatchConfigError::FlushThreshold(self.flush_threshold));
        }
        let per_batch = self.max_chars_per_batch();
        if self.max_chars_per_text >= per_batch {
            return Err(BatchConfigError::TextCeiling {
                per_text: self.max_chars_per_text,
                per_batch,
            });
        }
        Ok(())
    }
}

/// Rejected batching limits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("chars_per_token must be a positive number, got {0}")]
    CharsPerToken(f32),

    #[error("flush_threshold must be in (0, 1], got {0}")]
    FlushThreshold(f32),

    #[error("max_chars_per_text ({per_text}) must be smaller than the batch budget ({per_batch})")]
    TextCeiling { per_text: usize, per_batch: usize },
}

/// One embedded unit.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPiece {
    /// Index of the input text this piece came from
    pub source: usize,

    /// Position of the piece within its source; always 0 for texts that fit
    pub part: usize,

    /// The exact text that was embedded
    pub text: String,

    pub vector: Vec<f32>,
}

/// Partitions texts into provider-safe calls.
pub struct EmbeddingBatcher<E: EmbeddingProvider> {
    provider: Arc<E>,
    config: BatchConfig,
    calls: AtomicUsize,
}

impl<E: EmbeddingProvider> EmbeddingBatcher<E> {
    pub fn new(provider: Arc<E>, config: BatchConfig) -> Result<Self, BatchConfigError> {
        config.validate()?;
        Ok(Self {
            provider,
            config,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<E> {
        &self.provider
    }

    /// Provider calls made through this batcher so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Whether `text` exceeds the per-text ceiling.
    pub fn is_oversized(&self, text: &str) -> bool {
        char_len(text) > self.config.max_chars_per_text
    }

    /// Group the indices of normal-sized texts into batches.
    ///
    /// Everything goes in one batch when the total fits. Otherwise texts are
    /// accumulated in order and the batch is flushed before a text that would
    /// overflow the budget, or once the batch is past the flush threshold.
    pub fn plan_batches(&self, texts: &[String], indices: &[usize]) -> Vec<Vec<usize>> {
        let budget = self.config.max_chars_per_batch();
        let threshold = (budget as f64 * self.config.flush_threshold as f64) as usize;

        let sizes: Vec<(usize, usize)> = indices
            .iter()
            .map(|&i| (i, char_len(&texts[i])))
            .collect();

        if sizes.is_empty() {
            return Vec::new();
        }
        if sizes.iter().map(|(_, len)| len).sum::<usize>() <= budget {
            return vec![indices.to_vec()];
        }

        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_chars = 0usize;

        for (i, len) in sizes {
            if !current.is_empty() && (current_chars + len > budget || current_chars >= threshold)
            {
                batches.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            current.push(i);
            current_chars += len;
        }
        if !current.is_empty() {
            batches.push(current);
        }

        batches
    }

    /// Embed one query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.provider.embed(text).await
    }

    /// Embed every text, splitting the oversized ones.
    ///
    /// Pieces derived from oversized texts come first, in input order, then
    /// the normal texts in input order. Every piece is at most
    /// `max_chars_per_text` characters.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddedPiece>> {
        let (oversized, normal): (Vec<usize>, Vec<usize>) =
            (0..texts.len()).partition(|&i| self.is_oversized(&texts[i]));

        let mut pieces = Vec::with_capacity(texts.len());

        for &source in &oversized {
            let parts = split_to_fit(&texts[source], self.config.max_chars_per_text);
            debug!(
                source,
                chars = char_len(&texts[source]),
                parts = parts.len(),
                "Splitting oversized text"
            );

            let budget = self.config.max_chars_per_batch();
            let mut offset = 0;
            for group in group_parts(&parts, self.config.oversized_batch_size, budget) {
                let vectors = self.call(&group).await?;
                for (text, vector) in group.into_iter().zip(vectors) {
                    pieces.push(EmbeddedPiece {
                        source,
                        part: offset,
                        text,
                        vector,
                    });
                    offset += 1;
                }
            }
        }

        for batch in self.plan_batches(texts, &normal) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.call(&batch_texts).await?;
            for ((source, text), vector) in batch.into_iter().zip(batch_texts).zip(vectors) {
                pieces.push(EmbeddedPiece {
                    source,
                    part: 0,
                    text,
                    vector,
                });
            }
        }

        Ok(pieces)
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let chars: usize = texts.iter().map(|t| char_len(t)).sum();
        debug!(texts = texts.len(), chars, "Embedding batch");

        self.calls.fetch_add(1, Ordering::Relaxed);
        let vectors = self
            .provider
            .embed_batch(texts)
            .await
            .with_context(|| format!("embedding batch of {} texts failed", texts.len()))?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            ))
            .into());
        }
        Ok(vectors)
    }
}

/// Group sub-chunks into calls of at most `max_items` texts and `budget` characters.
fn group_parts(parts: &[String], max_items: usize, budget: usize) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_chars = 0usize;

    for part in parts {
        let len = char_len(part);
        if !current.is_empty() && (current.len() >= max_items || current_chars + len > budget) {
            groups.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(part.clone());
        current_chars += len;
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

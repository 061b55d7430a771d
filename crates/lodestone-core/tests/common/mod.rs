//! Shared fixtures for integration tests: in-process providers and
//! context builders

#![allow(dead_code)]

use async_trait::async_trait;
use lodestone_core::llm::{RerankDocument, RerankResult};
use lodestone_core::{
    Config, DenseKind, Embedder, Error, IndexContext, IndexStore, LexicalEncoder, ProviderSet,
    Reranker, Result, SparseVector,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const DIM: usize = 64;

/// Hashed bag-of-words embedding, so texts sharing words are similar
pub fn embed_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % DIM as u64) as usize] += 1.0;
    }
    vector
}

/// Deterministic embedder with sparse support. Any batch containing
/// `poison` (when set) fails with a retryable provider error.
pub struct WordEmbedder {
    pub poison: Option<String>,
    pub calls: AtomicUsize,
}

impl WordEmbedder {
    pub fn new() -> Self {
        Self {
            poison: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn poisoned(marker: &str) -> Self {
        Self {
            poison: Some(marker.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for WordEmbedder {
    async fn embed_dense(&self, texts: &[String], _kind: DenseKind) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.poison {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(Error::EmbeddingProvider("HTTP 503: overloaded".into()));
            }
        }
        Ok(texts.iter().map(|t| embed_words(t)).collect())
    }

    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        Ok(LexicalEncoder::default().encode_batch(texts))
    }

    fn supports_sparse(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "word-embedder"
    }
}

/// Reranker that always fails
pub struct FailingReranker;

#[async_trait]
impl Reranker for FailingReranker {
    async fn rerank(&self, _query: &str, _docs: &[RerankDocument]) -> Result<Vec<RerankResult>> {
        Err(Error::RerankUnavailable("rerank service returned 500".into()))
    }

    fn model_name(&self) -> &str {
        "failing-reranker"
    }
}

/// Small windows and fast retries so tests stay quick
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.chunking.target_chars = 200;
    config.chunking.overlap_chars = 20;
    config.embedding.batch_size = 8;
    config.embedding.base_backoff_ms = 1;
    config.embedding.max_backoff_ms = 2;
    config.jobs.progress_interval_ms = 0;
    config
}

pub fn context(store: Arc<dyn IndexStore>, providers: ProviderSet) -> IndexContext {
    IndexContext::new(test_config(), store, providers)
}

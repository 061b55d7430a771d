//! Model providers
//!
//! Traits and HTTP implementations for:
//! - Dense embeddings (text and, optionally, code) and sparse lexical vectors
//! - Reranking
//! - Query expansion
//! - Answer synthesis
//!
//! Which implementation backs each capability is decided once, when a
//! [`ProviderSet`] is built.

mod client;
mod http_embedder;
mod http_query_expander;
mod http_reranker;
mod http_synthesizer;
mod sparse;
mod traits;

pub use client::{ChatMessage, HttpLLMClient, LLMClient, MetricsSnapshot};
pub use http_embedder::HttpEmbedder;
pub use http_query_expander::HttpQueryExpander;
pub use http_reranker::HttpReranker;
pub use http_synthesizer::HttpAnswerSynthesizer;
pub use sparse::LexicalEncoder;
pub use traits::*;

use crate::config::Config;
use crate::error::Result;
use std::sync::Arc;

/// The providers an index context works with
#[derive(Clone)]
pub struct ProviderSet {
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub expander: Option<Arc<dyn QueryExpander>>,
    pub synthesizer: Option<Arc<dyn AnswerSynthesizer>>,
}

impl ProviderSet {
    /// Embedder only; no rerank, expansion or synthesis
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            reranker: None,
            expander: None,
            synthesizer: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn AnswerSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// HTTP providers as configured. Optional capabilities are present only
    /// when enabled and backed by a model.
    pub fn from_config(config: &Config) -> Result<Self> {
        let service = &config.llm_service;
        let embedder = HttpEmbedder::from_config(service, config.embedding.sparse)?;
        let mut providers = Self::new(Arc::new(embedder));

        if config.retrieval.rerank {
            if let Some(reranker) = HttpReranker::from_config(service)? {
                providers = providers.with_reranker(Arc::new(reranker));
            }
        }
        if service.query_expansion {
            providers = providers.with_expander(Arc::new(HttpQueryExpander::from_config(service)?));
        }
        if service.synthesis {
            providers =
                providers.with_synthesizer(Arc::new(HttpAnswerSynthesizer::from_config(service)?));
        }

        tracing::debug!(
            embedder = providers.embedder.model_name(),
            rerank = providers.reranker.is_some(),
            expansion = providers.expander.is_some(),
            synthesis = providers.synthesizer.is_some(),
            "Providers configured"
        );

        Ok(providers)
    }
}

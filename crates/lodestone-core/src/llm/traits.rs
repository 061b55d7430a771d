//! Provider trait definitions

use crate::error::{Error, Result};
use crate::models::{DenseKind, SparseVector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dense embeddings for a batch, one vector per input in input order
    async fn embed_dense(&self, texts: &[String], kind: DenseKind) -> Result<Vec<Vec<f32>>>;

    /// Sparse lexical vectors for a batch, one per input in input order
    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let _ = texts;
        Err(Error::SparseUnavailable(format!(
            "{} has no sparse encoder",
            self.model_name()
        )))
    }

    /// Whether this embedder has a model for the given dense space
    fn supports(&self, kind: DenseKind) -> bool {
        kind == DenseKind::Text
    }

    fn supports_sparse(&self) -> bool {
        false
    }

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Document reranking trait
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score every document against the query. Results may come back in any
    /// order and may omit documents.
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<RerankResult>>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Document for reranking
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub id: String,
    pub text: String,
}

/// Reranking result
#[derive(Debug, Clone, PartialEq)]
pub struct RerankResult {
    pub id: String,
    pub score: f64,
}

/// Query expansion trait
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Expand query into variants
    async fn expand(&self, query: &str, context: Option<&str>) -> Result<ExpandedQuery>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Expanded query variants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    /// Keyword-style rewrites
    #[serde(default)]
    pub lexical: Vec<String>,
    /// Rephrased questions
    #[serde(default)]
    pub semantic: Vec<String>,
    /// Hypothetical document (HyDE)
    #[serde(default)]
    pub hyde: Option<String>,
}

impl ExpandedQuery {
    /// All distinct, non-empty variations: semantic, then lexical, then HyDE
    pub fn variations(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let candidates = self
            .semantic
            .iter()
            .chain(self.lexical.iter())
            .chain(self.hyde.iter());
        for candidate in candidates {
            let trimmed = candidate.trim();
            if !trimmed.is_empty() && !out.iter().any(|v| v == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        out
    }
}

/// A retrieved passage handed to answer synthesis
#[derive(Debug, Clone)]
pub struct Passage {
    pub chunk_id: String,
    pub locator: String,
    pub text: String,
}

/// Natural-language answer citing retrieved chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub text: String,
    /// Chunk ids the answer cites, in order of first citation
    pub citations: Vec<String>,
}

/// Answer synthesis trait
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, query: &str, passages: &[Passage]) -> Result<SynthesizedAnswer>;

    fn model_name(&self) -> &str;
}

//! HTTP-based embedder using an external embedding service

use super::{Embedder, HttpLLMClient, LLMClient, LexicalEncoder};
use crate::config::LLMServiceConfig;
use crate::error::{Error, Result};
use crate::models::{DenseKind, SparseVector};
use async_trait::async_trait;
use std::sync::Arc;

/// Embedder backed by an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// Text and code live in separate dense spaces; the code space exists only
/// when a code model is configured. Sparse vectors come from a local
/// [`LexicalEncoder`] when enabled.
pub struct HttpEmbedder {
    client: Arc<dyn LLMClient>,
    text_model: String,
    code_model: Option<String>,
    lexical: Option<LexicalEncoder>,
}

impl HttpEmbedder {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>, text_model: impl Into<String>) -> Self {
        Self {
            client,
            text_model: text_model.into(),
            code_model: None,
            lexical: None,
        }
    }

    pub fn with_code_model(mut self, model: impl Into<String>) -> Self {
        self.code_model = Some(model.into());
        self
    }

    pub fn with_sparse(mut self, encoder: LexicalEncoder) -> Self {
        self.lexical = Some(encoder);
        self
    }

    /// Create from configuration
    pub fn from_config(config: &LLMServiceConfig, sparse: bool) -> Result<Self> {
        let client = HttpLLMClient::new(config.clone())?;
        let mut embedder = Self::new(Arc::new(client), config.embedding_model.clone());
        if let Some(ref model) = config.code_embedding_model {
            embedder = embedder.with_code_model(model.clone());
        }
        if sparse {
            embedder = embedder.with_sparse(LexicalEncoder::new());
        }
        Ok(embedder)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_dense(&self, texts: &[String], kind: DenseKind) -> Result<Vec<Vec<f32>>> {
        let model = match kind {
            DenseKind::Text => self.text_model.as_str(),
            DenseKind::Code => self.code_model.as_deref().ok_or_else(|| {
                Error::InvalidInput("No code embedding model configured".to_string())
            })?,
        };
        self.client.embed_batch(model, texts).await
    }

    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        match self.lexical {
            Some(encoder) => Ok(encoder.encode_batch(texts)),
            None => Err(Error::SparseUnavailable(
                "Sparse encoding disabled".to_string(),
            )),
        }
    }

    fn supports(&self, kind: DenseKind) -> bool {
        match kind {
            DenseKind::Text => true,
            DenseKind::Code => self.code_model.is_some(),
        }
    }

    fn supports_sparse(&self) -> bool {
        self.lexical.is_some()
    }

    fn model_name(&self) -> &str {
        &self.text_model
    }
}

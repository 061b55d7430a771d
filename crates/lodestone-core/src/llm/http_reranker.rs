//! HTTP-based reranker using an external `/v1/rerank` endpoint

use super::{HttpLLMClient, LLMClient, RerankDocument, RerankResult, Reranker};
use crate::config::LLMServiceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Longest document text sent to the reranker, in bytes
const MAX_DOC_CHARS: usize = 2000;

/// Cross-encoder reranker behind an HTTP service
pub struct HttpReranker {
    client: Arc<dyn LLMClient>,
    model: String,
}

impl HttpReranker {
    /// Create from LLM client
    pub fn new(client: Arc<dyn LLMClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Create from configuration; `None` when no rerank model is configured
    pub fn from_config(config: &LLMServiceConfig) -> Result<Option<Self>> {
        let Some(model) = config.rerank_model.clone() else {
            return Ok(None);
        };
        let client = HttpLLMClient::new(config.clone())?;
        Ok(Some(Self::new(Arc::new(client), model)))
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<RerankResult>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<String> = documents
            .iter()
            .map(|d| truncate(&d.text, MAX_DOC_CHARS).to_string())
            .collect();

        let scores = self
            .client
            .rerank(&self.model, query, &texts)
            .await
            .map_err(|e| Error::RerankUnavailable(e.to_string()))?;

        Ok(scores
            .into_iter()
            .filter_map(|(index, score)| {
                documents.get(index).map(|doc| RerankResult {
                    id: doc.id.clone(),
                    score,
                })
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

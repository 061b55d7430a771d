//! Hybrid dense + sparse retrieval with optional reranking

use super::fusion::{fuse, FusedCandidate};
use super::{QueryRequest, QueryResult};
use crate::config::RetrievalConfig;
use crate::db::{IndexStore, SearchFilter, SearchHit};
use crate::error::{Error, Result};
use crate::llm::{ProviderSet, RerankDocument};
use crate::models::DenseKind;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Query engine over one store and provider set
#[derive(Clone)]
pub struct RetrievalEngine {
    pub(super) store: Arc<dyn IndexStore>,
    pub(super) providers: ProviderSet,
    pub(super) config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn IndexStore>, providers: ProviderSet, config: RetrievalConfig) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    /// Ranked chunks for `request`.
    ///
    /// A failing sparse stage degrades to dense-only ranking and a failing
    /// reranker to the fused order. Only when neither dense nor sparse
    /// search is available does this return `RetrievalUnavailable`.
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryResult>> {
        if request.top_k == 0 {
            return Ok(Vec::new());
        }

        let filter = request.search_filter();
        let limit = request.top_k * self.config.candidate_multiplier.max(1);

        let (dense, sparse) = futures::join!(
            self.dense_candidates(&request.text, limit, &filter),
            self.sparse_candidates(&request.text, limit, &filter)
        );

        let (dense, sparse) = match (dense, sparse) {
            (Ok(d), Ok(s)) => (d, s),
            (Ok(d), Err(e)) => {
                warn!(error = %e, "Sparse search unavailable, ranking dense-only");
                (d, Vec::new())
            }
            (Err(e), Ok(s)) => {
                warn!(error = %e, "Dense search unavailable, ranking sparse-only");
                (Vec::new(), s)
            }
            (Err(dense_err), Err(sparse_err)) => {
                return Err(Error::RetrievalUnavailable(format!(
                    "dense: {}; sparse: {}",
                    dense_err, sparse_err
                )));
            }
        };

        debug!(
            dense = dense.len(),
            sparse = sparse.len(),
            limit,
            "Candidates gathered"
        );

        let fused = fuse(
            dense,
            sparse,
            self.config.dense_weight,
            self.config.sparse_weight,
        );
        let mut results = self.rerank(&request.text, fused).await;
        results.truncate(request.top_k);
        Ok(results)
    }

    /// Text-space search, merged with code-space search when the embedder
    /// has a code model. A failing code stage is dropped; a failing text
    /// stage fails the dense side.
    async fn dense_candidates(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let embedder = &self.providers.embedder;
        let texts = [query.to_string()];

        let text_vector = first(embedder.embed_dense(&texts, DenseKind::Text).await?)?;
        let mut hits = self
            .store
            .dense_search(&text_vector, DenseKind::Text, limit, filter)
            .await?;

        if embedder.supports(DenseKind::Code) {
            let code_hits = match embedder.embed_dense(&texts, DenseKind::Code).await {
                Ok(vectors) => match first(vectors) {
                    Ok(vector) => {
                        self.store
                            .dense_search(&vector, DenseKind::Code, limit, filter)
                            .await
                    }
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match code_hits {
                Ok(code_hits) => hits = merge_max(hits, code_hits, limit),
                Err(e) => warn!(error = %e, "Code search failed, using text search only"),
            }
        }

        Ok(hits)
    }

    async fn sparse_candidates(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let vectors = self
            .providers
            .embedder
            .embed_sparse(&[query.to_string()])
            .await
            .map_err(|e| match e {
                Error::SparseUnavailable(_) => e,
                other => Error::SparseUnavailable(other.to_string()),
            })?;
        let vector = first(vectors)?;
        self.store.sparse_search(&vector, limit, filter).await
    }

    /// Rerank the head of the fused list. Reranked candidates move to the
    /// front in rerank order; everything else keeps its fused position.
    async fn rerank(&self, query: &str, fused: Vec<FusedCandidate>) -> Vec<QueryResult> {
        let mut results: Vec<QueryResult> = fused.into_iter().map(QueryResult::from).collect();

        let reranker = match &self.providers.reranker {
            Some(reranker) if self.config.rerank && !results.is_empty() => reranker,
            _ => return results,
        };

        let head_len = self.config.rerank_top_n.min(results.len());
        let docs: Vec<RerankDocument> = results[..head_len]
            .iter()
            .map(|r| RerankDocument {
                id: r.chunk_id.clone(),
                text: r.text.clone(),
            })
            .collect();

        let reranked = match reranker.rerank(query, &docs).await {
            Ok(reranked) => reranked,
            Err(e) => {
                warn!(
                    model = reranker.model_name(),
                    error = %e,
                    "Rerank failed, keeping fused order"
                );
                return results;
            }
        };

        let scores: HashMap<String, f64> =
            reranked.into_iter().map(|r| (r.id, r.score)).collect();

        let tail = results.split_off(head_len);
        let (mut scored, unscored): (Vec<QueryResult>, Vec<QueryResult>) = results
            .into_iter()
            .map(|mut r| {
                r.rerank_score = scores.get(&r.chunk_id).copied();
                if let Some(score) = r.rerank_score {
                    r.score = score;
                }
                r
            })
            .partition(|r| r.rerank_score.is_some());

        // Stable sort keeps fused order among equal rerank scores
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(reranked = scored.len(), head = head_len, "Reranked candidates");

        scored.extend(unscored);
        scored.extend(tail);
        scored
    }
}

fn first<T>(mut items: Vec<T>) -> Result<T> {
    if items.is_empty() {
        return Err(Error::EmbeddingProvider(
            "provider returned no vector for the query".to_string(),
        ));
    }
    Ok(items.swap_remove(0))
}

/// Union two hit lists by chunk id keeping the higher score
fn merge_max(a: Vec<SearchHit>, b: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut by_id: HashMap<String, SearchHit> = HashMap::new();
    for hit in a.into_iter().chain(b) {
        match by_id.get_mut(&hit.chunk_id) {
            Some(existing) if existing.score >= hit.score => {}
            Some(existing) => *existing = hit,
            None => {
                by_id.insert(hit.chunk_id.clone(), hit);
            }
        }
    }
    crate::db::rank_hits(by_id.into_values().collect(), limit)
}

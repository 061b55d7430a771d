//! Hybrid retrieval
//!
//! Dense and sparse candidate generation, weighted fusion, optional
//! reranking, and multi-variation "smart" queries with answer synthesis.

mod fusion;
mod hybrid;
mod smart;

pub use fusion::{fuse, normalize, FusedCandidate};
pub use hybrid::RetrievalEngine;
pub use smart::SmartQueryResult;

use crate::db::SearchFilter;
use crate::index::ast_chunker::ChunkType;
use crate::models::{Scope, SymbolInfo};
use serde::{Deserialize, Serialize};

/// Default number of results
pub const DEFAULT_TOP_K: usize = 10;

/// Optional restrictions on a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilters {
    /// Restrict to these datasets; empty means all datasets in scope
    #[serde(default)]
    pub dataset_ids: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub symbol_kind: Option<ChunkType>,
}

/// A retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub text: String,
    /// Scopes to search; empty means every scope
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: QueryFilters,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scopes: Vec::new(),
            top_k: DEFAULT_TOP_K,
            filters: QueryFilters::default(),
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.filters.dataset_ids.push(dataset_id.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.filters.language = Some(language.into());
        self
    }

    pub fn symbol_kind(mut self, kind: ChunkType) -> Self {
        self.filters.symbol_kind = Some(kind);
        self
    }

    pub(crate) fn search_filter(&self) -> SearchFilter {
        SearchFilter {
            dataset_ids: self.filters.dataset_ids.clone(),
            scopes: self.scopes.clone(),
            language: self.filters.language.clone(),
            symbol_kind: self.filters.symbol_kind,
        }
    }
}

/// One ranked chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub chunk_id: String,
    pub locator: String,
    /// Raw dense similarity, 0 when not a dense candidate
    pub dense_score: f64,
    /// Raw sparse similarity, 0 when not a sparse candidate
    pub sparse_score: f64,
    pub fused_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    /// Ranking score: the rerank score when present, otherwise the fused score
    pub score: f64,
    pub dataset_id: String,
    pub dataset_scope: Scope,
    pub path: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<SymbolInfo>,
}

impl From<FusedCandidate> for QueryResult {
    fn from(candidate: FusedCandidate) -> Self {
        let hit = candidate.hit;
        Self {
            chunk_id: hit.chunk_id,
            locator: hit.locator,
            dense_score: candidate.dense_score,
            sparse_score: candidate.sparse_score,
            fused_score: candidate.fused_score,
            rerank_score: None,
            score: candidate.fused_score,
            dataset_id: hit.dataset_id,
            dataset_scope: hit.scope,
            path: hit.path,
            text: hit.text,
            language: hit.language,
            symbol: hit.symbol,
        }
    }
}

/// Highest score first, chunk id ascending on ties
pub(crate) fn sort_results(results: &mut [QueryResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

//! Storage layer for lodestone
//!
//! Provides the [`IndexStore`] contract used by the ingestion pipeline and
//! the retrieval engine, with two backends:
//! - [`Database`]: SQLite (bundled) with transactional per-file replace
//! - [`MemoryStore`]: lock-guarded maps, used in tests and ephemeral setups
//!
//! Both compute vector similarity in Rust over stored BLOBs/arrays.

mod chunks;
mod content;
mod files;
mod memory;
mod schema;
pub mod vectors;

pub use content::{chunk_id, file_id, hash_content};
pub use memory::MemoryStore;
pub use schema::Database;

use crate::error::Result;
use crate::index::ast_chunker::ChunkType;
use crate::models::{Dataset, DenseKind, FileRecord, IndexedChunk, Scope, SparseVector, SymbolInfo};
use async_trait::async_trait;
use std::path::PathBuf;

/// Restricts which chunks a search may return
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Dataset ids to search; empty means all
    pub dataset_ids: Vec<String>,
    /// Scopes to search; empty means all
    pub scopes: Vec<Scope>,
    pub language: Option<String>,
    pub symbol_kind: Option<ChunkType>,
}

impl SearchFilter {
    pub(crate) fn matches(&self, dataset: &Dataset, chunk: &IndexedChunk) -> bool {
        if !self.dataset_ids.is_empty() && !self.dataset_ids.contains(&dataset.id) {
            return false;
        }
        if !self.scopes.is_empty() && !self.scopes.contains(&dataset.scope) {
            return false;
        }
        if let Some(ref lang) = self.language {
            if chunk.language.as_deref() != Some(lang.as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.symbol_kind {
            if chunk.symbol.as_ref().map(|s| s.kind) != Some(kind) {
                return false;
            }
        }
        true
    }
}

/// One candidate returned by a dense or sparse search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub dataset_id: String,
    pub scope: Scope,
    pub path: String,
    pub locator: String,
    pub text: String,
    pub language: Option<String>,
    pub symbol: Option<SymbolInfo>,
    pub score: f64,
}

impl SearchHit {
    pub(crate) fn from_chunk(chunk: &IndexedChunk, scope: Scope, score: f64) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            dataset_id: chunk.dataset_id.clone(),
            scope,
            path: chunk.path.clone(),
            locator: chunk.locator(),
            text: chunk.text.clone(),
            language: chunk.language.clone(),
            symbol: chunk.symbol.clone(),
            score,
        }
    }
}

/// Highest score first, chunk id ascending on ties, truncated to `limit`
pub(crate) fn rank_hits(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(limit);
    hits
}

/// Storage contract for datasets, file records, chunks and their vectors
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Create the dataset if it does not exist yet
    async fn ensure_dataset(&self, dataset: &Dataset) -> Result<()>;

    async fn get_file_record(&self, dataset_id: &str, path: &str) -> Result<Option<FileRecord>>;

    async fn list_file_records(&self, dataset_id: &str) -> Result<Vec<FileRecord>>;

    /// Atomically replace every chunk of `record` with `chunks` and upsert
    /// the record itself. Returns the number of chunks removed.
    async fn upsert_chunks(&self, record: &FileRecord, chunks: &[IndexedChunk]) -> Result<usize>;

    /// Delete a file record and cascade to its chunks. Returns the number of
    /// chunks removed.
    async fn delete_chunks(&self, file_id: &str) -> Result<usize>;

    /// Chunks currently owned by a file, in index order
    async fn file_chunks(&self, file_id: &str) -> Result<Vec<IndexedChunk>>;

    async fn dense_search(
        &self,
        query: &[f32],
        kind: DenseKind,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>>;

    async fn sparse_search(
        &self,
        query: &SparseVector,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>>;
}

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CACHE_DIR_NAME)
            .join("index.sqlite")
    }
}

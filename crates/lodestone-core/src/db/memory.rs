//! In-memory [`IndexStore`] implementation for tests and ephemeral indexes.
//!
//! All state lives behind one `std::sync::RwLock`, so a file replace is
//! a single write-guarded step and readers never observe a partial one.
//! Vector search is brute-force over every stored chunk.

use super::vectors::cosine_similarity;
use super::{rank_hits, IndexStore, SearchFilter, SearchHit};
use crate::error::{Error, Result};
use crate::models::{Dataset, DenseKind, FileRecord, IndexedChunk, SparseVector};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct State {
    datasets: HashMap<String, Dataset>,
    /// file id -> record
    records: HashMap<String, FileRecord>,
    /// file id -> chunks in index order
    chunks: HashMap<String, Vec<IndexedChunk>>,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls (`upsert_chunks` / `delete_chunks`) served so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total chunks across all files
    pub fn chunk_count(&self) -> usize {
        self.read()
            .map(|s| s.chunks.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Other(anyhow::anyhow!("memory store lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Other(anyhow::anyhow!("memory store lock poisoned")))
    }

    fn search<F>(&self, limit: usize, filter: &SearchFilter, score: F) -> Result<Vec<SearchHit>>
    where
        F: Fn(&IndexedChunk) -> Option<f64>,
    {
        let state = self.read()?;
        let mut hits = Vec::new();
        for chunk in state.chunks.values().flatten() {
            let Some(dataset) = state.datasets.get(&chunk.dataset_id) else {
                continue;
            };
            if !filter.matches(dataset, chunk) {
                continue;
            }
            if let Some(s) = score(chunk) {
                hits.push(SearchHit::from_chunk(chunk, dataset.scope, s));
            }
        }
        Ok(rank_hits(hits, limit))
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn ensure_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut state = self.write()?;
        state
            .datasets
            .entry(dataset.id.clone())
            .or_insert_with(|| dataset.clone());
        Ok(())
    }

    async fn get_file_record(&self, dataset_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let state = self.read()?;
        Ok(state
            .records
            .values()
            .find(|r| r.dataset_id == dataset_id && r.path == path)
            .cloned())
    }

    async fn list_file_records(&self, dataset_id: &str) -> Result<Vec<FileRecord>> {
        let state = self.read()?;
        let mut records: Vec<FileRecord> = state
            .records
            .values()
            .filter(|r| r.dataset_id == dataset_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }

    async fn upsert_chunks(&self, record: &FileRecord, chunks: &[IndexedChunk]) -> Result<usize> {
        let mut state = self.write()?;
        if !state.datasets.contains_key(&record.dataset_id) {
            return Err(Error::DatasetNotFound(record.dataset_id.clone()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let removed = state
            .chunks
            .insert(record.id.clone(), chunks.to_vec())
            .map(|old| old.len())
            .unwrap_or(0);
        state.records.insert(record.id.clone(), record.clone());
        Ok(removed)
    }

    async fn delete_chunks(&self, file_id: &str) -> Result<usize> {
        let mut state = self.write()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        state.records.remove(file_id);
        Ok(state.chunks.remove(file_id).map(|c| c.len()).unwrap_or(0))
    }

    async fn file_chunks(&self, file_id: &str) -> Result<Vec<IndexedChunk>> {
        let state = self.read()?;
        Ok(state.chunks.get(file_id).cloned().unwrap_or_default())
    }

    async fn dense_search(
        &self,
        query: &[f32],
        kind: DenseKind,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        self.search(limit, filter, |chunk| {
            let vector = match kind {
                DenseKind::Text => Some(chunk.dense.as_slice()),
                DenseKind::Code => chunk.code.as_deref(),
            }?;
            Some(cosine_similarity(query, vector) as f64)
        })
    }

    async fn sparse_search(
        &self,
        query: &SparseVector,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        self.search(limit, filter, |chunk| {
            let score = chunk.sparse.as_ref()?.dot(query) as f64;
            (score > 0.0).then_some(score)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{chunk_id, file_id, Database};
    use crate::index::ast_chunker::ChunkType;
    use crate::models::{Scope, SymbolInfo};
    use chrono::Utc;

    fn record(dataset: &str, path: &str) -> FileRecord {
        FileRecord {
            id: file_id(dataset, path),
            dataset_id: dataset.into(),
            path: path.into(),
            locator: path.into(),
            hash: "h".into(),
            size: 1,
            language: Some("rust".into()),
            chunk_count: 1,
            complete: true,
            indexed_at: Utc::now(),
        }
    }

    fn chunk(record: &FileRecord, text: &str, dense: Vec<f32>, kind: ChunkType) -> IndexedChunk {
        IndexedChunk {
            id: chunk_id(&record.id, 0, text),
            file_id: record.id.clone(),
            dataset_id: record.dataset_id.clone(),
            path: record.path.clone(),
            index: 0,
            text: text.into(),
            start: 0,
            end: text.len(),
            overlap: 0,
            language: record.language.clone(),
            symbol: Some(SymbolInfo {
                name: None,
                kind,
                start_line: 1,
                end_line: 1,
            }),
            summary: None,
            dense,
            code: None,
            sparse: Some(SparseVector::from_pairs(vec![(1, 1.0)])),
        }
    }

    async fn exercise(store: &dyn IndexStore) {
        store
            .ensure_dataset(&Dataset::new("g", "shared", Scope::Global))
            .await
            .unwrap();
        store
            .ensure_dataset(&Dataset::new("l", "mine", Scope::Local))
            .await
            .unwrap();

        let a = record("g", "a.rs");
        let b = record("l", "b.rs");
        store
            .upsert_chunks(&a, &[chunk(&a, "alpha", vec![1.0, 0.0], ChunkType::Function)])
            .await
            .unwrap();
        store
            .upsert_chunks(&b, &[chunk(&b, "beta", vec![0.8, 0.2], ChunkType::Struct)])
            .await
            .unwrap();

        let all = store
            .dense_search(&[1.0, 0.0], DenseKind::Text, 10, &SearchFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].text, "alpha");
        assert_eq!(all[0].scope, Scope::Global);

        let local_only = SearchFilter {
            scopes: vec![Scope::Local],
            ..Default::default()
        };
        let hits = store
            .dense_search(&[1.0, 0.0], DenseKind::Text, 10, &local_only)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "beta");

        let structs = SearchFilter {
            symbol_kind: Some(ChunkType::Struct),
            ..Default::default()
        };
        let hits = store
            .sparse_search(&SparseVector::from_pairs(vec![(1, 1.0)]), 10, &structs)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "b.rs");

        // No code vectors stored
        let code = store
            .dense_search(&[1.0, 0.0], DenseKind::Code, 10, &SearchFilter::default())
            .await
            .unwrap();
        assert!(code.is_empty());

        assert_eq!(store.delete_chunks(&a.id).await.unwrap(), 1);
        assert!(store.get_file_record("g", "a.rs").await.unwrap().is_none());
        assert_eq!(store.list_file_records("l").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::new();
        exercise(&store).await;
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_store_contract() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        exercise(&db).await;
    }

    #[tokio::test]
    async fn test_upsert_requires_dataset() {
        let store = MemoryStore::new();
        let r = record("missing", "x.rs");
        let err = store.upsert_chunks(&r, &[]).await.unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound(_)));
    }
}

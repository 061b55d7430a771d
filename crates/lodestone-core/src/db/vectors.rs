//! Vector storage and similarity search
//!
//! Stores embeddings as BLOBs and computes cosine similarity in Rust.

use super::chunks::{row_to_chunk, CHUNK_COLUMNS};
use super::{rank_hits, Database, SearchFilter, SearchHit};
use crate::error::Result;
use crate::models::{Dataset, DenseKind, IndexedChunk, Scope, SparseVector};

impl Database {
    /// Brute-force dense search over chunks visible through `filter`
    pub fn search_dense(
        &self,
        query: &[f32],
        kind: DenseKind,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let hits = self
            .scan_chunks(filter)?
            .into_iter()
            .filter_map(|(dataset, chunk)| {
                let vector = match kind {
                    DenseKind::Text => Some(chunk.dense.as_slice()),
                    DenseKind::Code => chunk.code.as_deref(),
                }?;
                let score = cosine_similarity(query, vector) as f64;
                Some(SearchHit::from_chunk(&chunk, dataset.scope, score))
            })
            .collect();
        Ok(rank_hits(hits, limit))
    }

    /// Dot-product search over sparse vectors; chunks sharing no term are skipped
    pub fn search_sparse(
        &self,
        query: &SparseVector,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let hits = self
            .scan_chunks(filter)?
            .into_iter()
            .filter_map(|(dataset, chunk)| {
                let score = chunk.sparse.as_ref()?.dot(query) as f64;
                (score > 0.0).then(|| SearchHit::from_chunk(&chunk, dataset.scope, score))
            })
            .collect();
        Ok(rank_hits(hits, limit))
    }

    fn scan_chunks(&self, filter: &SearchFilter) -> Result<Vec<(Dataset, IndexedChunk)>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {}, d.name, d.scope FROM chunks c JOIN datasets d ON d.id = c.dataset_id",
            CHUNK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let chunk = row_to_chunk(row)?;
                let name: String = row.get(15)?;
                let scope: String = row.get(16)?;
                Ok((chunk, name, scope))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut visible = Vec::with_capacity(rows.len());
        for (chunk, name, scope) in rows {
            let dataset = Dataset::new(chunk.dataset_id.clone(), name, scope.parse::<Scope>()?);
            if filter.matches(&dataset, &chunk) {
                visible.push((dataset, chunk));
            }
        }
        Ok(visible)
    }
}

/// Convert f32 embedding to bytes
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

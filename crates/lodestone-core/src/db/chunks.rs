//! Chunk storage operations
//!
//! A file's chunk set is only ever replaced wholesale inside one
//! transaction, together with its record.

use super::files::write_record;
use super::vectors::{bytes_to_embedding, embedding_to_bytes};
use super::Database;
use crate::error::Result;
use crate::models::{FileRecord, IndexedChunk, SparseVector, SymbolInfo};
use rusqlite::{params, Row};

pub(crate) const CHUNK_COLUMNS: &str = "c.id, c.file_id, c.dataset_id, c.path, c.seq, c.text, \
     c.start_byte, c.end_byte, c.overlap, c.language, c.symbol, c.summary, c.dense, c.code, c.sparse";

impl Database {
    /// Replace all chunks of a file and upsert its record in one transaction.
    /// Returns the number of chunks removed.
    pub fn replace_file_chunks(&self, record: &FileRecord, chunks: &[IndexedChunk]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // The record must exist before chunks can reference it
        write_record(&tx, record)?;
        let removed = tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![record.id])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, file_id, dataset_id, path, seq, text, start_byte, end_byte,
                                     overlap, language, symbol, summary, dense, code, sparse)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for chunk in chunks {
                let symbol = chunk
                    .symbol
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                let sparse = chunk
                    .sparse
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    chunk.id,
                    record.id,
                    chunk.dataset_id,
                    chunk.path,
                    chunk.index as i64,
                    chunk.text,
                    chunk.start as i64,
                    chunk.end as i64,
                    chunk.overlap as i64,
                    chunk.language,
                    symbol,
                    chunk.summary,
                    embedding_to_bytes(&chunk.dense),
                    chunk.code.as_deref().map(embedding_to_bytes),
                    sparse,
                ])?;
            }
        }

        tx.commit()?;
        Ok(removed)
    }

    /// Delete a file record; chunks go with it through the cascade
    pub fn delete_file(&self, file_id: &str) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM file_records WHERE id = ?1", params![file_id])?;
        tx.commit()?;
        Ok(removed)
    }

    /// Chunks of a file in index order
    pub fn get_file_chunks(&self, file_id: &str) -> Result<Vec<IndexedChunk>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM chunks c WHERE c.file_id = ?1 ORDER BY c.seq",
            CHUNK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![file_id], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Decode a chunk row selected with [`CHUNK_COLUMNS`] (columns 0..=14)
pub(crate) fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<IndexedChunk> {
    let symbol: Option<String> = row.get(10)?;
    let dense: Vec<u8> = row.get(12)?;
    let code: Option<Vec<u8>> = row.get(13)?;
    let sparse: Option<String> = row.get(14)?;

    Ok(IndexedChunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        dataset_id: row.get(2)?,
        path: row.get(3)?,
        index: row.get::<_, i64>(4)? as usize,
        text: row.get(5)?,
        start: row.get::<_, i64>(6)? as usize,
        end: row.get::<_, i64>(7)? as usize,
        overlap: row.get::<_, i64>(8)? as usize,
        language: row.get(9)?,
        symbol: decode_json::<SymbolInfo>(symbol, 10)?,
        summary: row.get(11)?,
        dense: bytes_to_embedding(&dense),
        code: code.map(|b| bytes_to_embedding(&b)),
        sparse: decode_json::<SparseVector>(sparse, 14)?,
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(
    value: Option<String>,
    column: usize,
) -> rusqlite::Result<Option<T>> {
    value
        .map(|s| {
            serde_json::from_str(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    column,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })
        .transpose()
}

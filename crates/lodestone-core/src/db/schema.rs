//! Database schema and initialization

use super::{IndexStore, SearchFilter, SearchHit};
use crate::error::{Error, Result};
use crate::models::{Dataset, DenseKind, FileRecord, IndexedChunk, SparseVector};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed index store.
///
/// The connection sits behind a mutex so the handle can be shared between
/// the pipeline's concurrent file tasks and the retrieval engine.
pub struct Database {
    conn: Mutex<Connection>,
}

const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    scope TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_records (
    id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    locator TEXT NOT NULL,
    hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    language TEXT,
    chunk_count INTEGER NOT NULL DEFAULT 0,
    complete INTEGER NOT NULL DEFAULT 1,
    indexed_at TEXT NOT NULL,
    UNIQUE(dataset_id, path)
);

-- Chunks with their vectors; dense/code as little-endian f32 BLOBs,
-- sparse and symbol metadata as JSON
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL REFERENCES file_records(id) ON DELETE CASCADE,
    dataset_id TEXT NOT NULL,
    path TEXT NOT NULL,
    seq INTEGER NOT NULL,
    text TEXT NOT NULL,
    start_byte INTEGER NOT NULL,
    end_byte INTEGER NOT NULL,
    overlap INTEGER NOT NULL,
    language TEXT,
    symbol TEXT,
    summary TEXT,
    dense BLOB NOT NULL,
    code BLOB,
    sparse TEXT
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE INDEX IF NOT EXISTS idx_file_records_dataset ON file_records(dataset_id);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id);
CREATE INDEX IF NOT EXISTS idx_chunks_dataset ON chunks(dataset_id);
"#;

impl Database {
    /// Open database at path, creating if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(CREATE_TABLES)?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        let conn = self.lock()?;
        let version = conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        Ok(version)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other(anyhow::anyhow!("database connection lock poisoned")))
    }
}

#[async_trait]
impl IndexStore for Database {
    async fn ensure_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.insert_dataset(dataset)
    }

    async fn get_file_record(&self, dataset_id: &str, path: &str) -> Result<Option<FileRecord>> {
        self.find_file_record(dataset_id, path)
    }

    async fn list_file_records(&self, dataset_id: &str) -> Result<Vec<FileRecord>> {
        self.file_records(dataset_id)
    }

    async fn upsert_chunks(&self, record: &FileRecord, chunks: &[IndexedChunk]) -> Result<usize> {
        self.replace_file_chunks(record, chunks)
    }

    async fn delete_chunks(&self, file_id: &str) -> Result<usize> {
        self.delete_file(file_id)
    }

    async fn file_chunks(&self, file_id: &str) -> Result<Vec<IndexedChunk>> {
        self.get_file_chunks(file_id)
    }

    async fn dense_search(
        &self,
        query: &[f32],
        kind: DenseKind,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        self.search_dense(query, kind, limit, filter)
    }

    async fn sparse_search(
        &self,
        query: &SparseVector,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        self.search_sparse(query, limit, filter)
    }
}

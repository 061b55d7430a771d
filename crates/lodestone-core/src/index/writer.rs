//! Index writes
//!
//! Applies per-file changes to an [`IndexStore`]. Each write replaces a
//! file's whole chunk set in one store call, and writes to the same file
//! are serialized so two replaces can never interleave.

use crate::db::IndexStore;
use crate::error::{Error, Result};
use crate::models::{Dataset, FileRecord, IndexedChunk};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Serializing writer over a shared store
#[derive(Clone)]
pub struct IndexWriter {
    store: Arc<dyn IndexStore>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl IndexWriter {
    pub fn new(store: Arc<dyn IndexStore>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    pub async fn ensure_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.store.ensure_dataset(dataset).await
    }

    /// Insert or replace a file: its record and its complete chunk set.
    /// Returns the number of chunks removed. Failure leaves the previously
    /// committed state in place and is reported as `StorageWrite`.
    pub async fn write_file(&self, record: &FileRecord, chunks: &[IndexedChunk]) -> Result<usize> {
        let lock = self.file_lock(&record.id)?;
        let guard = lock.lock().await;
        let result = self.store.upsert_chunks(record, chunks).await;
        drop(guard);
        self.release_lock(&record.id, lock);

        let removed = result.map_err(|e| storage_error(&record.path, e))?;
        debug!(
            path = %record.path,
            added = chunks.len(),
            removed,
            complete = record.complete,
            "Replaced file chunks"
        );
        Ok(removed)
    }

    /// Delete a file record and all of its chunks
    pub async fn delete_file(&self, record: &FileRecord) -> Result<usize> {
        let lock = self.file_lock(&record.id)?;
        let guard = lock.lock().await;
        let result = self.store.delete_chunks(&record.id).await;
        drop(guard);
        self.release_lock(&record.id, lock);

        let removed = result.map_err(|e| storage_error(&record.path, e))?;
        debug!(path = %record.path, removed, "Deleted file");
        Ok(removed)
    }

    fn file_lock(&self, file_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| Error::Other(anyhow::anyhow!("file lock table poisoned: {}", e)))?;
        Ok(locks
            .entry(file_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// Drop the table entry once nobody else holds or waits on it
    fn release_lock(&self, file_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            // One reference in the table, one here
            if Arc::strong_count(&lock) == 2 {
                locks.remove(file_id);
            }
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

fn storage_error(path: &str, error: Error) -> Error {
    match error {
        Error::Cancelled(_) | Error::StorageWrite { .. } => error,
        other => Error::StorageWrite {
            path: path.to_string(),
            message: other.to_string(),
        },
    }
}

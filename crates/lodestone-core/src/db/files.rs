//! Dataset and file record operations

use super::Database;
use crate::error::Result;
use crate::models::{Dataset, FileRecord, Scope};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const RECORD_COLUMNS: &str =
    "id, dataset_id, path, locator, hash, size, language, chunk_count, complete, indexed_at";

impl Database {
    /// Insert a dataset unless it already exists
    pub fn insert_dataset(&self, dataset: &Dataset) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO datasets (id, name, scope, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                dataset.id,
                dataset.name,
                dataset.scope.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_dataset(&self, id: &str) -> Result<Option<Dataset>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, name, scope FROM datasets WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, name, scope)) => Ok(Some(Dataset::new(id, name, scope.parse::<Scope>()?))),
            None => Ok(None),
        }
    }

    pub fn find_file_record(&self, dataset_id: &str, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM file_records WHERE dataset_id = ?1 AND path = ?2",
            RECORD_COLUMNS
        );
        let record = conn
            .query_row(&sql, params![dataset_id, path], row_to_record)
            .optional()?;
        Ok(record)
    }

    pub fn file_records(&self, dataset_id: &str) -> Result<Vec<FileRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM file_records WHERE dataset_id = ?1 ORDER BY path",
            RECORD_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![dataset_id], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Insert or overwrite a file record on an open connection or transaction
pub(crate) fn write_record(conn: &Connection, record: &FileRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO file_records (id, dataset_id, path, locator, hash, size, language,
                                   chunk_count, complete, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
             locator = excluded.locator,
             hash = excluded.hash,
             size = excluded.size,
             language = excluded.language,
             chunk_count = excluded.chunk_count,
             complete = excluded.complete,
             indexed_at = excluded.indexed_at",
        params![
            record.id,
            record.dataset_id,
            record.path,
            record.locator,
            record.hash,
            record.size as i64,
            record.language,
            record.chunk_count as i64,
            record.complete,
            record.indexed_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let indexed_at: String = row.get(9)?;
    let indexed_at = DateTime::parse_from_rfc3339(&indexed_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(FileRecord {
        id: row.get(0)?,
        dataset_id: row.get(1)?,
        path: row.get(2)?,
        locator: row.get(3)?,
        hash: row.get(4)?,
        size: row.get::<_, i64>(5)? as u64,
        language: row.get(6)?,
        chunk_count: row.get::<_, i64>(7)? as usize,
        complete: row.get(8)?,
        indexed_at,
    })
}

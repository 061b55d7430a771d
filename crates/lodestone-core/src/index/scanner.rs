//! Change detection for incremental sync
//!
//! Compares what a content source currently holds against the file records
//! stored for a dataset. Classification is purely by path and SHA-256 of the
//! content: a renamed file shows up as one deletion plus one creation.

use crate::db::hash_content;
use crate::error::{Error, Result};
use crate::jobs::CancellationToken;
use crate::models::FileRecord;
use crate::providers::SourceEntry;
use futures::{Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// How a path changed since the last sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Unchanged,
    Deleted,
}

/// A created or modified file whose content must be (re)indexed
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub path: String,
    pub locator: String,
    pub content: Vec<u8>,
    pub hash: String,
    pub kind: ChangeKind,
    /// Stored record being replaced, for modified files
    pub previous: Option<FileRecord>,
}

/// A file that could not be read or hashed; excluded from the run
#[derive(Debug)]
pub struct ScanError {
    pub path: String,
    pub error: Error,
}

/// Result of diffing a source against stored records.
///
/// `created`, `modified`, `unchanged` and `deleted` are disjoint by path.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub created: Vec<PendingFile>,
    pub modified: Vec<PendingFile>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<FileRecord>,
    pub errors: Vec<ScanError>,
    /// Distinct paths considered: every enumerated path plus every deleted one
    pub files_scanned: usize,
}

impl ChangeSet {
    /// Files that need chunking, embedding and writing
    pub fn pending(&self) -> impl Iterator<Item = &PendingFile> {
        self.created.iter().chain(self.modified.iter())
    }

    pub fn into_pending(self) -> (Vec<PendingFile>, Vec<FileRecord>, Vec<ScanError>) {
        let mut pending = self.created;
        pending.extend(self.modified);
        (pending, self.deleted, self.errors)
    }

    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }
}

/// Diffs enumerated content against stored file records
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    force: bool,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify every present path as modified regardless of its hash
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn classify(&self, hash: &str, stored: Option<&FileRecord>) -> ChangeKind {
        match stored {
            None => ChangeKind::Created,
            Some(_) if self.force => ChangeKind::Modified,
            Some(record) if record.hash != hash || !record.complete => ChangeKind::Modified,
            Some(_) => ChangeKind::Unchanged,
        }
    }

    /// Consume `entries` and diff them against `stored`.
    ///
    /// An `Err` item from the stream aborts with `SourceUnavailable`. An
    /// entry whose bytes could not be read is recorded in
    /// [`ChangeSet::errors`] and otherwise ignored; in particular its stored
    /// record is neither kept as unchanged nor deleted.
    pub async fn detect<S>(
        &self,
        entries: S,
        stored: Vec<FileRecord>,
        cancel: &CancellationToken,
    ) -> Result<ChangeSet>
    where
        S: Stream<Item = Result<SourceEntry>>,
    {
        let mut stored: HashMap<String, FileRecord> =
            stored.into_iter().map(|r| (r.path.clone(), r)).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut changes = ChangeSet::default();

        futures::pin_mut!(entries);
        while let Some(entry) = entries.next().await {
            cancel.check()?;

            let entry = entry.map_err(|e| match e {
                Error::SourceUnavailable(msg) => Error::SourceUnavailable(msg),
                other => Error::SourceUnavailable(other.to_string()),
            })?;

            if !seen.insert(entry.path.clone()) {
                debug!(path = %entry.path, "Duplicate path in enumeration, ignoring");
                continue;
            }

            let previous = stored.remove(&entry.path);
            let content = match entry.bytes {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(path = %entry.path, error = %error, "Failed to read file");
                    changes.errors.push(ScanError {
                        path: entry.path,
                        error,
                    });
                    continue;
                }
            };

            let hash = hash_content(&content);
            match self.classify(&hash, previous.as_ref()) {
                ChangeKind::Unchanged => changes.unchanged.push(entry.path),
                kind => {
                    let file = PendingFile {
                        path: entry.path,
                        locator: entry.locator,
                        content,
                        hash,
                        kind,
                        previous,
                    };
                    if kind == ChangeKind::Created {
                        changes.created.push(file);
                    } else {
                        changes.modified.push(file);
                    }
                }
            }
        }

        let mut deleted: Vec<FileRecord> = stored.into_values().collect();
        deleted.sort_by(|a, b| a.path.cmp(&b.path));
        changes.deleted = deleted;
        changes.files_scanned = seen.len() + changes.deleted.len();

        debug!(
            scanned = changes.files_scanned,
            created = changes.created.len(),
            modified = changes.modified.len(),
            unchanged = changes.unchanged.len(),
            deleted = changes.deleted.len(),
            "Change detection complete"
        );

        Ok(changes)
    }
}

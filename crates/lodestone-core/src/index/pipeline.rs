//! Ingestion run
//!
//! One pass of change detection, chunking, embedding and writing for a
//! dataset. Per-file and per-batch failures are collected into the run's
//! stats; only enumeration failure, cancellation or a total embedding
//! outage end the run early.

use super::ast_chunker::{is_code_language, language_tag};
use super::scanner::{ChangeDetector, ChangeKind, PendingFile};
use crate::context::IndexContext;
use crate::db::{chunk_id, file_id};
use crate::error::{Error, Result};
use crate::jobs::{
    scaled, CancellationToken, JobError, JobStats, Phase, ProgressReporter, SyncOptions,
};
use crate::models::{Dataset, FileRecord, IndexedChunk};
use crate::providers::ContentSource;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A run that ended early, with the counters gathered up to that point
#[derive(Debug)]
pub struct SyncFailure {
    pub error: Error,
    pub stats: JobStats,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for SyncFailure {}

/// What happened to one created or modified file
struct FileOutcome {
    path: String,
    kind: ChangeKind,
    written: bool,
    added: usize,
    removed: usize,
    failed: usize,
    errors: Vec<JobError>,
}

/// Sync `source` into `dataset`.
///
/// Unchanged files cause no writes. Files are chunked, embedded and written
/// concurrently up to `jobs.max_concurrent_files`; each file's write is a
/// single atomic replace. Deleted paths are removed last.
pub async fn run_sync(
    ctx: &IndexContext,
    dataset: &Dataset,
    source: &dyn ContentSource,
    options: &SyncOptions,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
) -> std::result::Result<JobStats, SyncFailure> {
    let started = Instant::now();
    let mut stats = JobStats::default();

    info!(
        dataset = %dataset.id,
        source = source.source_type(),
        force = options.force,
        "Starting sync"
    );

    let result = sync_inner(ctx, dataset, source, options, reporter, cancel, &mut stats).await;
    stats.duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(()) => {
            info!(
                dataset = %dataset.id,
                scanned = stats.files_scanned,
                created = stats.files_created,
                modified = stats.files_modified,
                deleted = stats.files_deleted,
                unchanged = stats.files_unchanged,
                chunks_added = stats.chunks_added,
                chunks_failed = stats.chunks_failed,
                errors = stats.errors.len(),
                duration_ms = stats.duration_ms,
                "Sync complete"
            );
            Ok(stats)
        }
        Err(error) => {
            warn!(dataset = %dataset.id, error = %error, "Sync aborted");
            Err(SyncFailure { error, stats })
        }
    }
}

async fn sync_inner(
    ctx: &IndexContext,
    dataset: &Dataset,
    source: &dyn ContentSource,
    options: &SyncOptions,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
    stats: &mut JobStats,
) -> Result<()> {
    reporter.report(Phase::Scanning, 0, None);

    cancel.check()?;
    ctx.writer().ensure_dataset(dataset).await?;
    cancel.check()?;
    let stored = ctx.store().list_file_records(&dataset.id).await?;

    let changes = ChangeDetector::new()
        .force(options.force)
        .detect(source.enumerate(), stored, cancel)
        .await?;

    stats.files_scanned = changes.files_scanned;
    stats.files_unchanged = changes.unchanged.len();
    let (pending, deleted, scan_errors) = changes.into_pending();
    stats
        .errors
        .extend(scan_errors.iter().map(|e| JobError::new(&e.path, None, &e.error)));

    reporter.report(Phase::Scanning, 10, None);

    let total = pending.len();
    let concurrency = ctx.config().jobs.max_concurrent_files.max(1);
    let mut outcomes = stream::iter(pending)
        .map(|file| index_file(ctx, dataset, file, cancel))
        .buffer_unordered(concurrency);

    let mut done = 0;
    while let Some(outcome) = outcomes.next().await {
        let outcome = outcome?;
        done += 1;

        if outcome.written {
            match outcome.kind {
                ChangeKind::Created => stats.files_created += 1,
                _ => stats.files_modified += 1,
            }
            stats.chunks_added += outcome.added;
            stats.chunks_removed += outcome.removed;
        }
        stats.chunks_failed += outcome.failed;
        stats.errors.extend(outcome.errors);

        reporter.report(
            Phase::Indexing,
            scaled(10, 95, done, total),
            Some(&outcome.path),
        );
    }
    drop(outcomes);

    if stats.chunks_added == 0 && stats.chunks_failed > 0 {
        return Err(Error::EmbeddingProvider(format!(
            "all {} chunks failed to embed",
            stats.chunks_failed
        )));
    }

    let total = deleted.len();
    reporter.report(Phase::Removing, 95, None);
    for (i, record) in deleted.iter().enumerate() {
        cancel.check()?;
        match ctx.writer().delete_file(record).await {
            Ok(removed) => {
                stats.files_deleted += 1;
                stats.chunks_removed += removed;
            }
            Err(Error::Cancelled(reason)) => return Err(Error::Cancelled(reason)),
            Err(e) => {
                warn!(path = %record.path, error = %e, "Failed to delete file");
                stats.errors.push(JobError::new(&record.path, None, &e));
            }
        }
        reporter.report(
            Phase::Removing,
            scaled(95, 99, i + 1, total),
            Some(&record.path),
        );
    }

    Ok(())
}

async fn index_file(
    ctx: &IndexContext,
    dataset: &Dataset,
    file: PendingFile,
    cancel: &CancellationToken,
) -> Result<FileOutcome> {
    cancel.check()?;

    let text = String::from_utf8_lossy(&file.content);
    let language = language_tag(Path::new(&file.path));
    let descriptors = ctx.chunker().chunk(&text, language);
    let code = language.is_some_and(is_code_language);

    let texts: Vec<String> = descriptors.iter().map(|d| d.text.clone()).collect();
    let embedded = ctx.orchestrator().embed(&texts, code, cancel).await?;

    let mut errors: Vec<JobError> = Vec::new();
    for failure in &embedded.failures {
        for i in failure.range.clone() {
            errors.push(JobError::new(&file.path, Some(i), &failure.error));
        }
    }
    let failed = embedded.failed_count();

    let id = file_id(&dataset.id, &file.path);
    let chunks: Vec<IndexedChunk> = descriptors
        .into_iter()
        .zip(embedded.vectors)
        .filter_map(|(chunk, vectors)| {
            let vectors = vectors?;
            Some(IndexedChunk {
                id: chunk_id(&id, chunk.index, &chunk.text),
                file_id: id.clone(),
                dataset_id: dataset.id.clone(),
                path: file.path.clone(),
                index: chunk.index,
                text: chunk.text,
                start: chunk.start,
                end: chunk.end,
                overlap: chunk.overlap,
                language: language.map(str::to_string),
                symbol: chunk.symbol,
                summary: None,
                dense: vectors.dense,
                code: vectors.code,
                sparse: vectors.sparse,
            })
        })
        .collect();

    let record = FileRecord {
        id,
        dataset_id: dataset.id.clone(),
        path: file.path.clone(),
        locator: file.locator,
        hash: file.hash,
        size: file.content.len() as u64,
        language: language.map(str::to_string),
        chunk_count: chunks.len(),
        complete: failed == 0,
        indexed_at: Utc::now(),
    };

    // Nothing embedded: keep whatever was last committed for this path so a
    // provider outage never replaces good chunks with an empty set
    if chunks.is_empty() && failed > 0 {
        warn!(
            path = %file.path,
            failed,
            "No chunks embedded, keeping previous index state"
        );
        return Ok(FileOutcome {
            path: file.path,
            kind: file.kind,
            written: false,
            added: 0,
            removed: 0,
            failed,
            errors,
        });
    }

    cancel.check()?;
    let (written, removed) = match ctx.writer().write_file(&record, &chunks).await {
        Ok(removed) => (true, removed),
        Err(Error::Cancelled(reason)) => return Err(Error::Cancelled(reason)),
        Err(e) => {
            warn!(path = %file.path, error = %e, "Failed to write file, will retry on next sync");
            errors.push(JobError::new(&file.path, None, &e));
            (false, 0)
        }
    };

    debug!(
        path = %file.path,
        kind = ?file.kind,
        chunks = chunks.len(),
        failed,
        "Indexed file"
    );

    Ok(FileOutcome {
        path: file.path,
        kind: file.kind,
        written,
        added: if written { chunks.len() } else { 0 },
        removed,
        failed,
        errors,
    })
}

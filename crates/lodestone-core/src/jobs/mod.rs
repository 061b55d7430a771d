//! Ingestion jobs
//!
//! A job is one ingestion run for a [`Fingerprint`]. The
//! [`JobCoordinator`] guarantees at most one active job per fingerprint,
//! returns cached results for completed fingerprints, publishes progress
//! through a [`ProgressSink`], and releases acquired sources on every exit
//! path.

mod coordinator;
mod progress;

pub use coordinator::{JobCoordinator, JobHandle, SubmitOutcome};
pub use progress::{
    BroadcastSink, NullSink, Phase, ProgressEvent, ProgressReporter, ProgressSink, TracingSink,
};
pub(crate) use progress::scaled;

use crate::error::{Error, Result};
use crate::models::{Dataset, Scope};
use crate::providers::{SourceDescriptor, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Identity of an ingestion job: what is ingested, into which scope, at which ref
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub scope: Scope,
    pub kind: SourceKind,
    pub resource: String,
    pub git_ref: Option<String>,
}

impl Fingerprint {
    pub fn new(scope: Scope, source: &SourceDescriptor, git_ref: Option<String>) -> Self {
        Self {
            scope,
            kind: source.kind,
            resource: source.resource.clone(),
            git_ref,
        }
    }

    /// Canonical string form, stable across runs
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.scope,
            self.kind,
            self.resource,
            self.git_ref.as_deref().unwrap_or("")
        )
    }

    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::new(self.kind, self.resource.clone())
    }

    /// The dataset this fingerprint's files are indexed into
    pub fn dataset(&self) -> Dataset {
        Dataset::for_fingerprint(self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Options for one sync submission
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Re-index every file regardless of hash, and bypass the completed-job cache
    pub force: bool,
    /// Bypass the completed-job cache but keep incremental change detection
    pub refresh: bool,
    /// Branch, tag or commit for sources that support refs
    pub git_ref: Option<String>,
}

impl SyncOptions {
    pub fn force() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }

    pub fn refresh() -> Self {
        Self {
            refresh: true,
            ..Default::default()
        }
    }
}

/// Job lifecycle state; `Completed` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-file or per-chunk failure that did not fail the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Error category, e.g. `embedding_provider`, `storage_write`
    pub kind: String,
    pub message: String,
}

impl JobError {
    pub fn new(path: impl Into<String>, chunk_index: Option<usize>, error: &Error) -> Self {
        Self {
            path: path.into(),
            chunk_index,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub files_scanned: usize,
    pub files_created: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub files_unchanged: usize,
    pub chunks_added: usize,
    pub chunks_removed: usize,
    pub chunks_failed: usize,
    pub duration_ms: u64,
    pub errors: Vec<JobError>,
}

/// Final payload of a job, successful or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub stats: JobStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cooperative cancellation flag shared between a job and its handle
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not missed
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled("cancellation requested".to_string()))
        } else {
            Ok(())
        }
    }
}

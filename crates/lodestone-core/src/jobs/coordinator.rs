//! Job coordination
//!
//! Jobs are keyed by [`Fingerprint`]. Submitting a fingerprint that already
//! has a queued or running job returns that job; submitting one whose last
//! job completed returns the cached result unless the caller asks for a
//! refresh or a forced re-scan.

use super::{
    CancellationToken, Fingerprint, JobResult, JobStats, JobStatus, ProgressEvent,
    ProgressReporter, ProgressSink, SyncOptions,
};
use crate::context::IndexContext;
use crate::error::{Error, Result};
use crate::index::{run_sync, SyncFailure};
use crate::models::Scope;
use crate::providers::SourceDescriptor;
use crate::search::{QueryRequest, QueryResult, RetrievalEngine, SmartQueryResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct JobState {
    status: JobStatus,
    result: Option<JobResult>,
}

struct JobEntry {
    id: String,
    fingerprint: Fingerprint,
    state: watch::Sender<JobState>,
    reporter: ProgressReporter,
    cancel: CancellationToken,
}

/// Shared view of one job
#[derive(Clone)]
pub struct JobHandle {
    entry: Arc<JobEntry>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.entry.fingerprint
    }

    pub fn status(&self) -> JobStatus {
        self.entry.state.borrow().status
    }

    /// Latest progress snapshot, published or not
    pub fn progress(&self) -> ProgressEvent {
        self.entry.reporter.latest()
    }

    /// Final result once the job is terminal
    pub fn result(&self) -> Option<JobResult> {
        self.entry.state.borrow().result.clone()
    }

    /// Wait for the job to reach a terminal state
    pub async fn wait(&self) -> JobResult {
        let mut rx = self.entry.state.subscribe();
        if let Ok(state) = rx.wait_for(|s| s.status.is_terminal()).await {
            if let Some(result) = &state.result {
                return result.clone();
            }
        }
        // The sender lives in the entry we hold, so this is unreachable in
        // practice; report whatever state is current.
        let state = self.entry.state.borrow();
        JobResult {
            job_id: self.entry.id.clone(),
            status: state.status,
            stats: JobStats::default(),
            error: Some("job state unavailable".to_string()),
        }
    }

    /// Request cancellation. A queued job fails before it starts; a running
    /// job stops issuing provider and storage calls and fails.
    pub fn cancel(&self) {
        info!(job_id = %self.entry.id, "Cancellation requested");
        self.entry.cancel.cancel();
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.entry.id)
            .field("fingerprint", &self.entry.fingerprint.key())
            .field("status", &self.status())
            .finish()
    }
}

/// How a submission was satisfied
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// A new job was created
    Started(JobHandle),
    /// A job for the fingerprint was already queued or running
    Existing(JobHandle),
    /// The fingerprint's last job completed; its result is reused
    Cached(JobHandle),
}

impl SubmitOutcome {
    pub fn handle(&self) -> &JobHandle {
        match self {
            Self::Started(h) | Self::Existing(h) | Self::Cached(h) => h,
        }
    }

    pub fn into_handle(self) -> JobHandle {
        match self {
            Self::Started(h) | Self::Existing(h) | Self::Cached(h) => h,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Runs ingestion jobs on a bounded worker pool and serves queries
pub struct JobCoordinator {
    ctx: Arc<IndexContext>,
    sink: Arc<dyn ProgressSink>,
    workers: Arc<Semaphore>,
    jobs: Mutex<HashMap<Fingerprint, JobHandle>>,
    engine: RetrievalEngine,
}

impl JobCoordinator {
    pub fn new(ctx: Arc<IndexContext>, sink: Arc<dyn ProgressSink>) -> Self {
        let workers = ctx.config().jobs.workers.max(1);
        let engine = ctx.retrieval();
        Self {
            ctx,
            sink,
            workers: Arc::new(Semaphore::new(workers)),
            jobs: Mutex::new(HashMap::new()),
            engine,
        }
    }

    pub fn context(&self) -> &Arc<IndexContext> {
        &self.ctx
    }

    /// Submit an ingestion of `source` into `scope`.
    ///
    /// Must be called from within a tokio runtime; the job runs on a
    /// spawned task.
    pub fn submit_sync(
        &self,
        scope: Scope,
        source: SourceDescriptor,
        options: SyncOptions,
    ) -> SubmitOutcome {
        let fingerprint = Fingerprint::new(scope, &source, options.git_ref.clone());
        let mut jobs = self.lock_jobs();

        if let Some(existing) = jobs.get(&fingerprint) {
            match existing.status() {
                JobStatus::Queued | JobStatus::Running => {
                    debug!(job_id = existing.id(), fingerprint = %fingerprint, "Job already active");
                    return SubmitOutcome::Existing(existing.clone());
                }
                JobStatus::Completed if !options.force && !options.refresh => {
                    debug!(job_id = existing.id(), fingerprint = %fingerprint, "Returning cached result");
                    return SubmitOutcome::Cached(existing.clone());
                }
                _ => {}
            }
        }

        let id = Uuid::new_v4().to_string();
        let interval = Duration::from_millis(self.ctx.config().jobs.progress_interval_ms);
        let (state, _) = watch::channel(JobState {
            status: JobStatus::Queued,
            result: None,
        });
        let handle = JobHandle {
            entry: Arc::new(JobEntry {
                id: id.clone(),
                fingerprint: fingerprint.clone(),
                state,
                reporter: ProgressReporter::new(id.clone(), self.sink.clone(), interval),
                cancel: CancellationToken::new(),
            }),
        };
        jobs.insert(fingerprint.clone(), handle.clone());
        drop(jobs);

        info!(job_id = %id, fingerprint = %fingerprint, force = options.force, "Job queued");
        tokio::spawn(run_job(
            self.ctx.clone(),
            self.workers.clone(),
            handle.entry.clone(),
            options,
        ));

        SubmitOutcome::Started(handle)
    }

    /// The latest job for a fingerprint, in any state
    pub fn job(&self, fingerprint: &Fingerprint) -> Option<JobHandle> {
        self.lock_jobs().get(fingerprint).cloned()
    }

    /// Jobs that are queued or running
    pub fn active_jobs(&self) -> Vec<JobHandle> {
        self.lock_jobs()
            .values()
            .filter(|h| !h.status().is_terminal())
            .cloned()
            .collect()
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<QueryResult>> {
        self.engine.query(request).await
    }

    pub async fn smart_query(
        &self,
        request: &QueryRequest,
        synthesize: bool,
    ) -> Result<SmartQueryResult> {
        self.engine.smart_query(request, synthesize).await
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<Fingerprint, JobHandle>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn run_job(
    ctx: Arc<IndexContext>,
    workers: Arc<Semaphore>,
    entry: Arc<JobEntry>,
    options: SyncOptions,
) {
    // A queued job cancelled while every worker is busy fails without
    // waiting for a permit
    let acquired = tokio::select! {
        biased;
        _ = entry.cancel.cancelled() => {
            info!(job_id = %entry.id, "Queued job cancelled");
            finish(
                &entry,
                Err(SyncFailure {
                    error: Error::Cancelled("cancelled while queued".to_string()),
                    stats: JobStats::default(),
                }),
            );
            return;
        }
        acquired = workers.acquire_owned() => acquired,
    };

    let outcome = match acquired {
        Ok(permit) => {
            let outcome = match entry.cancel.check() {
                Ok(()) => {
                    entry.state.send_modify(|s| s.status = JobStatus::Running);
                    entry.reporter.running();
                    info!(job_id = %entry.id, fingerprint = %entry.fingerprint, "Job running");

                    // A panic inside the run surfaces as a JoinError here
                    // rather than leaving the job running forever
                    match tokio::spawn(execute(ctx, entry.clone(), options)).await {
                        Ok(outcome) => outcome,
                        Err(e) => Err(SyncFailure {
                            error: Error::Other(anyhow::anyhow!("job task failed: {}", e)),
                            stats: JobStats::default(),
                        }),
                    }
                }
                Err(error) => Err(SyncFailure {
                    error,
                    stats: JobStats::default(),
                }),
            };
            drop(permit);
            outcome
        }
        Err(e) => Err(SyncFailure {
            error: Error::Other(anyhow::anyhow!("worker pool closed: {}", e)),
            stats: JobStats::default(),
        }),
    };

    finish(&entry, outcome);
}

/// Acquire the source, run the sync, release the source. The checkout is
/// dropped on every path out of this function, unwinding included.
async fn execute(
    ctx: Arc<IndexContext>,
    entry: Arc<JobEntry>,
    options: SyncOptions,
) -> std::result::Result<JobStats, SyncFailure> {
    let fingerprint = &entry.fingerprint;
    let checkout = ctx
        .resolvers()
        .acquire(&fingerprint.descriptor(), fingerprint.git_ref.as_deref())
        .await
        .map_err(|error| SyncFailure {
            error,
            stats: JobStats::default(),
        })?;

    let dataset = fingerprint.dataset();
    run_sync(
        &ctx,
        &dataset,
        checkout.source().as_ref(),
        &options,
        &entry.reporter,
        &entry.cancel,
    )
    .await
}

fn finish(entry: &JobEntry, outcome: std::result::Result<JobStats, SyncFailure>) {
    let result = match outcome {
        Ok(stats) => {
            entry.reporter.completed();
            info!(
                job_id = %entry.id,
                files_scanned = stats.files_scanned,
                errors = stats.errors.len(),
                duration_ms = stats.duration_ms,
                "Job completed"
            );
            JobResult {
                job_id: entry.id.clone(),
                status: JobStatus::Completed,
                stats,
                error: None,
            }
        }
        Err(SyncFailure { error, stats }) => {
            let message = error.to_string();
            entry.reporter.failed(&message);
            match error {
                Error::Cancelled(_) => warn!(job_id = %entry.id, "Job cancelled"),
                _ => error!(job_id = %entry.id, error = %message, "Job failed"),
            }
            JobResult {
                job_id: entry.id.clone(),
                status: JobStatus::Failed,
                stats,
                error: Some(message),
            }
        }
    };

    entry.state.send_replace(JobState {
        status: result.status,
        result: Some(result),
    });
}

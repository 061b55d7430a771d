//! Job progress reporting
//!
//! A [`ProgressReporter`] sits between a running job and a
//! [`ProgressSink`]. It clamps percentages so they never regress within a
//! job and drops intermediate updates arriving faster than the configured
//! interval. Phase changes and terminal events are always published.

use super::JobStatus;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Coarse stage of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Queued,
    Scanning,
    Indexing,
    Removing,
    Completed,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Scanning => "scanning",
            Self::Indexing => "indexing",
            Self::Removing => "removing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    /// 0-100, never decreasing within one job
    pub percentage: u8,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receives progress events. Delivery is best-effort: implementations may
/// drop events but must not block the job.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: &ProgressEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _event: &ProgressEvent) {}
}

/// Logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn publish(&self, event: &ProgressEvent) {
        if event.phase.is_terminal() {
            info!(
                job_id = %event.job_id,
                status = %event.status,
                error = event.error.as_deref().unwrap_or(""),
                "Job finished"
            );
        } else {
            debug!(
                job_id = %event.job_id,
                phase = event.phase.as_str(),
                percentage = event.percentage,
                item = event.current_item.as_deref().unwrap_or(""),
                "Job progress"
            );
        }
    }
}

/// Fans events out to any number of subscribers over a tokio broadcast
/// channel. Slow subscribers lag and lose events; the job never waits.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressSink for BroadcastSink {
    fn publish(&self, event: &ProgressEvent) {
        // No receivers is not an error
        let _ = self.tx.send(event.clone());
    }
}

struct ReporterState {
    latest: ProgressEvent,
    last_emit: Option<Instant>,
}

/// Rate-limited, monotonic progress publisher for one job
pub struct ProgressReporter {
    sink: std::sync::Arc<dyn ProgressSink>,
    min_interval: Duration,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    pub fn new(
        job_id: impl Into<String>,
        sink: std::sync::Arc<dyn ProgressSink>,
        min_interval: Duration,
    ) -> Self {
        Self {
            sink,
            min_interval,
            state: Mutex::new(ReporterState {
                latest: ProgressEvent {
                    job_id: job_id.into(),
                    status: JobStatus::Queued,
                    percentage: 0,
                    phase: Phase::Queued,
                    current_item: None,
                    error: None,
                },
                last_emit: None,
            }),
        }
    }

    /// Reporter that publishes nowhere, for runs outside a coordinator
    pub fn detached() -> Self {
        Self::new("detached", std::sync::Arc::new(NullSink), Duration::ZERO)
    }

    /// Most recent state, whether or not it was published
    pub fn latest(&self) -> ProgressEvent {
        match self.state.lock() {
            Ok(state) => state.latest.clone(),
            Err(poisoned) => poisoned.into_inner().latest.clone(),
        }
    }

    /// Record progress within the running job
    pub fn report(&self, phase: Phase, percentage: u8, current_item: Option<&str>) {
        self.update(JobStatus::Running, phase, percentage, current_item, None);
    }

    pub fn running(&self) {
        self.update(JobStatus::Running, Phase::Scanning, 0, None, None);
    }

    pub fn completed(&self) {
        self.update(JobStatus::Completed, Phase::Completed, 100, None, None);
    }

    /// Terminal failure; the percentage stays where it was
    pub fn failed(&self, error: &str) {
        self.update(JobStatus::Failed, Phase::Failed, 0, None, Some(error));
    }

    fn update(
        &self,
        status: JobStatus,
        phase: Phase,
        percentage: u8,
        current_item: Option<&str>,
        error: Option<&str>,
    ) {
        let event = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Nothing moves a job out of a terminal state
            if state.latest.status.is_terminal() {
                return;
            }

            let phase_changed = state.latest.phase != phase;
            state.latest.status = status;
            state.latest.phase = phase;
            state.latest.percentage = state.latest.percentage.max(percentage.min(100));
            state.latest.current_item = current_item.map(str::to_string);
            state.latest.error = error.map(str::to_string);

            let now = Instant::now();
            let due = state
                .last_emit
                .map_or(true, |last| now.duration_since(last) >= self.min_interval);
            if !(phase_changed || status.is_terminal() || due) {
                return;
            }
            state.last_emit = Some(now);
            state.latest.clone()
        };

        self.sink.publish(&event);
    }
}

/// Percentage for `done` of `total` items mapped onto `[from, to]`
pub(crate) fn scaled(from: u8, to: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return to;
    }
    let span = (to - from) as usize;
    from + (span * done.min(total) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Collect(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Collect {
        fn publish(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_percentage_never_regresses() {
        let sink = Arc::new(Collect::default());
        let reporter = ProgressReporter::new("job", sink.clone(), Duration::ZERO);
        reporter.running();
        reporter.report(Phase::Indexing, 40, Some("a.rs"));
        reporter.report(Phase::Indexing, 20, Some("b.rs"));
        reporter.report(Phase::Removing, 96, None);
        reporter.completed();

        let events = sink.0.lock().unwrap();
        let pcts: Vec<u8> = events.iter().map(|e| e.percentage).collect();
        assert_eq!(pcts, vec![0, 40, 40, 96, 100]);
        assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(events.last().unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_rate_limit_keeps_phase_changes_and_terminal() {
        let sink = Arc::new(Collect::default());
        let reporter = ProgressReporter::new("job", sink.clone(), Duration::from_secs(3600));
        reporter.running();
        for i in 10..50 {
            reporter.report(Phase::Indexing, i, None);
        }
        reporter.report(Phase::Removing, 95, None);
        reporter.failed("boom");

        let events = sink.0.lock().unwrap();
        let phases: Vec<Phase> = events.iter().map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![Phase::Scanning, Phase::Indexing, Phase::Removing, Phase::Failed]
        );
        assert_eq!(events[3].error.as_deref(), Some("boom"));
        assert_eq!(events[3].percentage, 95);
        // Dropped updates still move the latest snapshot
        assert_eq!(reporter.latest().phase, Phase::Failed);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let reporter = ProgressReporter::detached();
        reporter.completed();
        reporter.report(Phase::Indexing, 50, None);
        reporter.failed("late");
        let latest = reporter.latest();
        assert_eq!(latest.status, JobStatus::Completed);
        assert_eq!(latest.percentage, 100);
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let reporter = ProgressReporter::new("job-1", Arc::new(sink.clone()), Duration::ZERO);
        reporter.running();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, "job-1");
        assert_eq!(event.status, JobStatus::Running);
    }

    #[test]
    fn test_scaled() {
        assert_eq!(scaled(10, 95, 0, 4), 10);
        assert_eq!(scaled(10, 95, 2, 4), 52);
        assert_eq!(scaled(10, 95, 4, 4), 95);
        assert_eq!(scaled(10, 95, 0, 0), 95);
    }
}

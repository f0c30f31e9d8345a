//! Run state shared between the engine, the orchestrator and observers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::models::Job;

/// Lifecycle of one job (or of a whole batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Searching,
    Deleting,
    Completed,
    Aborted,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Aborted | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Searching => "searching",
            Phase::Deleting => "deleting",
            Phase::Completed => "completed",
            Phase::Aborted => "aborted",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Running counts for a job or a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Search hits received.
    pub searched: u64,
    pub deleted: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.searched += other.searched;
        self.deleted += other.deleted;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    pub fn combined(&self, other: &Stats) -> Stats {
        let mut total = *self;
        total.merge(other);
        total
    }

    /// Messages that reached a final outcome.
    pub fn processed(&self) -> u64 {
        self.deleted + self.failed + self.skipped
    }
}

/// Snapshot of a job in progress, or of a batch when `job` is `None`.
#[derive(Debug, Clone)]
pub struct RunState {
    pub job: Option<Job>,
    pub phase: Phase,
    /// Search offset for the next page.
    pub offset: u64,
    /// Candidates reported by the search endpoint; refreshed on every page.
    pub grand_total: u64,
    pub stats: Stats,
    /// Zero-based position in the batch and batch length.
    pub job_index: usize,
    pub job_count: usize,
    pub started_at: DateTime<Utc>,
    pub failure: Option<Arc<Error>>,
}

impl RunState {
    pub fn for_job(job: Job) -> Self {
        Self {
            job: Some(job),
            ..Self::for_batch(1)
        }
    }

    pub fn for_batch(job_count: usize) -> Self {
        Self {
            job: None,
            phase: Phase::Idle,
            offset: 0,
            grand_total: 0,
            stats: Stats::default(),
            job_index: 0,
            job_count,
            started_at: Utc::now(),
            failure: None,
        }
    }

    /// Share of the reported total that has been deleted or failed.
    pub fn progress_percent(&self) -> f64 {
        if self.grand_total == 0 {
            return 0.0;
        }
        let done = (self.stats.deleted + self.stats.failed) as f64;
        (done / self.grand_total as f64 * 100.0).min(100.0)
    }

    pub fn failed_on_auth(&self) -> bool {
        self.failure.as_ref().is_some_and(|e| e.is_auth())
    }

    pub(crate) fn fail(&mut self, error: Error) {
        self.phase = Phase::Failed;
        self.failure = Some(Arc::new(error));
    }
}

/// Cloneable abort flag. [`StopHandle::stop`] may be called from any thread
/// or signal task, any number of times.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

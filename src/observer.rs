//! Progress hooks.
//!
//! The engine pushes read-only snapshots through a [`RunObserver`]. Hooks
//! run inline on the engine's task, so implementations should return quickly;
//! [`ChannelObserver`] hands snapshots to another task instead.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::{Phase, RunState, Stats};

pub trait RunObserver: Send + Sync {
    /// The run left `Idle`.
    fn on_start(&self, _state: &RunState) {}

    /// A search page was fully processed. `stats` are cumulative for the run.
    fn on_page(&self, _state: &RunState, _stats: &Stats) {}

    /// The run reached a terminal phase.
    fn on_stop(&self, _state: &RunState, _stats: &Stats) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Writes progress to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_start(&self, state: &RunState) {
        match &state.job {
            Some(job) => info!(%job, "Started deletion"),
            None => info!(jobs = state.job_count, "Started batch"),
        }
    }

    fn on_page(&self, state: &RunState, stats: &Stats) {
        let scope = state
            .job
            .as_ref()
            .map(|j| j.to_string())
            .unwrap_or_default();
        info!(
            scope = %scope,
            job = state.job_index + 1,
            of = state.job_count,
            "Progress: {:.1}% ({}/{}) - Deleted: {}, Failed: {}, Skipped: {}",
            state.progress_percent(),
            state.stats.deleted + state.stats.failed,
            state.grand_total,
            stats.deleted,
            stats.failed,
            stats.skipped
        );
    }

    fn on_stop(&self, state: &RunState, stats: &Stats) {
        match state.phase {
            Phase::Failed => warn!(
                phase = %state.phase,
                error = state.failure.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "Deletion stopped with an error"
            ),
            _ => info!(phase = %state.phase, "Deletion finished"),
        }
        info!(
            "Final stats - Searched: {}, Deleted: {}, Failed: {}, Skipped: {}",
            stats.searched, stats.deleted, stats.failed, stats.skipped
        );
    }
}

/// Snapshot forwarded by [`ChannelObserver`].
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started(RunState),
    Page(RunState, Stats),
    Stopped(RunState, Stats),
}

/// Forwards snapshots into an unbounded channel; never blocks the engine.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RunObserver for ChannelObserver {
    // A dropped receiver only means nobody is listening any more.
    fn on_start(&self, state: &RunState) {
        let _ = self.tx.send(RunEvent::Started(state.clone()));
    }

    fn on_page(&self, state: &RunState, stats: &Stats) {
        let _ = self.tx.send(RunEvent::Page(state.clone(), *stats));
    }

    fn on_stop(&self, state: &RunState, stats: &Stats) {
        let _ = self.tx.send(RunEvent::Stopped(state.clone(), *stats));
    }
}

//! Sequential execution of several jobs under one stop flag.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::client::DiscordApi;
use crate::config::Configuration;
use crate::engine::JobEngine;
use crate::error::Error;
use crate::models::Job;
use crate::observer::{NoopObserver, RunObserver};
use crate::state::{Phase, RunState, Stats, StopHandle};

/// Outcome of a batch: the merged snapshot plus every job's final state.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub state: RunState,
    pub jobs: Vec<RunState>,
}

impl BatchReport {
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn stats(&self) -> Stats {
        self.state.stats
    }

    /// Jobs that ended in `Failed`, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Job, &Error)> + '_ {
        self.jobs.iter().filter_map(|run| match (&run.job, &run.failure) {
            (Some(job), Some(err)) => Some((job, err.as_ref())),
            _ => None,
        })
    }
}

/// Forwards a job's page events with stats accumulated across the batch.
struct BatchRelay {
    inner: Arc<dyn RunObserver>,
    base: Stats,
}

impl RunObserver for BatchRelay {
    fn on_page(&self, state: &RunState, stats: &Stats) {
        self.inner.on_page(state, &self.base.combined(stats));
    }
}

pub struct BatchOrchestrator {
    api: Arc<dyn DiscordApi>,
    config: Arc<Configuration>,
    observer: Arc<dyn RunObserver>,
    stop: StopHandle,
}

impl BatchOrchestrator {
    pub fn new(api: Arc<dyn DiscordApi>, config: Arc<Configuration>) -> Self {
        Self {
            api,
            config,
            observer: Arc::new(NoopObserver),
            stop: StopHandle::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Abort the running job and skip the rest.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub async fn run(&self, jobs: Vec<Job>) -> BatchReport {
        let count = jobs.len();
        if let [job] = jobs.as_slice() {
            warn!(%job, "Batch of a single job; run it through the job engine instead");
        }

        let mut batch = RunState::for_batch(count);
        batch.phase = Phase::Searching;
        info!(jobs = count, "Starting batch");
        self.observer.on_start(&batch);

        let mut finished = Vec::with_capacity(count);
        for (index, job) in jobs.into_iter().enumerate() {
            if self.stop.is_stopped() {
                info!(remaining = count - index, "Stop requested, skipping remaining jobs");
                batch.phase = Phase::Aborted;
                break;
            }
            batch.job_index = index;

            let relay = BatchRelay {
                inner: Arc::clone(&self.observer),
                base: batch.stats,
            };
            let engine = JobEngine::new(Arc::clone(&self.api), Arc::clone(&self.config))
                .with_observer(Arc::new(relay))
                .with_stop_handle(self.stop.clone());
            let result = engine.run_at(job, index, count).await;

            batch.stats.merge(&result.stats);
            batch.grand_total += result.grand_total;

            match result.phase {
                Phase::Aborted => batch.phase = Phase::Aborted,
                Phase::Failed if result.failed_on_auth() => {
                    error!(
                        error = result.failure.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                        "Authorization rejected, stopping batch"
                    );
                    batch.phase = Phase::Failed;
                    batch.failure = result.failure.clone();
                }
                Phase::Failed => warn!(
                    job = index + 1,
                    of = count,
                    error = result.failure.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                    "Job failed, continuing with next"
                ),
                _ => {}
            }
            finished.push(result);

            if batch.phase.is_terminal() {
                break;
            }
        }

        if !batch.phase.is_terminal() {
            batch.phase = Phase::Completed;
        }
        info!(
            phase = %batch.phase,
            jobs_run = finished.len(),
            deleted = batch.stats.deleted,
            failed = batch.stats.failed,
            "Batch finished"
        );
        self.observer.on_stop(&batch, &batch.stats);

        BatchReport {
            state: batch,
            jobs: finished,
        }
    }
}

//! Per-job deletion engine.
//!
//! A job moves `Idle → Searching → Deleting → Searching …` until the search
//! endpoint runs dry (`Completed`), the stop flag is raised (`Aborted`), or
//! an unrecoverable error occurs (`Failed`). Exactly one request is in flight
//! at a time; pacing comes from explicit sleeps between requests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::client::{DiscordApi, HttpOutcome};
use crate::config::Configuration;
use crate::error::Error;
use crate::filter;
use crate::metrics::{self, MessageOutcome};
use crate::models::{Job, Message, SearchQuery};
use crate::observer::{NoopObserver, RunObserver};
use crate::state::{Phase, RunState, StopHandle};

/// Upper bound for the inter-delete delay after the server throttles deletes.
pub const MAX_THROTTLED_DELETE_DELAY: Duration = Duration::from_secs(10);

/// Consecutive pages of already-processed hits tolerated before the job fails.
pub const MAX_STALE_PAGES: u32 = 10;

/// Floor and ceiling for the index-lag backoff.
const MIN_INDEX_LAG_WAIT: Duration = Duration::from_millis(100);
const MAX_INDEX_LAG_WAIT: Duration = Duration::from_secs(60);

/// Drives one job at a time against a [`DiscordApi`].
pub struct JobEngine {
    api: Arc<dyn DiscordApi>,
    config: Arc<Configuration>,
    observer: Arc<dyn RunObserver>,
    stop: StopHandle,
}

impl JobEngine {
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

    /// Share an existing abort flag, e.g. the batch's.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request an abort; observed before the next request.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Run `job` to a terminal phase and return the final snapshot.
    pub async fn run(&self, job: Job) -> RunState {
        self.run_at(job, 0, 1).await
    }

    pub(crate) async fn run_at(&self, job: Job, index: usize, count: usize) -> RunState {
        let mut run = JobRun::new(self, job, index, count);
        let started = Instant::now();

        metrics::record_job_start();
        run.state.phase = Phase::Searching;
        info!(job = %run.scope, "Starting job");
        self.observer.on_start(&run.state);

        run.execute().await;

        metrics::record_job_result(started.elapsed(), run.state.phase);
        info!(
            job = %run.scope,
            phase = %run.state.phase,
            deleted = run.state.stats.deleted,
            failed = run.state.stats.failed,
            skipped = run.state.stats.skipped,
            "Job finished"
        );
        self.observer.on_stop(&run.state, &run.state.stats);
        run.state
    }
}

enum PageOutcome {
    /// Page done; `fresh` counts hits not seen on earlier pages.
    Continue { fresh: u64 },
    /// The job reached a terminal phase mid-page.
    Stop,
}

enum DeleteOutcome {
    Deleted,
    Failed,
    Stop,
}

/// Mutable state for a single job, dropped when the job ends.
struct JobRun<'a> {
    engine: &'a JobEngine,
    job: Job,
    scope: String,
    state: RunState,
    seen: HashSet<u64>,
    delete_delay: Duration,
    delete_issued: bool,
}

impl<'a> JobRun<'a> {
    fn new(engine: &'a JobEngine, job: Job, index: usize, count: usize) -> Self {
        let mut state = RunState::for_job(job.clone());
        state.job_index = index;
        state.job_count = count;
        Self {
            engine,
            scope: job.to_string(),
            job,
            state,
            seen: HashSet::new(),
            delete_delay: engine.config.delete_delay(),
            delete_issued: false,
        }
    }

    fn config(&self) -> &Configuration {
        &self.engine.config
    }

    /// Move to `Aborted` if a stop was requested.
    fn check_stop(&mut self) -> bool {
        if self.engine.stop.is_stopped() {
            info!(job = %self.scope, "Stop requested, aborting job");
            self.state.phase = Phase::Aborted;
            return true;
        }
        false
    }

    fn query(&self) -> SearchQuery {
        let config = self.config();
        SearchQuery {
            author_id: config.author_id().map(str::to_string),
            content: config.content().map(str::to_string),
            has_link: config.has_link(),
            has_file: config.has_file(),
            min_id: config.min_id(),
            max_id: config.max_id(),
            include_nsfw: config.include_nsfw(),
            offset: self.state.offset,
        }
    }

    async fn execute(&mut self) {
        if self.job.is_dm() && self.job.channel_id.is_none() {
            self.state.fail(Error::ConfigError(
                "a direct-message job needs a channel id".to_string(),
            ));
            return;
        }

        let max_attempts = self.config().max_attempts();
        let mut first_search = true;
        let mut transient_failures = 0u32;
        let mut stale_pages = 0u32;
        let base_lag_wait = self.config().search_delay().max(MIN_INDEX_LAG_WAIT);
        let mut lag_wait = base_lag_wait;

        loop {
            if !first_search {
                sleep(self.config().search_delay()).await;
            }
            first_search = false;

            if self.check_stop() {
                return;
            }

            self.state.phase = Phase::Searching;
            metrics::record_search();
            debug!(job = %self.scope, offset = self.state.offset, "Searching");
            let outcome = self
                .engine
                .api
                .search_messages(&self.job, &self.query())
                .await;

            match outcome {
                HttpOutcome::Success(page) => {
                    transient_failures = 0;
                    if page.total_results != self.state.grand_total {
                        debug!(
                            job = %self.scope,
                            previous = self.state.grand_total,
                            total = page.total_results,
                            "Search total changed"
                        );
                        self.state.grand_total = page.total_results;
                    }

                    if page.messages.is_empty() {
                        info!(job = %self.scope, "No more results");
                        self.state.phase = Phase::Completed;
                        return;
                    }

                    match self.process_page(page.messages).await {
                        PageOutcome::Stop => return,
                        PageOutcome::Continue { fresh } => {
                            self.state.phase = Phase::Searching;
                            self.engine.observer.on_page(&self.state, &self.state.stats);

                            if fresh == 0 {
                                // The index still lists deleted messages; wait for it to catch up.
                                stale_pages += 1;
                                if stale_pages >= MAX_STALE_PAGES {
                                    self.state.fail(Error::StaleIndex {
                                        scope: self.scope.clone(),
                                        pages: stale_pages,
                                        total: self.state.grand_total,
                                    });
                                    return;
                                }
                                warn!(
                                    job = %self.scope,
                                    stale_pages,
                                    total = self.state.grand_total,
                                    wait_ms = lag_wait.as_millis() as u64,
                                    "Search returned only processed messages, waiting for index"
                                );
                                sleep(lag_wait).await;
                                lag_wait = (lag_wait * 2).min(MAX_INDEX_LAG_WAIT);
                            } else {
                                stale_pages = 0;
                                lag_wait = base_lag_wait;
                            }
                        }
                    }
                }
                HttpOutcome::Indexing { retry_after } => {
                    info!(
                        job = %self.scope,
                        wait_ms = retry_after.as_millis() as u64,
                        "Channel not indexed yet, waiting"
                    );
                    sleep(retry_after).await;
                }
                HttpOutcome::RateLimited { retry_after } => {
                    warn!(
                        job = %self.scope,
                        wait_ms = retry_after.as_millis() as u64,
                        "Search rate limited, waiting"
                    );
                    metrics::record_rate_limit("search");
                    sleep(retry_after).await;
                }
                HttpOutcome::ClientError { status: 401, .. } => {
                    self.state.fail(Error::AuthError {
                        scope: self.scope.clone(),
                        status: 401,
                    });
                    return;
                }
                HttpOutcome::ClientError {
                    status,
                    code,
                    message,
                } => {
                    self.state.fail(Error::ApiError {
                        scope: self.scope.clone(),
                        message_id: None,
                        status,
                        code,
                        message,
                    });
                    return;
                }
                HttpOutcome::ServerError { status } => {
                    transient_failures += 1;
                    warn!(job = %self.scope, status, attempt = transient_failures, "Search failed");
                    if transient_failures >= max_attempts {
                        self.state.fail(Error::ApiError {
                            scope: self.scope.clone(),
                            message_id: None,
                            status,
                            code: None,
                            message: "server error on search".to_string(),
                        });
                        return;
                    }
                }
                HttpOutcome::NetworkError(message) => {
                    transient_failures += 1;
                    warn!(job = %self.scope, error = %message, attempt = transient_failures, "Search failed");
                    if transient_failures >= max_attempts {
                        self.state.fail(Error::NetworkError {
                            scope: self.scope.clone(),
                            message,
                        });
                        return;
                    }
                }
            }
        }
    }

    async fn process_page(&mut self, messages: Vec<Message>) -> PageOutcome {
        self.state.phase = Phase::Deleting;
        let mut fresh = 0u64;
        // Skipped and failed messages stay in the result set; deleted ones drop out.
        let mut remaining = 0u64;

        for message in messages {
            if !self.seen.insert(message.id) {
                continue;
            }
            fresh += 1;
            self.state.stats.searched += 1;

            if !message.is_deletable() || !filter::matches(&message, self.config()) {
                debug!(job = %self.scope, message_id = message.id, "Skipping message");
                self.state.stats.skipped += 1;
                metrics::record_message(MessageOutcome::Skipped);
                remaining += 1;
                continue;
            }

            match self.delete_message(&message).await {
                DeleteOutcome::Deleted => {}
                DeleteOutcome::Failed => remaining += 1,
                DeleteOutcome::Stop => return PageOutcome::Stop,
            }
        }

        self.state.offset += remaining;
        PageOutcome::Continue { fresh }
    }

    async fn delete_message(&mut self, message: &Message) -> DeleteOutcome {
        let max_attempts = self.config().max_attempts();
        let mut attempts = 0u32;

        loop {
            if self.delete_issued {
                sleep(self.delete_delay).await;
            }
            if self.check_stop() {
                return DeleteOutcome::Stop;
            }
            self.delete_issued = true;

            let outcome = self
                .engine
                .api
                .delete_message(&message.channel_id, message.id)
                .await;

            let (status, reason) = match outcome {
                HttpOutcome::Success(()) => {
                    debug!(job = %self.scope, message_id = message.id, "Deleted message");
                    return self.record_deleted();
                }
                HttpOutcome::ClientError { status: 404, .. } => {
                    debug!(job = %self.scope, message_id = message.id, "Message already deleted");
                    return self.record_deleted();
                }
                HttpOutcome::ClientError { status: 401, .. } => {
                    self.state.fail(Error::AuthError {
                        scope: self.scope.clone(),
                        status: 401,
                    });
                    return DeleteOutcome::Stop;
                }
                HttpOutcome::RateLimited { retry_after } | HttpOutcome::Indexing { retry_after } => {
                    warn!(
                        job = %self.scope,
                        message_id = message.id,
                        wait_ms = retry_after.as_millis() as u64,
                        "Delete rate limited, waiting"
                    );
                    metrics::record_rate_limit("delete");
                    sleep(retry_after).await;
                    let raised = retry_after.min(MAX_THROTTLED_DELETE_DELAY);
                    if raised > self.delete_delay {
                        info!(job = %self.scope, delay_ms = raised.as_millis() as u64, "Raising delete delay");
                        self.delete_delay = raised;
                    }
                    continue;
                }
                HttpOutcome::ClientError {
                    status, message, ..
                } => (Some(status), message),
                HttpOutcome::ServerError { status } => (Some(status), "server error".to_string()),
                HttpOutcome::NetworkError(message) => (None, message),
            };

            attempts += 1;
            if attempts >= max_attempts {
                warn!(
                    job = %self.scope,
                    message_id = message.id,
                    status = ?status,
                    error = %reason,
                    attempts,
                    "Giving up on message"
                );
                self.state.stats.failed += 1;
                metrics::record_message(MessageOutcome::Failed);
                return DeleteOutcome::Failed;
            }
            warn!(
                job = %self.scope,
                message_id = message.id,
                status = ?status,
                error = %reason,
                attempt = attempts,
                "Delete failed, retrying"
            );
        }
    }

    fn record_deleted(&mut self) -> DeleteOutcome {
        self.state.stats.deleted += 1;
        metrics::record_message(MessageOutcome::Deleted);
        DeleteOutcome::Deleted
    }
}

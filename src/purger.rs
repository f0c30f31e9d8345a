//! Entry point tying scope resolution, the job engine and the batch runner together.

use std::sync::Arc;

use tracing::info;

use crate::batch::{BatchOrchestrator, BatchReport};
use crate::client::{DiscordApi, DiscordClient};
use crate::config::Configuration;
use crate::engine::JobEngine;
use crate::error::Result;
use crate::models::{DmChannel, Job};
use crate::observer::{NoopObserver, RunObserver};
use crate::scope::ScopeResolver;
use crate::state::{RunState, StopHandle};

pub struct Purger {
    api: Arc<dyn DiscordApi>,
    config: Arc<Configuration>,
    observer: Arc<dyn RunObserver>,
    stop: StopHandle,
}

impl Purger {
    /// Purger backed by the real REST client.
    pub fn new(config: Configuration) -> Result<Self> {
        let client = DiscordClient::from_config(&config)?;
        Ok(Self::with_api(Arc::new(client), config))
    }

    pub fn with_api(api: Arc<dyn DiscordApi>, config: Configuration) -> Self {
        Self {
            api,
            config: Arc::new(config),
            observer: Arc::new(NoopObserver),
            stop: StopHandle::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub async fn resolve(&self) -> Result<Vec<Job>> {
        ScopeResolver::new(Arc::clone(&self.api), Arc::clone(&self.config))
            .resolve()
            .await
    }

    pub async fn dm_channels(&self) -> Result<Vec<DmChannel>> {
        ScopeResolver::new(Arc::clone(&self.api), Arc::clone(&self.config))
            .dm_channels()
            .await
    }

    /// Resolve the configured scope and delete everything that matches.
    pub async fn run(&self) -> Result<BatchReport> {
        let jobs = self.resolve().await?;
        Ok(self.run_jobs(jobs).await)
    }

    /// Run already-resolved jobs.
    ///
    /// A single job runs directly; anything else goes through the batch
    /// runner. Either way the report carries the merged stats and each job's
    /// final state.
    pub async fn run_jobs(&self, mut jobs: Vec<Job>) -> BatchReport {
        if jobs.len() == 1 {
            if let Some(job) = jobs.pop() {
                info!(%job, "Running single job");
                let state = self.run_job(job).await;
                return BatchReport {
                    state: state.clone(),
                    jobs: vec![state],
                };
            }
        }
        self.run_batch(jobs).await
    }

    pub async fn run_job(&self, job: Job) -> RunState {
        JobEngine::new(Arc::clone(&self.api), Arc::clone(&self.config))
            .with_observer(Arc::clone(&self.observer))
            .with_stop_handle(self.stop.clone())
            .run(job)
            .await
    }

    pub async fn run_batch(&self, jobs: Vec<Job>) -> BatchReport {
        BatchOrchestrator::new(Arc::clone(&self.api), Arc::clone(&self.config))
            .with_observer(Arc::clone(&self.observer))
            .with_stop_handle(self.stop.clone())
            .run(jobs)
            .await
    }
}

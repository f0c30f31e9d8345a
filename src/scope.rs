//! Turns the configured guild/channel scope into an ordered list of jobs.

use std::future::Future;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::{DiscordApi, HttpOutcome};
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::models::{DmChannel, Job, DM_GUILD};

/// Reject scopes that cannot be expressed as jobs.
pub fn validate_scope(guild_ids: &[String], channel_ids: &[String]) -> Result<()> {
    if channel_ids.is_empty() {
        return Ok(());
    }
    match guild_ids.len() {
        0 => Err(Error::ConfigError(
            "channel ids need exactly one guild id (use @me for direct messages)".to_string(),
        )),
        1 => Ok(()),
        n => Err(Error::ConfigError(format!(
            "channel ids cannot be combined with {} guild ids",
            n
        ))),
    }
}

/// Expands a [`Configuration`] into jobs, fetching guild and DM lists when needed.
pub struct ScopeResolver {
    api: Arc<dyn DiscordApi>,
    config: Arc<Configuration>,
}

impl ScopeResolver {
    pub fn new(api: Arc<dyn DiscordApi>, config: Arc<Configuration>) -> Self {
        Self { api, config }
    }

    pub async fn resolve(&self) -> Result<Vec<Job>> {
        let guild_ids = self.config.guild_ids();
        let channel_ids = self.config.channel_ids();
        validate_scope(guild_ids, channel_ids)?;

        let jobs = match guild_ids {
            [] => {
                let mut jobs = self.all_guild_jobs().await?;
                if self.config.include_dms() {
                    jobs.extend(self.dm_jobs().await?);
                } else {
                    debug!("Direct messages excluded");
                }
                jobs
            }
            [guild] if !channel_ids.is_empty() => channel_ids
                .iter()
                .map(|channel| Job::channel(guild.as_str(), channel.as_str()))
                .collect(),
            [guild] if guild == DM_GUILD => self.dm_jobs().await?,
            [guild] => vec![Job::guild(guild.as_str())],
            guilds => {
                let mut jobs = Vec::new();
                for guild in guilds {
                    if guild == DM_GUILD {
                        jobs.extend(self.dm_jobs().await?);
                    } else if self.is_ignored_guild(guild) {
                        debug!(guild = %guild, "Skipping ignored guild");
                    } else {
                        jobs.push(Job::guild(guild.as_str()));
                    }
                }
                jobs
            }
        };

        info!(jobs = jobs.len(), "Resolved scope");
        Ok(jobs)
    }

    fn is_ignored_guild(&self, id: &str) -> bool {
        self.config.ignored_guild_ids().iter().any(|g| g == id)
    }

    fn is_ignored_dm(&self, id: &str) -> bool {
        self.config.ignored_dm_ids().iter().any(|c| c == id)
    }

    async fn all_guild_jobs(&self) -> Result<Vec<Job>> {
        let guilds = self.fetch("guilds", || self.api.list_guilds()).await?;
        Ok(guilds
            .into_iter()
            .filter(|guild| {
                if guild.staff_only {
                    debug!(guild = %guild.id, name = %guild.name, "Skipping staff-only guild");
                    return false;
                }
                !self.is_ignored_guild(&guild.id)
            })
            .map(|guild| Job::guild(guild.id))
            .collect())
    }

    /// Open direct-message channels, minus the ignored ones.
    pub async fn dm_channels(&self) -> Result<Vec<DmChannel>> {
        let channels = self.fetch("dm channels", || self.api.list_dm_channels()).await?;
        Ok(channels
            .into_iter()
            .filter(|channel| {
                if self.is_ignored_dm(&channel.id) {
                    debug!(channel = %channel.id, name = %channel.name, "Skipping ignored DM");
                    return false;
                }
                true
            })
            .collect())
    }

    async fn dm_jobs(&self) -> Result<Vec<Job>> {
        Ok(self
            .dm_channels()
            .await?
            .into_iter()
            .map(|channel| Job::dm(channel.id))
            .collect())
    }

    /// Call a list endpoint, waiting out throttling and retrying transient failures.
    async fn fetch<T, F, Fut>(&self, what: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = HttpOutcome<T>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut failures = 0u32;

        loop {
            let (status, message) = match call().await {
                HttpOutcome::Success(items) => return Ok(items),
                HttpOutcome::RateLimited { retry_after } | HttpOutcome::Indexing { retry_after } => {
                    warn!(what, wait_ms = retry_after.as_millis() as u64, "Listing rate limited, waiting");
                    crate::metrics::record_rate_limit("list");
                    sleep(retry_after).await;
                    continue;
                }
                HttpOutcome::ClientError { status: 401, .. } => {
                    return Err(Error::AuthError {
                        scope: what.to_string(),
                        status: 401,
                    });
                }
                HttpOutcome::ClientError {
                    status,
                    code,
                    message,
                } => {
                    return Err(Error::ApiError {
                        scope: what.to_string(),
                        message_id: None,
                        status,
                        code,
                        message,
                    });
                }
                HttpOutcome::ServerError { status } => (Some(status), "server error".to_string()),
                HttpOutcome::NetworkError(message) => (None, message),
            };

            failures += 1;
            if failures >= max_attempts {
                return Err(match status {
                    Some(status) => Error::ApiError {
                        scope: what.to_string(),
                        message_id: None,
                        status,
                        code: None,
                        message,
                    },
                    None => Error::NetworkError {
                        scope: what.to_string(),
                        message,
                    },
                });
            }
            warn!(what, status = ?status, error = %message, attempt = failures, "Listing failed, retrying");
            sleep(self.config.search_delay()).await;
        }
    }
}

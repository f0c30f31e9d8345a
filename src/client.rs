//! Discord REST client.
//!
//! Every call returns an [`HttpOutcome`] instead of retrying: attempt
//! counting and backoff belong to the engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::models::{
    DmChannel, Guild, Job, RawChannel, RawGuild, RawSearchResponse, SearchPage, SearchQuery,
};

/// Wait applied when a throttling response carries no usable delay.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(5000);

/// Classified result of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpOutcome<T> {
    Success(T),
    /// Search index for the scope is still being built (HTTP 202).
    Indexing { retry_after: Duration },
    RateLimited { retry_after: Duration },
    ClientError {
        status: u16,
        code: Option<u64>,
        message: String,
    },
    ServerError { status: u16 },
    NetworkError(String),
}

impl<T> HttpOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, HttpOutcome::Success(_))
    }

    /// Delay the server asked for, if this is a throttling response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HttpOutcome::Indexing { retry_after } | HttpOutcome::RateLimited { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> HttpOutcome<U> {
        match self {
            HttpOutcome::Success(value) => HttpOutcome::Success(f(value)),
            HttpOutcome::Indexing { retry_after } => HttpOutcome::Indexing { retry_after },
            HttpOutcome::RateLimited { retry_after } => HttpOutcome::RateLimited { retry_after },
            HttpOutcome::ClientError {
                status,
                code,
                message,
            } => HttpOutcome::ClientError {
                status,
                code,
                message,
            },
            HttpOutcome::ServerError { status } => HttpOutcome::ServerError { status },
            HttpOutcome::NetworkError(msg) => HttpOutcome::NetworkError(msg),
        }
    }
}

/// The endpoints the purge engine and scope resolver need.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    async fn search_messages(&self, job: &Job, query: &SearchQuery) -> HttpOutcome<SearchPage>;

    async fn delete_message(&self, channel_id: &str, message_id: u64) -> HttpOutcome<()>;

    async fn list_guilds(&self) -> HttpOutcome<Vec<Guild>>;

    async fn list_dm_channels(&self) -> HttpOutcome<Vec<DmChannel>>;
}

/// Error envelope returned with 4xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after: Option<f64>,
}

/// Authenticated Discord client.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: Client,
    token: String,
    base_url: String,
}

impl DiscordClient {
    pub fn new<S: Into<String>>(token: S, base_url: S) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::ConfigError("token is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent(concat!("discord_purge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Configuration) -> Result<Self> {
        Self::new(config.token(), config.api_base_url())
    }

    fn search_path(&self, job: &Job) -> String {
        match (&job.channel_id, job.is_dm()) {
            (Some(channel), true) => format!("{}/channels/{}/messages/search", self.base_url, channel),
            _ => format!("{}/guilds/{}/messages/search", self.base_url, job.guild_id),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: String, query: &[(&str, String)]) -> HttpOutcome<T> {
        debug!(%url, "GET");
        let result = self
            .http
            .get(&url)
            .header("Authorization", &self.token)
            .query(query)
            .send()
            .await;
        classify(result).await
    }
}

/// Query pairs in the order the web client sends them.
fn search_params(job: &Job, query: &SearchQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(author) = &query.author_id {
        params.push(("author_id", author.clone()));
    }
    if !job.is_dm() {
        if let Some(channel) = &job.channel_id {
            params.push(("channel_id", channel.clone()));
        }
    }
    if let Some(min) = query.min_id {
        params.push(("min_id", min.to_string()));
    }
    if let Some(max) = query.max_id {
        params.push(("max_id", max.to_string()));
    }
    params.push(("sort_by", "timestamp".to_string()));
    params.push(("sort_order", "desc".to_string()));
    params.push(("offset", query.offset.to_string()));
    if query.has_link {
        params.push(("has", "link".to_string()));
    }
    if query.has_file {
        params.push(("has", "file".to_string()));
    }
    if let Some(content) = &query.content {
        params.push(("content", content.clone()));
    }
    if query.include_nsfw {
        params.push(("include_nsfw", "true".to_string()));
    }
    params
}

#[async_trait]
impl DiscordApi for DiscordClient {
    async fn search_messages(&self, job: &Job, query: &SearchQuery) -> HttpOutcome<SearchPage> {
        let outcome: HttpOutcome<RawSearchResponse> = self
            .get(self.search_path(job), &search_params(job, query))
            .await;
        match outcome {
            HttpOutcome::Success(raw) => match raw.into_page() {
                Ok(page) => HttpOutcome::Success(page),
                Err(e) => HttpOutcome::NetworkError(format!("invalid search response: {}", e)),
            },
            other => other.map(|_| SearchPage::default()),
        }
    }

    async fn delete_message(&self, channel_id: &str, message_id: u64) -> HttpOutcome<()> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.base_url, channel_id, message_id
        );
        debug!(%url, "DELETE");
        let result = self
            .http
            .delete(&url)
            .header("Authorization", &self.token)
            .send()
            .await;
        classify::<serde_json::Value>(result).await.map(|_| ())
    }

    async fn list_guilds(&self) -> HttpOutcome<Vec<Guild>> {
        let outcome: HttpOutcome<Vec<RawGuild>> = self
            .get(format!("{}/users/@me/guilds", self.base_url), &[])
            .await;
        outcome.map(|guilds| guilds.into_iter().map(Guild::from).collect())
    }

    async fn list_dm_channels(&self) -> HttpOutcome<Vec<DmChannel>> {
        let outcome: HttpOutcome<Vec<RawChannel>> = self
            .get(format!("{}/users/@me/channels", self.base_url), &[])
            .await;
        outcome.map(|channels| channels.into_iter().map(DmChannel::from).collect())
    }
}

fn seconds_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_millis((secs * 1000.0).ceil() as u64))
    } else {
        None
    }
}

/// Map a raw response onto an [`HttpOutcome`], decoding the body on success.
async fn classify<T: DeserializeOwned>(
    result: std::result::Result<Response, reqwest::Error>,
) -> HttpOutcome<T> {
    let response = match result {
        Ok(r) => r,
        Err(e) => return HttpOutcome::NetworkError(e.to_string()),
    };

    let status = response.status();
    let header_retry = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(seconds_to_duration);

    let text = match response.text().await {
        Ok(t) => t,
        Err(e) => return HttpOutcome::NetworkError(format!("failed to read response: {}", e)),
    };
    let envelope: ErrorEnvelope = serde_json::from_str(&text).unwrap_or_default();
    let body_retry = envelope.retry_after.and_then(seconds_to_duration);

    if status == StatusCode::TOO_MANY_REQUESTS {
        return HttpOutcome::RateLimited {
            retry_after: body_retry.or(header_retry).unwrap_or(DEFAULT_RETRY_AFTER),
        };
    }

    if status == StatusCode::ACCEPTED {
        return HttpOutcome::Indexing {
            retry_after: body_retry.or(header_retry).unwrap_or(DEFAULT_RETRY_AFTER),
        };
    }

    if status.is_success() {
        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        return match serde_json::from_str::<T>(body) {
            Ok(value) => HttpOutcome::Success(value),
            Err(e) => HttpOutcome::NetworkError(format!("invalid response body: {}", e)),
        };
    }

    if status.is_client_error() {
        return HttpOutcome::ClientError {
            status: status.as_u16(),
            code: envelope.code,
            message: envelope.message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("client error")
                    .to_string()
            }),
        };
    }

    HttpOutcome::ServerError {
        status: status.as_u16(),
    }
}

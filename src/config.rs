//! Run configuration
//!
//! [`Configuration`] is built once per invocation through
//! [`ConfigurationBuilder`] and never mutated afterwards. Defaults for the
//! ambient settings (token, delays, ignore-lists) can come from a `purge.yml`
//! file via [`FileConfig`]; explicit builder calls win over file values.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::{scope, snowflake};

/// Default constants
pub const CONFIG_FILE: &str = "purge.yml";
pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v9";
pub const DEFAULT_SEARCH_DELAY_MS: u64 = 100;
pub const DEFAULT_DELETE_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Validated, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Configuration {
    token: String,
    api_base_url: String,
    author_id: Option<String>,
    guild_ids: Vec<String>,
    channel_ids: Vec<String>,
    min_id: Option<u64>,
    max_id: Option<u64>,
    content: Option<String>,
    pattern: Option<Regex>,
    has_link: bool,
    has_file: bool,
    include_nsfw: bool,
    include_pinned: bool,
    include_dms: bool,
    ignored_guild_ids: Vec<String>,
    ignored_dm_ids: Vec<String>,
    search_delay: Duration,
    delete_delay: Duration,
    max_attempts: u32,
    ask_for_confirmation: bool,
}

impl Configuration {
    pub fn builder(token: impl Into<String>) -> ConfigurationBuilder {
        ConfigurationBuilder::new(token)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn author_id(&self) -> Option<&str> {
        self.author_id.as_deref()
    }

    pub fn guild_ids(&self) -> &[String] {
        &self.guild_ids
    }

    pub fn channel_ids(&self) -> &[String] {
        &self.channel_ids
    }

    pub fn min_id(&self) -> Option<u64> {
        self.min_id
    }

    pub fn max_id(&self) -> Option<u64> {
        self.max_id
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub fn has_link(&self) -> bool {
        self.has_link
    }

    pub fn has_file(&self) -> bool {
        self.has_file
    }

    pub fn include_nsfw(&self) -> bool {
        self.include_nsfw
    }

    pub fn include_pinned(&self) -> bool {
        self.include_pinned
    }

    pub fn include_dms(&self) -> bool {
        self.include_dms
    }

    pub fn ignored_guild_ids(&self) -> &[String] {
        &self.ignored_guild_ids
    }

    pub fn ignored_dm_ids(&self) -> &[String] {
        &self.ignored_dm_ids
    }

    pub fn search_delay(&self) -> Duration {
        self.search_delay
    }

    pub fn delete_delay(&self) -> Duration {
        self.delete_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn ask_for_confirmation(&self) -> bool {
        self.ask_for_confirmation
    }
}

/// Collects settings and validates them into a [`Configuration`].
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    token: String,
    api_base_url: Option<String>,
    author_id: Option<String>,
    guild_ids: Vec<String>,
    channel_ids: Vec<String>,
    min_id: Option<u64>,
    max_id: Option<u64>,
    min_age_days: Option<f64>,
    max_age_days: Option<f64>,
    content: Option<String>,
    pattern: Option<String>,
    has_link: bool,
    has_file: bool,
    include_nsfw: bool,
    include_pinned: bool,
    include_dms: bool,
    ignored_guild_ids: Vec<String>,
    ignored_dm_ids: Vec<String>,
    search_delay: Option<Duration>,
    delete_delay: Option<Duration>,
    max_attempts: Option<u32>,
    ask_for_confirmation: bool,
}

impl ConfigurationBuilder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base_url: None,
            author_id: None,
            guild_ids: Vec::new(),
            channel_ids: Vec::new(),
            min_id: None,
            max_id: None,
            min_age_days: None,
            max_age_days: None,
            content: None,
            pattern: None,
            has_link: false,
            has_file: false,
            include_nsfw: false,
            include_pinned: false,
            include_dms: true,
            ignored_guild_ids: Vec::new(),
            ignored_dm_ids: Vec::new(),
            search_delay: None,
            delete_delay: None,
            max_attempts: None,
            ask_for_confirmation: true,
        }
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn author_id(mut self, id: impl Into<String>) -> Self {
        self.author_id = Some(id.into());
        self
    }

    pub fn guild_id(mut self, id: impl Into<String>) -> Self {
        self.guild_ids.push(id.into());
        self
    }

    pub fn guild_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guild_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn channel_id(mut self, id: impl Into<String>) -> Self {
        self.channel_ids.push(id.into());
        self
    }

    pub fn channel_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn min_id(mut self, id: u64) -> Self {
        self.min_id = Some(id);
        self
    }

    pub fn max_id(mut self, id: u64) -> Self {
        self.max_id = Some(id);
        self
    }

    pub fn min_age_days(mut self, days: f64) -> Self {
        self.min_age_days = Some(days);
        self
    }

    pub fn max_age_days(mut self, days: f64) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn content(mut self, text: impl Into<String>) -> Self {
        self.content = Some(text.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn has_link(mut self, value: bool) -> Self {
        self.has_link = value;
        self
    }

    pub fn has_file(mut self, value: bool) -> Self {
        self.has_file = value;
        self
    }

    pub fn include_nsfw(mut self, value: bool) -> Self {
        self.include_nsfw = value;
        self
    }

    pub fn include_pinned(mut self, value: bool) -> Self {
        self.include_pinned = value;
        self
    }

    pub fn include_dms(mut self, value: bool) -> Self {
        self.include_dms = value;
        self
    }

    pub fn ignore_guild(mut self, id: impl Into<String>) -> Self {
        self.ignored_guild_ids.push(id.into());
        self
    }

    pub fn ignore_dm(mut self, id: impl Into<String>) -> Self {
        self.ignored_dm_ids.push(id.into());
        self
    }

    pub fn search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    pub fn delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn ask_for_confirmation(mut self, value: bool) -> Self {
        self.ask_for_confirmation = value;
        self
    }

    /// Fill in whatever the builder does not set yet from a config file.
    pub fn with_file_defaults(mut self, file: &FileConfig) -> Self {
        if self.token.trim().is_empty() {
            if let Some(token) = &file.token {
                self.token = token.clone();
            }
        }
        if self.api_base_url.is_none() {
            self.api_base_url = file.api_base_url.clone();
        }
        if self.author_id.is_none() {
            self.author_id = file.author_id.clone();
        }
        self.search_delay = self
            .search_delay
            .or(file.search_delay_ms.map(Duration::from_millis));
        self.delete_delay = self
            .delete_delay
            .or(file.delete_delay_ms.map(Duration::from_millis));
        self.max_attempts = self.max_attempts.or(file.max_attempts);
        for id in &file.ignored_guild_ids {
            if !self.ignored_guild_ids.contains(id) {
                self.ignored_guild_ids.push(id.clone());
            }
        }
        for id in &file.ignored_dm_ids {
            if !self.ignored_dm_ids.contains(id) {
                self.ignored_dm_ids.push(id.clone());
            }
        }
        self
    }

    pub fn build(self) -> Result<Configuration> {
        self.build_at(Utc::now())
    }

    /// Validate and resolve ages relative to `now`.
    pub fn build_at(self, now: DateTime<Utc>) -> Result<Configuration> {
        let token = self.token.trim().to_string();
        if token.is_empty() {
            return Err(Error::ConfigError("token is required".to_string()));
        }

        if self.min_id.is_some() && self.min_age_days.is_some() {
            return Err(Error::ConfigError(
                "minId and minAge cannot be combined".to_string(),
            ));
        }
        if self.max_id.is_some() && self.max_age_days.is_some() {
            return Err(Error::ConfigError(
                "maxId and maxAge cannot be combined".to_string(),
            ));
        }

        let min_id = match self.min_age_days {
            Some(days) => Some(snowflake::from_age_days(days, now)?),
            None => self.min_id,
        };
        let max_id = match self.max_age_days {
            Some(days) => Some(snowflake::from_age_days(days, now)?),
            None => self.max_id,
        };
        if let (Some(min), Some(max)) = (min_id, max_id) {
            if min > max {
                return Err(Error::ConfigError(format!(
                    "empty id range: min {} is above max {}",
                    min, max
                )));
            }
        }

        let guild_ids = clean_ids(self.guild_ids);
        let channel_ids = clean_ids(self.channel_ids);
        scope::validate_scope(&guild_ids, &channel_ids)?;

        let max_attempts = self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(Error::ConfigError(
                "maxAttempts must be at least 1".to_string(),
            ));
        }

        let pattern = match self.pattern.as_deref().filter(|p| !p.is_empty()) {
            Some(p) => Some(RegexBuilder::new(p).case_insensitive(true).build()?),
            None => None,
        };

        Ok(Configuration {
            token,
            api_base_url: self
                .api_base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            author_id: self.author_id.filter(|a| !a.trim().is_empty()),
            guild_ids,
            channel_ids,
            min_id,
            max_id,
            content: self.content.filter(|c| !c.is_empty()),
            pattern,
            has_link: self.has_link,
            has_file: self.has_file,
            include_nsfw: self.include_nsfw,
            include_pinned: self.include_pinned,
            include_dms: self.include_dms,
            ignored_guild_ids: self.ignored_guild_ids,
            ignored_dm_ids: self.ignored_dm_ids,
            search_delay: self
                .search_delay
                .unwrap_or(Duration::from_millis(DEFAULT_SEARCH_DELAY_MS)),
            delete_delay: self
                .delete_delay
                .unwrap_or(Duration::from_millis(DEFAULT_DELETE_DELAY_MS)),
            max_attempts,
            ask_for_confirmation: self.ask_for_confirmation,
        })
    }
}

/// Split comma-separated entries, trim, drop empties and duplicates.
fn clean_ids(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in ids {
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !out.iter().any(|existing| existing == part) {
                out.push(part.to_string());
            }
        }
    }
    out
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    discord: Option<DiscordSection>,
    timing: Option<TimingSection>,
    ignore: Option<IgnoreSection>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordSection {
    token: Option<String>,
    api_base_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    author_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingSection {
    search_delay_ms: Option<u64>,
    delete_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct IgnoreSection {
    #[serde(default)]
    guilds: Vec<serde_yaml::Value>,
    #[serde(default)]
    dms: Vec<serde_yaml::Value>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

fn yaml_id(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Ambient defaults read from `purge.yml`, with `${VAR}` values resolved
/// from the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    pub token: Option<String>,
    pub api_base_url: Option<String>,
    pub author_id: Option<String>,
    pub search_delay_ms: Option<u64>,
    pub delete_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub ignored_guild_ids: Vec<String>,
    pub ignored_dm_ids: Vec<String>,
}

impl FileConfig {
    /// Load `purge.yml` from the working directory or its parent, or fall back
    /// to empty defaults.
    pub fn load() -> Self {
        Self::load_dotenv();
        Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(format!("../{}", CONFIG_FILE)))
            .unwrap_or_default()
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let yaml: YamlConfig = serde_yaml::from_str(content)?;
        let discord = yaml.discord.unwrap_or_default();
        let timing = yaml.timing.unwrap_or_default();
        let ignore = yaml.ignore.unwrap_or_default();

        Ok(Self {
            token: resolve_env_string(discord.token, "DISCORD_TOKEN"),
            api_base_url: discord.api_base_url,
            author_id: resolve_env_string(discord.author_id, "DISCORD_AUTHOR_ID"),
            search_delay_ms: timing.search_delay_ms,
            delete_delay_ms: timing.delete_delay_ms,
            max_attempts: timing.max_attempts,
            ignored_guild_ids: ignore.guilds.iter().filter_map(yaml_id).collect(),
            ignored_dm_ids: ignore.dms.iter().filter_map(yaml_id).collect(),
        })
    }
}

/// Resolve a value: prefer env var if config value looks like ${VAR}
fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
    if let Some(ref v) = value {
        if v.starts_with("${") && v.ends_with('}') {
            let var_name = &v[2..v.len() - 1];
            if let Ok(env_val) = std::env::var(var_name) {
                return Some(env_val);
            }
            return std::env::var(env_key).ok();
        }
        return value;
    }
    std::env::var(env_key).ok()
}

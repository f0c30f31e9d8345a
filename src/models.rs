//! Domain records exchanged between the client, the filter and the engine.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::Result;
use crate::snowflake;

/// Guild id that addresses the direct-message namespace.
pub const DM_GUILD: &str = "@me";

/// Guild feature the platform sets on staff-only servers.
const STAFF_ONLY_FEATURE: &str = "INTERNAL_EMPLOYEE_ONLY";

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("link pattern is valid"));

/// One guild/channel (or DM) scope to sweep.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    pub guild_id: String,
    pub channel_id: Option<String>,
}

impl Job {
    pub fn guild(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: None,
        }
    }

    pub fn channel(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: Some(channel_id.into()),
        }
    }

    pub fn dm(channel_id: impl Into<String>) -> Self {
        Self::channel(DM_GUILD, channel_id)
    }

    pub fn is_dm(&self) -> bool {
        self.guild_id == DM_GUILD
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.channel_id, self.is_dm()) {
            (Some(channel), true) => write!(f, "dm {}", channel),
            (Some(channel), false) => write!(f, "guild {} channel {}", self.guild_id, channel),
            (None, true) => write!(f, "all dms"),
            (None, false) => write!(f, "guild {}", self.guild_id),
        }
    }
}

/// A message as seen by the engine. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub pinned: bool,
    pub has_attachments: bool,
    pub has_link: bool,
    pub nsfw: bool,
    pub kind: u8,
}

impl Message {
    /// Whether the platform lets an author delete this message type.
    ///
    /// Type 0 is a regular message, 6..=21 are user-issued replies, pins,
    /// slash-command results and similar; the rest are system notices.
    pub fn is_deletable(&self) -> bool {
        self.kind == 0 || (6..=21).contains(&self.kind)
    }
}

/// Server-side predicates and pagination for one search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub author_id: Option<String>,
    pub content: Option<String>,
    pub has_link: bool,
    pub has_file: bool,
    pub min_id: Option<u64>,
    pub max_id: Option<u64>,
    pub include_nsfw: bool,
    pub offset: u64,
}

/// One page of search hits.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub total_results: u64,
    pub messages: Vec<Message>,
}

/// A guild the token can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: String,
    pub name: String,
    pub staff_only: bool,
}

/// A DM or group DM conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmChannel {
    pub id: String,
    pub name: String,
}

// Wire shapes

#[derive(Debug, Deserialize)]
pub(crate) struct RawSearchResponse {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub messages: Vec<Vec<RawMessage>>,
    #[serde(default)]
    pub channels: Vec<RawChannel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub content: String,
    pub author: RawUser,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default)]
    pub embeds: Vec<serde_json::Value>,
    #[serde(default)]
    pub hit: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawChannel {
    pub id: String,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub recipients: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawGuild {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl RawMessage {
    fn into_message(self, nsfw_channels: &HashMap<String, bool>) -> Result<Message> {
        let has_link = !self.embeds.is_empty() || LINK_RE.is_match(&self.content);
        Ok(Message {
            id: snowflake::parse(&self.id)?,
            nsfw: nsfw_channels
                .get(&self.channel_id)
                .copied()
                .unwrap_or(false),
            channel_id: self.channel_id,
            author_id: self.author.id,
            has_attachments: !self.attachments.is_empty(),
            has_link,
            pinned: self.pinned,
            kind: self.kind,
            content: self.content,
        })
    }
}

impl RawSearchResponse {
    /// Keep the hit of each context group; the neighbours are only context.
    pub(crate) fn into_page(self) -> Result<SearchPage> {
        let nsfw_channels: HashMap<String, bool> = self
            .channels
            .into_iter()
            .map(|c| (c.id, c.nsfw))
            .collect();

        let mut messages = Vec::with_capacity(self.messages.len());
        for group in self.messages {
            let hit = group
                .into_iter()
                .reduce(|found, next| if found.hit { found } else { next });
            if let Some(raw) = hit {
                messages.push(raw.into_message(&nsfw_channels)?);
            }
        }

        Ok(SearchPage {
            total_results: self.total_results,
            messages,
        })
    }
}

impl From<RawGuild> for Guild {
    fn from(raw: RawGuild) -> Self {
        Self {
            staff_only: raw.features.iter().any(|f| f == STAFF_ONLY_FEATURE),
            id: raw.id,
            name: raw.name,
        }
    }
}

impl From<RawChannel> for DmChannel {
    fn from(raw: RawChannel) -> Self {
        let name = raw.name.filter(|n| !n.is_empty()).unwrap_or_else(|| {
            raw.recipients
                .iter()
                .map(|r| {
                    r.global_name
                        .clone()
                        .or_else(|| r.username.clone())
                        .unwrap_or_else(|| r.id.clone())
                })
                .collect::<Vec<_>>()
                .join(", ")
        });
        Self { id: raw.id, name }
    }
}

//! In-memory stand-in for the Discord API used by the integration tests.
//!
//! Serves search and delete requests from a message store, unless a scripted
//! outcome is queued for that endpoint, in which case the script wins. Only
//! the author predicate is applied server-side so the client filter is
//! exercised for everything else.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use discord_purge::{
    DiscordApi, DmChannel, Guild, HttpOutcome, Job, Message, SearchPage, SearchQuery, StopHandle,
    DM_GUILD,
};

pub const PAGE_SIZE: usize = 25;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search { job: Job, query: SearchQuery, at: Instant },
    Delete { channel_id: String, message_id: u64, at: Instant },
    ListGuilds,
    ListDms,
}

#[derive(Default)]
pub struct FakeApi {
    inbox: Mutex<Vec<(String, Message)>>,
    guilds: Vec<Guild>,
    dms: Vec<DmChannel>,
    scripted_searches: Mutex<VecDeque<HttpOutcome<SearchPage>>>,
    scripted_deletes: Mutex<VecDeque<HttpOutcome<()>>>,
    scripted_guilds: Mutex<VecDeque<HttpOutcome<Vec<Guild>>>>,
    scripted_dms: Mutex<VecDeque<HttpOutcome<Vec<DmChannel>>>>,
    stop_after_deletes: Mutex<Option<(usize, StopHandle)>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store messages for `guild_id`, newest first as the search endpoint sorts them.
    pub fn with_messages(self, guild_id: &str, messages: Vec<Message>) -> Self {
        {
            let mut inbox = self.inbox.lock().unwrap();
            inbox.extend(messages.into_iter().map(|m| (guild_id.to_string(), m)));
            inbox.sort_by(|a, b| b.1.id.cmp(&a.1.id));
        }
        self
    }

    pub fn with_guilds(mut self, guilds: Vec<Guild>) -> Self {
        self.guilds = guilds;
        self
    }

    pub fn with_dms(mut self, dms: Vec<DmChannel>) -> Self {
        self.dms = dms;
        self
    }

    pub fn script_search(self, outcome: HttpOutcome<SearchPage>) -> Self {
        self.scripted_searches.lock().unwrap().push_back(outcome);
        self
    }

    pub fn script_delete(self, outcome: HttpOutcome<()>) -> Self {
        self.scripted_deletes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn script_guilds(self, outcome: HttpOutcome<Vec<Guild>>) -> Self {
        self.scripted_guilds.lock().unwrap().push_back(outcome);
        self
    }

    pub fn script_dms(self, outcome: HttpOutcome<Vec<DmChannel>>) -> Self {
        self.scripted_dms.lock().unwrap().push_back(outcome);
        self
    }

    /// Raise `stop` while serving the `n`-th delete request.
    pub fn stop_after_deletes(&self, n: usize, stop: StopHandle) {
        *self.stop_after_deletes.lock().unwrap() = Some((n, stop));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<(Job, u64, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Search { job, query, at } => Some((job, query.offset, at)),
                _ => None,
            })
            .collect()
    }

    /// Every search request's predicates, in call order.
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Search { query, .. } => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<(u64, Instant)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { message_id, at, .. } => Some((message_id, at)),
                _ => None,
            })
            .collect()
    }

    pub fn remaining(&self) -> Vec<u64> {
        self.inbox.lock().unwrap().iter().map(|(_, m)| m.id).collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn serve_search(&self, job: &Job, query: &SearchQuery) -> SearchPage {
        let inbox = self.inbox.lock().unwrap();
        let hits: Vec<&Message> = inbox
            .iter()
            .filter(|(guild, m)| match &job.channel_id {
                Some(channel) => &m.channel_id == channel,
                None => guild == &job.guild_id,
            })
            .map(|(_, m)| m)
            .filter(|m| query.author_id.as_ref().map_or(true, |a| &m.author_id == a))
            .collect();

        SearchPage {
            total_results: hits.len() as u64,
            messages: hits
                .into_iter()
                .skip(query.offset as usize)
                .take(PAGE_SIZE)
                .cloned()
                .collect(),
        }
    }
}

#[async_trait]
impl DiscordApi for FakeApi {
    async fn search_messages(&self, job: &Job, query: &SearchQuery) -> HttpOutcome<SearchPage> {
        self.record(Call::Search {
            job: job.clone(),
            query: query.clone(),
            at: Instant::now(),
        });
        if let Some(outcome) = self.scripted_searches.lock().unwrap().pop_front() {
            return outcome;
        }
        HttpOutcome::Success(self.serve_search(job, query))
    }

    async fn delete_message(&self, channel_id: &str, message_id: u64) -> HttpOutcome<()> {
        self.record(Call::Delete {
            channel_id: channel_id.to_string(),
            message_id,
            at: Instant::now(),
        });

        {
            let mut hook = self.stop_after_deletes.lock().unwrap();
            let fire = match hook.as_mut() {
                Some((remaining, _)) => {
                    *remaining = remaining.saturating_sub(1);
                    *remaining == 0
                }
                None => false,
            };
            if fire {
                if let Some((_, stop)) = hook.take() {
                    stop.stop();
                }
            }
        }

        if let Some(outcome) = self.scripted_deletes.lock().unwrap().pop_front() {
            return outcome;
        }

        let mut inbox = self.inbox.lock().unwrap();
        match inbox
            .iter()
            .position(|(_, m)| m.id == message_id && m.channel_id == channel_id)
        {
            Some(index) => {
                inbox.remove(index);
                HttpOutcome::Success(())
            }
            None => HttpOutcome::ClientError {
                status: 404,
                code: Some(10008),
                message: "Unknown Message".to_string(),
            },
        }
    }

    async fn list_guilds(&self) -> HttpOutcome<Vec<Guild>> {
        self.record(Call::ListGuilds);
        if let Some(outcome) = self.scripted_guilds.lock().unwrap().pop_front() {
            return outcome;
        }
        HttpOutcome::Success(self.guilds.clone())
    }

    async fn list_dm_channels(&self) -> HttpOutcome<Vec<DmChannel>> {
        self.record(Call::ListDms);
        if let Some(outcome) = self.scripted_dms.lock().unwrap().pop_front() {
            return outcome;
        }
        HttpOutcome::Success(self.dms.clone())
    }
}

pub fn message(id: u64, channel_id: &str, author_id: &str) -> Message {
    Message {
        id,
        channel_id: channel_id.to_string(),
        author_id: author_id.to_string(),
        content: format!("message {}", id),
        pinned: false,
        has_attachments: false,
        has_link: false,
        nsfw: false,
        kind: 0,
    }
}

/// `count` messages with ids `base+1..=base+count` in one channel.
pub fn messages(base: u64, count: u64, channel_id: &str, author_id: &str) -> Vec<Message> {
    (1..=count)
        .map(|i| message(base + i, channel_id, author_id))
        .collect()
}

pub fn page(messages: Vec<Message>) -> HttpOutcome<SearchPage> {
    let total = messages.len() as u64;
    page_of(messages, total)
}

/// A page whose reported total differs from the hits it carries.
pub fn page_of(messages: Vec<Message>, total_results: u64) -> HttpOutcome<SearchPage> {
    HttpOutcome::Success(SearchPage {
        total_results,
        messages,
    })
}

pub fn guild(id: &str, staff_only: bool) -> Guild {
    Guild {
        id: id.to_string(),
        name: format!("guild {}", id),
        staff_only,
    }
}

pub fn dm(id: &str) -> DmChannel {
    DmChannel {
        id: id.to_string(),
        name: format!("dm {}", id),
    }
}

pub fn dm_guild() -> &'static str {
    DM_GUILD
}

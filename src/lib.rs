//! Bulk deletion of your own Discord messages
//!
//! This library provides tools to:
//! - Expand a guild/channel/DM scope into sequential jobs
//! - Page through the message search endpoint and filter hits client-side
//! - Delete matches with bounded retries and rate-limit discipline
//! - Report progress through observer hooks and Prometheus metrics

pub mod batch;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod observer;
pub mod purger;
pub mod scope;
pub mod snowflake;
pub mod state;

// Re-export common types
pub use batch::{BatchOrchestrator, BatchReport};
pub use client::{DiscordApi, DiscordClient, HttpOutcome};
pub use config::{Configuration, ConfigurationBuilder, FileConfig};
pub use engine::JobEngine;
pub use error::{Error, Result};
pub use lock::RunLock;
pub use models::{DmChannel, Guild, Job, Message, SearchPage, SearchQuery, DM_GUILD};
pub use observer::{ChannelObserver, LogObserver, NoopObserver, RunEvent, RunObserver};
pub use purger::Purger;
pub use scope::ScopeResolver;
pub use state::{Phase, RunState, Stats, StopHandle};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;

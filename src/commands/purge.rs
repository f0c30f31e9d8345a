//! `purge` command: resolve the scope, confirm, then delete.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use crate::batch::BatchReport;
use crate::config::{Configuration, ConfigurationBuilder, FileConfig};
use crate::lock::RunLock;
use crate::models::Job;
use crate::observer::LogObserver;
use crate::purger::Purger;
use crate::snowflake;
use crate::state::{Phase, StopHandle};

/// Scope, filter and pacing flags shared by `purge` and `jobs`.
#[derive(Args, Debug, Clone, Default)]
pub struct PurgeArgs {
    /// Authorization token (fallback: DISCORD_TOKEN or purge.yml)
    #[arg(short, long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Only delete messages from this author id
    #[arg(short, long)]
    pub author_id: Option<String>,

    /// Guild id(s); `@me` targets direct messages. Omit to sweep everything.
    #[arg(short, long = "guild-id", value_delimiter = ',')]
    pub guild_ids: Vec<String>,

    /// Channel id(s) inside the single guild given with --guild-id
    #[arg(short, long = "channel-id", value_delimiter = ',')]
    pub channel_ids: Vec<String>,

    /// Only messages newer than this snowflake
    #[arg(long, conflicts_with = "min_age")]
    pub min_id: Option<String>,

    /// Only messages older than this snowflake
    #[arg(long, conflicts_with = "max_age")]
    pub max_id: Option<String>,

    /// Lower id bound expressed as an age in days
    #[arg(long)]
    pub min_age: Option<f64>,

    /// Upper id bound expressed as an age in days
    #[arg(long)]
    pub max_age: Option<f64>,

    /// Only messages containing this text
    #[arg(long)]
    pub content: Option<String>,

    /// Only messages matching this case-insensitive regex
    #[arg(long)]
    pub pattern: Option<String>,

    /// Only messages with a link
    #[arg(long, default_value_t = false)]
    pub has_link: bool,

    /// Only messages with an attachment
    #[arg(long, default_value_t = false)]
    pub has_file: bool,

    /// Include messages from NSFW channels
    #[arg(long, default_value_t = false)]
    pub include_nsfw: bool,

    /// Include pinned messages
    #[arg(long, default_value_t = false)]
    pub include_pinned: bool,

    /// Guild id(s) to leave untouched
    #[arg(long, value_delimiter = ',')]
    pub ignore_guild: Vec<String>,

    /// DM channel id(s) to leave untouched
    #[arg(long, value_delimiter = ',')]
    pub ignore_dm: Vec<String>,

    /// Skip direct messages when sweeping everything
    #[arg(long, default_value_t = false)]
    pub no_dms: bool,

    /// Pause before each search request, in milliseconds
    #[arg(long)]
    pub search_delay: Option<u64>,

    /// Pause between delete requests, in milliseconds
    #[arg(long)]
    pub delete_delay: Option<u64>,

    /// Attempts per message (and per search on transient errors)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Do not ask before deleting
    #[arg(long, default_value_t = false)]
    pub no_confirm: bool,

    /// YAML config file (default: purge.yml, then ../purge.yml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl PurgeArgs {
    /// Translate flags into a builder; file defaults fill the gaps.
    pub fn to_builder(&self, file: &FileConfig) -> crate::error::Result<ConfigurationBuilder> {
        let mut builder = Configuration::builder(self.token.clone().unwrap_or_default())
            .guild_ids(self.guild_ids.iter().cloned())
            .channel_ids(self.channel_ids.iter().cloned())
            .has_link(self.has_link)
            .has_file(self.has_file)
            .include_nsfw(self.include_nsfw)
            .include_pinned(self.include_pinned)
            .include_dms(!self.no_dms)
            .ask_for_confirmation(!self.no_confirm);

        if let Some(author) = &self.author_id {
            builder = builder.author_id(author.as_str());
        }
        if let Some(id) = &self.min_id {
            builder = builder.min_id(snowflake::parse(id)?);
        }
        if let Some(id) = &self.max_id {
            builder = builder.max_id(snowflake::parse(id)?);
        }
        if let Some(days) = self.min_age {
            builder = builder.min_age_days(days);
        }
        if let Some(days) = self.max_age {
            builder = builder.max_age_days(days);
        }
        if let Some(content) = &self.content {
            builder = builder.content(content.as_str());
        }
        if let Some(pattern) = &self.pattern {
            builder = builder.pattern(pattern.as_str());
        }
        for id in &self.ignore_guild {
            builder = builder.ignore_guild(id.as_str());
        }
        for id in &self.ignore_dm {
            builder = builder.ignore_dm(id.as_str());
        }
        if let Some(ms) = self.search_delay {
            builder = builder.search_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.delete_delay {
            builder = builder.delete_delay(Duration::from_millis(ms));
        }
        if let Some(attempts) = self.max_attempts {
            builder = builder.max_attempts(attempts);
        }

        Ok(builder.with_file_defaults(file))
    }

    pub fn load_configuration(&self) -> crate::error::Result<Configuration> {
        let file = match &self.config {
            Some(path) => FileConfig::load_from_file(path)?,
            None => FileConfig::load(),
        };
        self.to_builder(&file)?.build()
    }
}

pub async fn run(args: PurgeArgs) -> Result<()> {
    let config = args.load_configuration()?;
    let ask = config.ask_for_confirmation();

    let _lock = RunLock::acquire()?;
    let purger = Purger::new(config)?.with_observer(Arc::new(LogObserver));

    let jobs = purger.resolve().await?;
    if jobs.is_empty() {
        println!("Nothing to purge: the scope resolved to no channels.");
        return Ok(());
    }
    print_plan(&jobs);

    if ask && !confirm(jobs.len())? {
        println!("Cancelled.");
        return Ok(());
    }

    spawn_signal_listener(purger.stop_handle());

    let report = purger.run_jobs(jobs).await;

    print_report(&report);

    match (report.phase(), &report.state.failure) {
        (Phase::Failed, Some(err)) => Err(anyhow::anyhow!("purge failed: {}", err)),
        _ => Ok(()),
    }
}

fn print_plan(jobs: &[Job]) {
    println!("About to delete matching messages in {} scope(s):", jobs.len());
    for job in jobs.iter().take(20) {
        println!("  - {}", job);
    }
    if jobs.len() > 20 {
        println!("  ... and {} more", jobs.len() - 20);
    }
}

fn confirm(count: usize) -> io::Result<bool> {
    print!("Delete messages across {} scope(s)? This cannot be undone [y/N]: ", count);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Route Ctrl+C and SIGTERM into the stop flag; the engine finishes its
/// in-flight request and aborts.
fn spawn_signal_listener(stop: StopHandle) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("Shutdown signal received, stopping after the current request");
        stop.stop();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!("Failed to install SIGTERM handler: {}", err);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

fn print_report(report: &BatchReport) {
    let stats = report.stats();
    println!();
    println!("Purge {}", report.phase());
    println!(
        "  searched: {}  deleted: {}  failed: {}  skipped: {}",
        stats.searched, stats.deleted, stats.failed, stats.skipped
    );
    for (job, err) in report.failures() {
        println!("  {} failed: {}", job, err);
    }
    info!(
        phase = %report.phase(),
        jobs = report.jobs.len(),
        deleted = stats.deleted,
        "Purge finished"
    );
}

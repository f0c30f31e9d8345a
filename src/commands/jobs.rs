//! `jobs` command: show what a purge would touch without deleting anything.

use std::collections::HashMap;

use anyhow::Result;

use crate::commands::purge::PurgeArgs;
use crate::purger::Purger;

pub async fn run(args: PurgeArgs) -> Result<()> {
    let config = args.load_configuration()?;
    let purger = Purger::new(config)?;

    let jobs = purger.resolve().await?;
    if jobs.is_empty() {
        println!("The scope resolved to no channels.");
        return Ok(());
    }

    let dm_names: HashMap<String, String> = if jobs.iter().any(|job| job.is_dm()) {
        purger
            .dm_channels()
            .await?
            .into_iter()
            .map(|channel| (channel.id, channel.name))
            .collect()
    } else {
        HashMap::new()
    };

    println!("{} job(s):", jobs.len());
    for (index, job) in jobs.iter().enumerate() {
        let name = job
            .channel_id
            .as_ref()
            .filter(|_| job.is_dm())
            .and_then(|id| dm_names.get(id));
        match name {
            Some(name) if !name.is_empty() => println!("{:>4}. {} ({})", index + 1, job, name),
            _ => println!("{:>4}. {}", index + 1, job),
        }
    }
    Ok(())
}

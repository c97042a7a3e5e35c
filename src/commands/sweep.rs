//! The `sweep` command: run the stale session reaper.

use super::open_store;
use crate::cli::SweepArgs;
use crate::error::Result;
use crate::reaper;
use std::time::Duration;

pub fn cmd_sweep(args: SweepArgs) -> Result<()> {
    let (ctx, config) = open_store()?;

    let max_age_minutes = args
        .max_age_minutes
        .unwrap_or(config.session_max_age_minutes);
    let max_age = Duration::from_secs(max_age_minutes * 60);

    let reaped = reaper::sweep(&ctx, &config, max_age)?;

    if reaped.is_empty() {
        println!("No stale sessions (threshold: {} minutes).", max_age_minutes);
        return Ok(());
    }

    println!("Finalized {} stale session(s):", reaped.len());
    for record in &reaped {
        println!(
            "  {}  {}  last project: {}",
            record.id, record.status, record.project
        );
    }

    Ok(())
}

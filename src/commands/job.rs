//! The `job` commands: background-job bookkeeping against a session.

use super::open_store;
use crate::cli::{JobAction, JobCommand, JobDoneArgs, JobStartArgs, JobWaitArgs};
use crate::error::Result;
use crate::pending;
use std::time::Duration;

pub fn dispatch(job: JobCommand) -> Result<()> {
    match job.action {
        JobAction::Start(args) => cmd_job_start(args),
        JobAction::Done(args) => cmd_job_done(args),
        JobAction::Wait(args) => cmd_job_wait(args),
    }
}

fn cmd_job_start(args: JobStartArgs) -> Result<()> {
    let (ctx, config) = open_store()?;

    let count = pending::increment(&ctx, &args.session_id, &config)?;
    println!("Session {}: {} pending job(s).", args.session_id, count);
    Ok(())
}

fn cmd_job_done(args: JobDoneArgs) -> Result<()> {
    let (ctx, config) = open_store()?;

    let count = pending::decrement_or_clear(&ctx, &args.session_id, &config)?;
    println!("Session {}: {} pending job(s).", args.session_id, count);
    Ok(())
}

fn cmd_job_wait(args: JobWaitArgs) -> Result<()> {
    let (ctx, config) = open_store()?;

    let max_wait = args
        .max_wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.pending_max_wait());

    let drained = pending::wait_until_zero(
        &ctx,
        &args.session_id,
        max_wait,
        !args.lenient,
        &config,
    )?;

    // A timed-out wait is a soft failure: the caller proceeds degraded
    // rather than blocking forever, so the exit code stays zero.
    if drained {
        println!("Session {}: no pending jobs.", args.session_id);
    } else {
        println!(
            "Session {}: jobs still pending after {}ms.",
            args.session_id,
            max_wait.as_millis()
        );
    }

    Ok(())
}

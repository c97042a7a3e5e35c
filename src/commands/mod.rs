//! Command implementations for seslog.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Handlers are thin: they resolve the store context, load
//! the config, call into the store modules, and format output. All state
//! logic lives in the store modules themselves.

mod end;
mod job;
mod observe;
mod status;
mod sweep;

use crate::cli::{Command, RefsAction, RefsAddArgs, StartArgs};
use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{Result, SeslogError};
use crate::session;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Start(args) => cmd_start(args),
        Command::Observe(args) => observe::cmd_observe(args),
        Command::End(args) => end::cmd_end(args),
        Command::Job(job) => job::dispatch(job),
        Command::Refs(refs) => match refs.action {
            RefsAction::Add(args) => cmd_refs_add(args),
        },
        Command::Status(args) => status::cmd_status(args),
        Command::Sweep(args) => sweep::cmd_sweep(args),
    }
}

/// Resolve the store context and its configuration.
pub(crate) fn open_store() -> Result<(StoreContext, Config)> {
    let ctx = StoreContext::resolve()?;
    let config = Config::load(ctx.config_path())?;
    Ok((ctx, config))
}

fn cmd_start(args: StartArgs) -> Result<()> {
    let (ctx, _config) = open_store()?;

    let path = args
        .path
        .canonicalize()
        .map_err(|e| {
            SeslogError::UserError(format!(
                "project path '{}' is not accessible: {}",
                args.path.display(),
                e
            ))
        })?;

    let project = match args.project {
        Some(project) => project,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    };

    let record = session::start(&ctx, &args.session_id, &project, path)?;

    println!(
        "Started session {} (project: {}, started: {})",
        record.id,
        record.project,
        record.started_at.to_rfc3339()
    );
    Ok(())
}

fn cmd_refs_add(args: RefsAddArgs) -> Result<()> {
    let (ctx, _config) = open_store()?;

    let record = session::append_knowledge_refs(&ctx, &args.session_id, &args.refs)?
        .ok_or_else(|| {
            SeslogError::UserError(format!("unknown session '{}'", args.session_id))
        })?;

    println!(
        "Session {} now carries {} knowledge reference(s).",
        record.id,
        record.knowledge_refs.len()
    );
    Ok(())
}

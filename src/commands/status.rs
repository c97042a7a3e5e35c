//! The `status` command: list sessions or dump one session's state.

use super::open_store;
use crate::cli::StatusArgs;
use crate::context::StoreContext;
use crate::error::{Result, SeslogError};
use crate::observations;
use crate::session;

pub fn cmd_status(args: StatusArgs) -> Result<()> {
    let (ctx, _config) = open_store()?;

    match args.session_id {
        Some(session_id) => show_session(&ctx, &session_id),
        None => list_sessions(&ctx),
    }
}

fn show_session(ctx: &StoreContext, session_id: &str) -> Result<()> {
    let record = session::read(ctx, session_id)?.ok_or_else(|| {
        SeslogError::UserError(format!("unknown session '{}'", session_id))
    })?;

    let json = serde_json::to_string_pretty(&record).map_err(|e| {
        SeslogError::UserError(format!("failed to serialize session record: {}", e))
    })?;
    println!("{}", json);

    let observations = observations::read_all(ctx, session_id)?;
    let errors = observations.iter().filter(|o| o.is_error).count();
    println!(
        "Observations: {} ({} error{})",
        observations.len(),
        errors,
        if errors == 1 { "" } else { "s" }
    );

    Ok(())
}

fn list_sessions(ctx: &StoreContext) -> Result<()> {
    let names = ctx.list_session_names()?;

    if names.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!("Sessions ({}):", names.len());
    for name in names {
        match session::read_by_name(ctx, &name) {
            Ok(Some(record)) => {
                let observations = observations::read_all_by_name(ctx, &name)?;
                println!(
                    "  {}  {}  {} observation(s)  started {}",
                    record.id,
                    record.status,
                    observations.len(),
                    record.started_at.to_rfc3339()
                );
            }
            Ok(None) => {}
            Err(e) => {
                // One corrupt record must not hide the rest of the listing.
                println!("  {}  (unreadable record)", name);
                tracing::warn!(session = %name, error = %e, "unreadable session record");
            }
        }
    }

    Ok(())
}

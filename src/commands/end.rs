//! The `end` command: finalize a session and tear down its files.

use super::open_store;
use crate::cli::EndArgs;
use crate::error::{Result, SeslogError};
use crate::session::{self, EndKind};
use crate::pending;

pub fn cmd_end(args: EndArgs) -> Result<()> {
    let (ctx, config) = open_store()?;

    // Wait for detached background jobs before reading final state, so a
    // summarizer that is still writing gets to land its updates.
    let drained = pending::wait_until_zero(
        &ctx,
        &args.session_id,
        config.pending_max_wait(),
        true,
        &config,
    )?;
    if !drained {
        eprintln!("Warning: background jobs still pending after wait; finalizing anyway.");
    }

    if let Some(summary) = &args.summary {
        session::set_summary(&ctx, &args.session_id, summary)?;
    }

    let kind = if args.stopped {
        EndKind::Stopped
    } else {
        EndKind::Completed
    };

    let record = session::end(&ctx, &args.session_id, kind)?.ok_or_else(|| {
        SeslogError::UserError(format!("unknown session '{}'", args.session_id))
    })?;

    let json = serde_json::to_string_pretty(&record).map_err(|e| {
        SeslogError::UserError(format!("failed to serialize final record: {}", e))
    })?;
    println!("{}", json);

    if !args.keep_files {
        session::delete(&ctx, &args.session_id, &config)?;
    }

    Ok(())
}

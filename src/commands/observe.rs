//! The `observe` command: append one event to a session's log.

use super::open_store;
use crate::cli::ObserveArgs;
use crate::error::{Result, SeslogError};
use crate::observations::{self, AppendOutcome, Observation, ObservationCategory};
use std::io::Read;

pub fn cmd_observe(args: ObserveArgs) -> Result<()> {
    let (ctx, config) = open_store()?;

    let category = parse_category(&args.category)?;
    let payload = match args.payload {
        Some(payload) => payload,
        None => read_stdin_payload()?,
    };

    let observation =
        Observation::new(&args.tool, category, &payload).with_error(args.error);

    // A dropped observation is a soft failure by design: capture hooks must
    // never block or fail the workflow they are attached to.
    match observations::append(&ctx, &args.session_id, &observation, &config)? {
        AppendOutcome::Appended => {
            println!("Recorded observation {}", observation.id);
        }
        AppendOutcome::Dropped => {
            println!("Observation dropped: session log is busy");
        }
    }

    Ok(())
}

fn parse_category(s: &str) -> Result<ObservationCategory> {
    match s {
        "file_edit" => Ok(ObservationCategory::FileEdit),
        "command" => Ok(ObservationCategory::Command),
        "error" => Ok(ObservationCategory::Error),
        "other" => Ok(ObservationCategory::Other),
        other => Err(SeslogError::UserError(format!(
            "unknown category '{}' (expected file_edit, command, error, or other)",
            other
        ))),
    }
}

fn read_stdin_payload() -> Result<String> {
    let mut payload = String::new();
    std::io::stdin()
        .read_to_string(&mut payload)
        .map_err(|e| SeslogError::UserError(format!("failed to read payload from stdin: {}", e)))?;
    Ok(payload.trim_end().to_string())
}

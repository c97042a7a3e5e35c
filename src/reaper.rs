//! Stale session reaper.
//!
//! The host does not always deliver a session-end event: a crashed editor or
//! a killed hook can leave a session `Active` forever. The sweep finds
//! sessions with no recent activity, finalizes them as `Stopped`, and removes
//! their files through the same teardown path a normal session end uses —
//! including the pending-job barrier, so the reaper never deletes state a
//! background job is still writing to.
//!
//! Activity is judged by file modification times, not record contents: a
//! session whose log is still being appended to is alive even when its
//! metadata has not been touched in days.

use crate::config::Config;
use crate::context::StoreContext;
use crate::error::Result;
use crate::session::{self, EndKind, SessionRecord};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Finalize and remove every session inactive for longer than `max_age`.
///
/// Returns the finalized records. A session that fails to load or tear down
/// is logged and skipped so one corrupt session cannot abort the sweep.
pub fn sweep(ctx: &StoreContext, config: &Config, max_age: Duration) -> Result<Vec<SessionRecord>> {
    let mut finalized = Vec::new();

    for name in ctx.list_session_names()? {
        match sweep_one(ctx, config, &name, max_age) {
            Ok(Some(record)) => finalized.push(record),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(session = %name, error = %e, "skipping session during sweep");
            }
        }
    }

    Ok(finalized)
}

/// Sweep a single session addressed by derived name.
///
/// Returns the finalized record when the session was stale and removed,
/// `None` when it was still active recently (or vanished mid-sweep).
fn sweep_one(
    ctx: &StoreContext,
    config: &Config,
    derived_name: &str,
    max_age: Duration,
) -> Result<Option<SessionRecord>> {
    let meta_path = ctx.meta_path_for_name(derived_name);
    let log_path = ctx.log_path_for_name(derived_name);

    let Some(idle) = idle_time(&meta_path, &log_path) else {
        // Deleted between listing and inspection; nothing to do.
        return Ok(None);
    };

    if idle <= max_age {
        return Ok(None);
    }

    let Some(record) = session::read_by_name(ctx, derived_name)? else {
        return Ok(None);
    };

    // Force still-active sessions to Stopped; terminal ones pass through
    // unchanged (end is idempotent).
    let finalized = session::end(ctx, &record.id, EndKind::Stopped)?.unwrap_or(record);
    session::delete(ctx, &finalized.id, config)?;

    tracing::info!(
        session = %finalized.id,
        idle_secs = idle.as_secs(),
        "reaped stale session"
    );

    Ok(Some(finalized))
}

/// Time since the session's last activity: the newer of the metadata and
/// log modification times. `None` when the metadata file is gone.
fn idle_time(meta_path: &Path, log_path: &Path) -> Option<Duration> {
    let meta_mtime = mtime(meta_path)?;
    let last_activity = match mtime(log_path) {
        Some(log_mtime) => meta_mtime.max(log_mtime),
        None => meta_mtime,
    };

    SystemTime::now()
        .duration_since(last_activity)
        .ok()
        .or(Some(Duration::ZERO))
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

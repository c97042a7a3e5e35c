//! Session metadata store.
//!
//! One small JSON record per session, mutated only by atomic whole-record
//! replacement: every write serializes the full record and renames it into
//! place, so a concurrent reader sees either the previous record or the next
//! one. No component patches the record in place, and no component holds a
//! long-lived copy: each operation re-reads from disk, which keeps the store
//! correct across independently spawned processes.
//!
//! Concurrent `replace` calls race on last-rename-wins with no merge. That is
//! the contract: callers must not assume an interleaving when two processes
//! replace the same record at once.

use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{Result, SeslogError};
use crate::fs::atomic_write_file;
use crate::pending;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a session.
///
/// Created `Active`; transitions once, irreversibly, to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is in progress.
    Active,
    /// Session ended normally.
    Completed,
    /// Session was stopped (by the host or by the reaper).
    Stopped,
}

impl SessionStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session is being ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    /// Normal completion.
    Completed,
    /// Forced stop (host shutdown, reaper sweep).
    Stopped,
}

impl EndKind {
    fn status(&self) -> SessionStatus {
        match self {
            EndKind::Completed => SessionStatus::Completed,
            EndKind::Stopped => SessionStatus::Stopped,
        }
    }
}

/// The per-session metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identifier, as supplied by the host.
    pub id: String,

    /// Human-readable project name.
    pub project: String,

    /// Absolute path of the project the session ran in.
    pub project_path: PathBuf,

    /// When the session started (RFC3339).
    pub started_at: DateTime<Utc>,

    /// When the session ended; absent while active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Wall-clock session length in whole minutes, computed at end time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,

    /// Lifecycle status.
    pub status: SessionStatus,

    /// Session summary, set synchronously or overwritten by background work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Refreshed on every metadata write; used for liveness.
    pub updated_at: DateTime<Utc>,

    /// Artifact identifiers accumulated by background jobs before the
    /// session ends.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub knowledge_refs: Vec<String>,
}

impl SessionRecord {
    fn new(id: String, project: String, project_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            project,
            project_path,
            started_at: now,
            ended_at: None,
            duration_minutes: None,
            status: SessionStatus::Active,
            summary: None,
            updated_at: now,
            knowledge_refs: Vec::new(),
        }
    }
}

/// Start a session, writing a fresh `Active` record.
///
/// An existing record for the same identifier is replaced outright: the host
/// reuses identifiers only after the prior session is gone, and a leftover
/// record here means the prior run crashed before teardown.
pub fn start(
    ctx: &StoreContext,
    id: &str,
    project: &str,
    project_path: PathBuf,
) -> Result<SessionRecord> {
    let record = SessionRecord::new(id.to_string(), project.to_string(), project_path);
    replace(ctx, &record)?;
    Ok(record)
}

/// Read a session's metadata record.
///
/// An absent file is `None`. A file that fails to parse is a `DataError`:
/// for single-record reads the caller decides whether to skip or surface it.
pub fn read(ctx: &StoreContext, id: &str) -> Result<Option<SessionRecord>> {
    read_record_at(&ctx.meta_path(id))
}

/// Read a metadata record addressed by derived filename.
///
/// Used by the reaper, which discovers sessions from the directory listing.
pub fn read_by_name(ctx: &StoreContext, derived_name: &str) -> Result<Option<SessionRecord>> {
    read_record_at(&ctx.meta_path_for_name(derived_name))
}

fn read_record_at(path: &std::path::Path) -> Result<Option<SessionRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SeslogError::UserError(format!(
                "failed to read session record '{}': {}",
                path.display(),
                e
            )));
        }
    };

    let record = serde_json::from_str(&content).map_err(|e| {
        SeslogError::DataError(format!(
            "session record '{}' is unparsable: {}",
            path.display(),
            e
        ))
    })?;

    Ok(Some(record))
}

/// Atomically replace a session's record.
///
/// Refreshes `updated_at`, serializes the whole record, and renames it into
/// place. This is the only write path for metadata.
pub fn replace(ctx: &StoreContext, record: &SessionRecord) -> Result<()> {
    let mut record = record.clone();
    record.updated_at = Utc::now();

    let json = serde_json::to_string_pretty(&record).map_err(|e| {
        SeslogError::UserError(format!("failed to serialize session record: {}", e))
    })?;

    atomic_write_file(ctx.meta_path(&record.id), &json)
}

/// End a session, stamping the terminal state and duration.
///
/// Idempotent: a session that is already terminal is returned unchanged, end
/// time and all. Returns `None` for an unknown session.
pub fn end(ctx: &StoreContext, id: &str, kind: EndKind) -> Result<Option<SessionRecord>> {
    let Some(mut record) = read(ctx, id)? else {
        return Ok(None);
    };

    if record.status.is_terminal() {
        return Ok(Some(record));
    }

    let ended_at = Utc::now();
    record.status = kind.status();
    record.ended_at = Some(ended_at);
    record.duration_minutes = Some(whole_minutes(record.started_at, ended_at));
    replace(ctx, &record)?;

    Ok(Some(record))
}

/// Set or overwrite a session's summary.
///
/// Read-modify-replace; used both by the synchronous fast path at session
/// end and by background summarizers. Returns `None` for an unknown session.
pub fn set_summary(ctx: &StoreContext, id: &str, summary: &str) -> Result<Option<SessionRecord>> {
    let Some(mut record) = read(ctx, id)? else {
        return Ok(None);
    };

    record.summary = Some(summary.to_string());
    replace(ctx, &record)?;
    Ok(Some(record))
}

/// Append knowledge references to a session's record.
///
/// Background jobs call this before the session ends; the references are
/// merged into the final record at end time simply by surviving in it.
/// Duplicates are dropped, insertion order is preserved. Returns `None` for
/// an unknown session.
pub fn append_knowledge_refs(
    ctx: &StoreContext,
    id: &str,
    refs: &[String],
) -> Result<Option<SessionRecord>> {
    let Some(mut record) = read(ctx, id)? else {
        return Ok(None);
    };

    for r in refs {
        if !record.knowledge_refs.contains(r) {
            record.knowledge_refs.push(r.clone());
        }
    }

    replace(ctx, &record)?;
    Ok(Some(record))
}

/// Delete all of a session's files.
///
/// This is the single teardown path, shared by normal session end and the
/// reaper. It first waits on the pending-job barrier in conservative mode so
/// state a background job is still writing to is never deleted under it;
/// if the barrier times out the deletion proceeds anyway (degraded, bounded).
/// Missing files are ignored.
pub fn delete(ctx: &StoreContext, id: &str, config: &Config) -> Result<()> {
    let drained = pending::wait_until_zero(ctx, id, config.pending_max_wait(), true, config)?;
    if !drained {
        tracing::warn!(
            session = id,
            "pending-job barrier timed out; deleting session files anyway"
        );
    }

    let paths = [
        ctx.meta_path(id),
        ctx.log_path(id),
        ctx.pending_path(id),
        ctx.pending_lock_path(id),
        ctx.lock_path(id),
    ];

    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SeslogError::UserError(format!(
                    "failed to remove '{}': {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    Ok(())
}

/// Wall-clock delta in whole minutes, rounded half-up.
fn whole_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let seconds = end.signed_duration_since(start).num_seconds().max(0);
    (seconds + 30) / 60
}

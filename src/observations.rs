//! Append-only observation log.
//!
//! Each session has one NDJSON log file (one JSON object per line). Appends
//! are serialized by the session's observation lock so concurrent writers
//! never interleave partial records; reads parse every line independently
//! and skip anything unparsable, tolerating a writer that was killed
//! mid-record.
//!
//! The log is best-effort, not a durability guarantee: an append that cannot
//! get the lock in time reports the observation as dropped and the caller
//! moves on. An observation that did land is never mutated or individually
//! deleted; it disappears only with whole-session teardown.

use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{Result, SeslogError};
use crate::locks;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Category of a captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObservationCategory {
    /// A file was created or edited.
    FileEdit,
    /// A command or tool was executed.
    Command,
    /// An error was reported.
    Error,
    /// Anything else.
    #[default]
    Other,
}

impl std::fmt::Display for ObservationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservationCategory::FileEdit => write!(f, "file_edit"),
            ObservationCategory::Command => write!(f, "command"),
            ObservationCategory::Error => write!(f, "error"),
            ObservationCategory::Other => write!(f, "other"),
        }
    }
}

/// One captured event within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Unique observation identifier.
    pub id: String,

    /// RFC3339 timestamp when the observation was captured.
    pub ts: DateTime<Utc>,

    /// Name of the tool that produced the event.
    pub tool: String,

    /// Event category.
    pub category: ObservationCategory,

    /// Whether the event represents a failure.
    #[serde(default)]
    pub is_error: bool,

    /// Free-form event payload.
    pub payload: String,
}

impl Observation {
    /// Create a new observation with a fresh id and the current timestamp.
    ///
    /// The id combines the capture time in microseconds, the process id, and
    /// a per-process counter, which is unique across the handful of
    /// short-lived processes a session ever has.
    pub fn new(tool: &str, category: ObservationCategory, payload: &str) -> Self {
        static OBS_SEQ: AtomicU64 = AtomicU64::new(0);

        let ts = Utc::now();
        let seq = OBS_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!(
                "obs-{}-{}-{}",
                ts.timestamp_micros(),
                std::process::id(),
                seq
            ),
            ts,
            tool: tool.to_string(),
            category,
            is_error: false,
            payload: payload.to_string(),
        }
    }

    /// Mark the observation as an error event.
    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }

    /// Serialize the observation to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            SeslogError::UserError(format!("failed to serialize observation: {}", e))
        })
    }
}

/// Result of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The observation was written to the log.
    Appended,
    /// The observation-log lock could not be acquired in time; the
    /// observation was dropped.
    Dropped,
}

/// Append one observation to a session's log.
///
/// Acquires the session's observation lock, writes one NDJSON line with a
/// trailing newline, fsyncs, and releases. Lock contention past the timeout
/// is the soft-failure path (`Dropped`); filesystem failures propagate.
pub fn append(
    ctx: &StoreContext,
    session_id: &str,
    observation: &Observation,
    config: &Config,
) -> Result<AppendOutcome> {
    // Serialize before taking the lock; a serialization failure should not
    // cost other writers any hold time.
    let json_line = observation.to_ndjson_line()?;

    let guard = match locks::acquire(&ctx.lock_path(session_id), "append", config) {
        Ok(guard) => guard,
        Err(SeslogError::LockTimeout(holder)) => {
            tracing::warn!(
                session = session_id,
                holder = %holder,
                "observation dropped: log lock busy"
            );
            return Ok(AppendOutcome::Dropped);
        }
        Err(e) => return Err(e),
    };

    let log_path = ctx.log_path(session_id);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| {
            SeslogError::UserError(format!(
                "failed to open observation log '{}': {}",
                log_path.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        SeslogError::UserError(format!(
            "failed to write observation to '{}': {}",
            log_path.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        SeslogError::UserError(format!(
            "failed to sync observation log '{}': {}",
            log_path.display(),
            e
        ))
    })?;

    guard.release()?;
    Ok(AppendOutcome::Appended)
}

/// Read all observations for a session, in append order.
///
/// An absent log is an empty sequence. Blank lines are skipped silently;
/// lines that fail to parse (a writer killed mid-record leaves a truncated
/// tail) are skipped with a diagnostic so prior valid entries survive.
pub fn read_all(ctx: &StoreContext, session_id: &str) -> Result<Vec<Observation>> {
    read_all_at(&ctx.log_path(session_id))
}

/// Read a log addressed by derived name (reaper/status path).
pub fn read_all_by_name(ctx: &StoreContext, derived_name: &str) -> Result<Vec<Observation>> {
    read_all_at(&ctx.log_path_for_name(derived_name))
}

fn read_all_at(log_path: &std::path::Path) -> Result<Vec<Observation>> {
    let content = match std::fs::read_to_string(log_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SeslogError::UserError(format!(
                "failed to read observation log '{}': {}",
                log_path.display(),
                e
            )));
        }
    };

    let mut observations = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Observation>(line) {
            Ok(obs) => observations.push(obs),
            Err(e) => {
                tracing::warn!(
                    log = %log_path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping malformed observation record"
                );
            }
        }
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, StoreContext, Config) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::resolve_from(temp_dir.path()).unwrap();
        let config = Config {
            lock_timeout_ms: 5_000,
            lock_retry_min_ms: 1,
            lock_retry_max_ms: 5,
            ..Config::default()
        };
        (temp_dir, ctx, config)
    }

    #[test]
    fn observation_ids_are_unique() {
        let a = Observation::new("editor", ObservationCategory::FileEdit, "src/main.rs");
        let b = Observation::new("editor", ObservationCategory::FileEdit, "src/main.rs");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn ndjson_line_is_single_line() {
        let obs = Observation::new("shell", ObservationCategory::Command, "cargo build\nline2");
        let line = obs.to_ndjson_line().unwrap();
        assert!(!line.contains('\n'));

        let parsed: Observation = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.payload, "cargo build\nline2");
    }

    #[test]
    fn category_serializes_snake_case() {
        let obs = Observation::new("editor", ObservationCategory::FileEdit, "x");
        let line = obs.to_ndjson_line().unwrap();
        assert!(line.contains("\"file_edit\""));
    }

    #[test]
    fn append_then_read_roundtrip() {
        let (_temp_dir, ctx, config) = test_store();

        let obs = Observation::new("shell", ObservationCategory::Command, "cargo test")
            .with_error(false);
        let outcome = append(&ctx, "sess-1", &obs, &config).unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);

        let all = read_all(&ctx, "sess-1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, obs.id);
        assert_eq!(all[0].tool, "shell");
        assert_eq!(all[0].category, ObservationCategory::Command);
    }

    #[test]
    fn append_releases_the_lock() {
        let (_temp_dir, ctx, config) = test_store();

        let obs = Observation::new("shell", ObservationCategory::Command, "ls");
        append(&ctx, "sess-1", &obs, &config).unwrap();

        assert!(!ctx.lock_path("sess-1").exists());
    }

    #[test]
    fn append_with_busy_lock_drops_softly() {
        let (_temp_dir, ctx, _) = test_store();
        let config = Config {
            lock_timeout_ms: 50,
            lock_retry_min_ms: 1,
            lock_retry_max_ms: 5,
            ..Config::default()
        };

        let _holder = locks::acquire(&ctx.lock_path("sess-1"), "hold", &config).unwrap();

        let obs = Observation::new("shell", ObservationCategory::Command, "ls");
        let outcome = append(&ctx, "sess-1", &obs, &config).unwrap();

        assert_eq!(outcome, AppendOutcome::Dropped);
        assert!(read_all(&ctx, "sess-1").unwrap().is_empty());
    }

    #[test]
    fn read_missing_log_is_empty() {
        let (_temp_dir, ctx, _) = test_store();
        assert!(read_all(&ctx, "nope").unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped_in_order() {
        let (_temp_dir, ctx, config) = test_store();

        let first = Observation::new("editor", ObservationCategory::FileEdit, "a.rs");
        append(&ctx, "sess-1", &first, &config).unwrap();

        // A writer killed mid-record leaves a truncated line.
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(ctx.log_path("sess-1"))
                .unwrap();
            writeln!(file, "{{\"id\":\"obs-trunc").unwrap();
        }

        let second = Observation::new("editor", ObservationCategory::FileEdit, "b.rs");
        append(&ctx, "sess-1", &second, &config).unwrap();

        let all = read_all(&ctx, "sess-1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let (_temp_dir, ctx, config) = test_store();

        let obs = Observation::new("shell", ObservationCategory::Command, "ls");
        append(&ctx, "sess-1", &obs, &config).unwrap();

        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(ctx.log_path("sess-1"))
                .unwrap();
            writeln!(file).unwrap();
            writeln!(file, "   ").unwrap();
        }

        assert_eq!(read_all(&ctx, "sess-1").unwrap().len(), 1);
    }

    #[test]
    fn record_missing_required_field_is_skipped() {
        let (_temp_dir, ctx, _) = test_store();

        // No "tool" field.
        std::fs::write(
            ctx.log_path("sess-1"),
            "{\"id\":\"obs-1\",\"ts\":\"2026-01-01T00:00:00Z\",\"category\":\"other\",\"payload\":\"x\"}\n",
        )
        .unwrap();

        assert!(read_all(&ctx, "sess-1").unwrap().is_empty());
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let (_temp_dir, ctx, config) = test_store();

        let writers = 8;
        let per_writer = 5;

        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let ctx = StoreContext::resolve_from(&ctx.sessions_dir).unwrap();
                let config = config.clone();
                std::thread::spawn(move || {
                    for i in 0..per_writer {
                        let obs = Observation::new(
                            "worker",
                            ObservationCategory::Other,
                            &format!("writer {} event {}", w, i),
                        );
                        let outcome = append(&ctx, "sess-1", &obs, &config).unwrap();
                        assert_eq!(outcome, AppendOutcome::Appended);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let all = read_all(&ctx, "sess-1").unwrap();
        assert_eq!(all.len(), writers * per_writer);

        // No duplicates, no truncation.
        let mut ids: Vec<_> = all.iter().map(|o| o.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), writers * per_writer);

        // Per-writer relative order is append order.
        for w in 0..writers {
            let payloads: Vec<_> = all
                .iter()
                .filter(|o| o.payload.starts_with(&format!("writer {} ", w)))
                .map(|o| o.payload.clone())
                .collect();
            let mut sorted = payloads.clone();
            sorted.sort();
            assert_eq!(payloads, sorted);
        }
    }

    #[test]
    fn sessions_do_not_contend() {
        let (_temp_dir, ctx, _) = test_store();
        let config = Config {
            lock_timeout_ms: 50,
            lock_retry_min_ms: 1,
            lock_retry_max_ms: 5,
            ..Config::default()
        };

        // Holding one session's lock must not block another session.
        let _holder = locks::acquire(&ctx.lock_path("sess-1"), "hold", &config).unwrap();

        let obs = Observation::new("shell", ObservationCategory::Command, "ls");
        let outcome = append(&ctx, "sess-2", &obs, &config).unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);
    }
}

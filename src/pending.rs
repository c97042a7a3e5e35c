//! Pending-job counter: a cross-process reference count of in-flight
//! background jobs per session.
//!
//! The counter is a plain integer file. Both mutating operations hold the
//! counter's own lock (distinct from the observation-log lock, so job
//! bookkeeping never contends with observation writes) around the
//! read-modify-write. Decrementing to zero deletes the file: "no file" and
//! "zero" are the same state, so a finished session leaves nothing behind.
//!
//! `wait_until_zero` is the barrier a synchronous session-end path uses to
//! wait for detached background summarizers without any push channel: it
//! polls the file at a fixed interval up to a cap. Polling reads take no
//! lock, so they can race a concurrent write and see a partial value; in
//! conservative mode any unreadable or unparsable read counts as "still
//! pending", trading a slower barrier for never undercounting.

use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{Result, SeslogError};
use crate::locks;
use std::fs;
use std::time::{Duration, Instant};

/// Increment a session's pending-job count, returning the new count.
pub fn increment(ctx: &StoreContext, session_id: &str, config: &Config) -> Result<u64> {
    let guard = locks::acquire(&ctx.pending_lock_path(session_id), "job-start", config)?;

    let count = read_count_locked(ctx, session_id) + 1;
    let path = ctx.pending_path(session_id);
    fs::write(&path, count.to_string()).map_err(|e| {
        SeslogError::UserError(format!(
            "failed to write pending counter '{}': {}",
            path.display(),
            e
        ))
    })?;

    guard.release()?;
    Ok(count)
}

/// Decrement a session's pending-job count, returning the new count.
///
/// A count that would reach zero deletes the counter file entirely.
/// Decrementing an absent counter is a safe no-op.
pub fn decrement_or_clear(ctx: &StoreContext, session_id: &str, config: &Config) -> Result<u64> {
    let guard = locks::acquire(&ctx.pending_lock_path(session_id), "job-done", config)?;

    let count = read_count_locked(ctx, session_id);
    let path = ctx.pending_path(session_id);

    let remaining = if count <= 1 {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SeslogError::UserError(format!(
                    "failed to remove pending counter '{}': {}",
                    path.display(),
                    e
                )));
            }
        }
        0
    } else {
        let remaining = count - 1;
        fs::write(&path, remaining.to_string()).map_err(|e| {
            SeslogError::UserError(format!(
                "failed to write pending counter '{}': {}",
                path.display(),
                e
            ))
        })?;
        remaining
    };

    guard.release()?;
    Ok(remaining)
}

/// Current count as seen while holding the counter lock.
///
/// Absent or unparsable content reads as zero: the lock is held, so garbage
/// here is leftover damage from a crashed writer, and overwriting it with a
/// fresh integer is the recovery.
fn read_count_locked(ctx: &StoreContext, session_id: &str) -> u64 {
    match fs::read_to_string(ctx.pending_path(session_id)) {
        Ok(content) => content.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

/// Wait until the session's pending-job count reaches zero.
///
/// Polls every `pending_poll_ms` until the counter file is absent or parses
/// to zero, or until `max_wait` elapses. Returns `true` when the counter
/// drained, `false` on timeout (the caller proceeds, degraded).
///
/// With `conservative` set, an unreadable or unparsable counter counts as
/// "still pending" rather than "zero"; otherwise it counts as zero. Session
/// teardown uses conservative mode so a transient read error can never cause
/// premature deletion of state a background job is still writing.
pub fn wait_until_zero(
    ctx: &StoreContext,
    session_id: &str,
    max_wait: Duration,
    conservative: bool,
    config: &Config,
) -> Result<bool> {
    let deadline = Instant::now() + max_wait;
    let path = ctx.pending_path(session_id);

    loop {
        let pending = match fs::read_to_string(&path) {
            Ok(content) => match content.trim().parse::<u64>() {
                Ok(count) => count > 0,
                Err(_) => conservative,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(_) => conservative,
        };

        if !pending {
            return Ok(true);
        }

        if Instant::now() >= deadline {
            return Ok(false);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(config.pending_poll().min(remaining));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, StoreContext, Config) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::resolve_from(temp_dir.path()).unwrap();
        let config = Config {
            lock_retry_min_ms: 1,
            lock_retry_max_ms: 5,
            pending_poll_ms: 10,
            ..Config::default()
        };
        (temp_dir, ctx, config)
    }

    #[test]
    fn increment_creates_counter() {
        let (_temp_dir, ctx, config) = test_store();

        assert_eq!(increment(&ctx, "sess-1", &config).unwrap(), 1);
        assert_eq!(increment(&ctx, "sess-1", &config).unwrap(), 2);

        let content = fs::read_to_string(ctx.pending_path("sess-1")).unwrap();
        assert_eq!(content, "2");
    }

    #[test]
    fn balanced_decrements_leave_no_file() {
        let (_temp_dir, ctx, config) = test_store();

        for _ in 0..3 {
            increment(&ctx, "sess-1", &config).unwrap();
        }
        for expected in [2, 1, 0] {
            assert_eq!(decrement_or_clear(&ctx, "sess-1", &config).unwrap(), expected);
        }

        assert!(!ctx.pending_path("sess-1").exists());
    }

    #[test]
    fn extra_decrement_is_a_noop() {
        let (_temp_dir, ctx, config) = test_store();

        increment(&ctx, "sess-1", &config).unwrap();
        decrement_or_clear(&ctx, "sess-1", &config).unwrap();

        // One past zero: no file, no error.
        assert_eq!(decrement_or_clear(&ctx, "sess-1", &config).unwrap(), 0);
        assert!(!ctx.pending_path("sess-1").exists());
    }

    #[test]
    fn mutation_releases_counter_lock() {
        let (_temp_dir, ctx, config) = test_store();

        increment(&ctx, "sess-1", &config).unwrap();
        assert!(!ctx.pending_lock_path("sess-1").exists());

        decrement_or_clear(&ctx, "sess-1", &config).unwrap();
        assert!(!ctx.pending_lock_path("sess-1").exists());
    }

    #[test]
    fn garbage_counter_is_overwritten_under_lock() {
        let (_temp_dir, ctx, config) = test_store();

        fs::write(ctx.pending_path("sess-1"), "not a number").unwrap();
        assert_eq!(increment(&ctx, "sess-1", &config).unwrap(), 1);
    }

    #[test]
    fn wait_returns_immediately_when_absent() {
        let (_temp_dir, ctx, config) = test_store();

        let drained =
            wait_until_zero(&ctx, "sess-1", Duration::from_millis(500), true, &config).unwrap();
        assert!(drained);
    }

    #[test]
    fn wait_times_out_when_jobs_remain() {
        let (_temp_dir, ctx, config) = test_store();

        increment(&ctx, "sess-1", &config).unwrap();

        let started = Instant::now();
        let drained =
            wait_until_zero(&ctx, "sess-1", Duration::from_millis(100), true, &config).unwrap();

        assert!(!drained);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn wait_observes_concurrent_drain() {
        let (_temp_dir, ctx, config) = test_store();

        increment(&ctx, "sess-1", &config).unwrap();

        let worker = {
            let ctx = StoreContext::resolve_from(&ctx.sessions_dir).unwrap();
            let config = config.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(80));
                decrement_or_clear(&ctx, "sess-1", &config).unwrap();
            })
        };

        let drained =
            wait_until_zero(&ctx, "sess-1", Duration::from_secs(5), true, &config).unwrap();
        worker.join().unwrap();
        assert!(drained);
    }

    #[test]
    fn conservative_wait_treats_garbage_as_pending() {
        let (_temp_dir, ctx, config) = test_store();

        // A partial value from a concurrent write must not read as "zero".
        fs::write(ctx.pending_path("sess-1"), "1\u{fffd}garbage").unwrap();

        let drained =
            wait_until_zero(&ctx, "sess-1", Duration::from_millis(100), true, &config).unwrap();
        assert!(!drained);
    }

    #[test]
    fn lenient_wait_treats_garbage_as_zero() {
        let (_temp_dir, ctx, config) = test_store();

        fs::write(ctx.pending_path("sess-1"), "garbage").unwrap();

        let drained =
            wait_until_zero(&ctx, "sess-1", Duration::from_millis(100), false, &config).unwrap();
        assert!(drained);
    }

    #[test]
    fn conservative_wait_recovers_after_garbage_clears() {
        let (_temp_dir, ctx, config) = test_store();

        fs::write(ctx.pending_path("sess-1"), "garbage").unwrap();

        let fixer = {
            let ctx = StoreContext::resolve_from(&ctx.sessions_dir).unwrap();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(60));
                fs::remove_file(ctx.pending_path("sess-1")).unwrap();
            })
        };

        let drained =
            wait_until_zero(&ctx, "sess-1", Duration::from_secs(5), true, &config).unwrap();
        fixer.join().unwrap();
        assert!(drained);
    }

    #[test]
    fn concurrent_increments_and_decrements_balance() {
        let (_temp_dir, ctx, config) = test_store();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let ctx = StoreContext::resolve_from(&ctx.sessions_dir).unwrap();
                let config = config.clone();
                std::thread::spawn(move || {
                    for _ in 0..4 {
                        increment(&ctx, "sess-1", &config).unwrap();
                        decrement_or_clear(&ctx, "sess-1", &config).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // Every start was matched by a finish; the counter must be gone or zero.
        let drained =
            wait_until_zero(&ctx, "sess-1", Duration::from_millis(100), true, &config).unwrap();
        assert!(drained);
    }
}

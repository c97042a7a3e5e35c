//! Locking subsystem for seslog.
//!
//! Hook processes coordinate exclusively through the filesystem, so mutual
//! exclusion is built on the one primitive every filesystem guarantees
//! atomic: exclusive file creation (**create_new**). A lock is a marker file;
//! creating it is acquiring it, deleting it is releasing it.
//!
//! # Lock Files
//!
//! Each session has two markers in the sessions directory:
//! - `<derived>.lock` — serializes observation-log appends
//! - `<derived>.pending.lock` — serializes pending-counter mutations
//!
//! Each marker contains JSON metadata:
//! - `owner`: writer identity (`user@HOST`)
//! - `pid`: process id of the holder
//! - `acquired_at`: RFC3339 timestamp
//! - `purpose`: the operation being performed (append/job-start/job-done/...)
//!
//! # Bounded wait and stale reclamation
//!
//! Acquisition retries with a jittered sleep until a configurable timeout.
//! A marker older than the staleness threshold is presumed abandoned by a
//! crashed holder and is forcibly removed, then acquisition retries
//! immediately. Reclamation leaves a narrow window right at the staleness
//! boundary where two processes can both believe they hold the lock; with
//! millisecond hold times and a 30s threshold this window is accepted rather
//! than closed with fencing tokens.
//!
//! # RAII Guards
//!
//! Locks are managed through guard objects that release on drop. Release is
//! best-effort: a marker that is already gone was reclaimed as stale by
//! another party, which is not an error.

use crate::config::Config;
use crate::error::{Result, SeslogError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Metadata stored in lock marker files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
    /// Writer identity (`user@HOST`).
    pub owner: String,

    /// Process id of the lock holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was acquired (RFC3339).
    pub acquired_at: DateTime<Utc>,

    /// The operation the holder is performing.
    pub purpose: String,
}

impl LockMetadata {
    /// Create new lock metadata with the current timestamp.
    pub fn new(purpose: &str) -> Self {
        Self {
            owner: writer_identity(),
            pid: Some(std::process::id()),
            acquired_at: Utc::now(),
            purpose: purpose.to_string(),
        }
    }

    /// Parse lock metadata from a marker file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SeslogError::UserError(format!(
                "failed to read lock file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            SeslogError::DataError(format!(
                "failed to parse lock file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Serialize lock metadata to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            SeslogError::UserError(format!("failed to serialize lock metadata: {}", e))
        })
    }

    /// Age of the lock relative to now.
    pub fn age(&self) -> ChronoDuration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Whether the lock is older than the staleness threshold.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.age().num_milliseconds() > threshold.as_millis() as i64
    }
}

/// Get the writer identity string for lock metadata.
fn writer_identity() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// RAII guard for a lock marker.
///
/// When dropped, the marker is deleted. A marker that is already gone is
/// tolerated; any other deletion failure is logged, never panicked on.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Get the path to the lock marker.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Manually release the lock.
    ///
    /// A missing marker is not an error: it may have been reclaimed as stale
    /// by another acquirer while this process was descheduled.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SeslogError::LockError(format!(
                "failed to release lock '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                lock = %self.path.display(),
                error = %e,
                "failed to release lock marker"
            );
        }
    }
}

/// Acquire a lock marker, waiting up to the configured timeout.
///
/// Attempts exclusive creation of the marker. While the marker exists and is
/// not stale, the caller sleeps a jittered interval and retries; once the
/// timeout elapses acquisition fails with `LockTimeout`. A marker older than
/// the staleness threshold is removed and acquisition retries immediately.
///
/// # Arguments
///
/// * `lock_path` - Path to the lock marker
/// * `purpose` - The operation being performed (recorded in the marker)
/// * `config` - Timing knobs: timeout, staleness threshold, retry window
pub fn acquire(lock_path: &Path, purpose: &str, config: &Config) -> Result<LockGuard> {
    let deadline = Instant::now() + config.lock_timeout();

    loop {
        match try_create_marker(lock_path, purpose) {
            Ok(guard) => return Ok(guard),
            Err(CreateMarkerError::Held) => {}
            Err(CreateMarkerError::Other(err)) => return Err(err),
        }

        if reclaim_if_stale(lock_path, config.lock_stale()) {
            continue;
        }

        if Instant::now() >= deadline {
            let holder = match LockMetadata::from_file(lock_path) {
                Ok(meta) => format!(
                    "held by {} (pid {}, purpose {}, acquired {})",
                    meta.owner,
                    meta.pid.map_or_else(|| "?".to_string(), |p| p.to_string()),
                    meta.purpose,
                    meta.acquired_at.to_rfc3339()
                ),
                Err(_) => format!("held at {}", lock_path.display()),
            };
            return Err(SeslogError::LockTimeout(holder));
        }

        let sleep_ms = rand::thread_rng()
            .gen_range(config.lock_retry_min_ms..=config.lock_retry_max_ms);
        std::thread::sleep(Duration::from_millis(sleep_ms));
    }
}

enum CreateMarkerError {
    /// Marker already exists; another process holds the lock.
    Held,
    /// Non-contention failure (permissions, disk, serialization).
    Other(SeslogError),
}

/// One exclusive-create attempt.
fn try_create_marker(lock_path: &Path, purpose: &str) -> std::result::Result<LockGuard, CreateMarkerError> {
    if let Some(parent) = lock_path.parent()
        && !parent.exists()
        && let Err(e) = fs::create_dir_all(parent)
    {
        return Err(CreateMarkerError::Other(SeslogError::UserError(format!(
            "failed to create lock directory '{}': {}",
            parent.display(),
            e
        ))));
    }

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(CreateMarkerError::Held);
        }
        Err(e) => {
            return Err(CreateMarkerError::Other(SeslogError::LockError(format!(
                "failed to create lock '{}': {}",
                lock_path.display(),
                e
            ))));
        }
    };

    let metadata = LockMetadata::new(purpose);
    let json = match metadata.to_json() {
        Ok(json) => json,
        Err(e) => {
            let _ = fs::remove_file(lock_path);
            return Err(CreateMarkerError::Other(e));
        }
    };

    if let Err(e) = file.write_all(json.as_bytes()).and_then(|()| file.sync_all()) {
        let _ = fs::remove_file(lock_path);
        return Err(CreateMarkerError::Other(SeslogError::LockError(format!(
            "failed to write lock metadata to '{}': {}",
            lock_path.display(),
            e
        ))));
    }

    Ok(LockGuard::new(lock_path.to_path_buf()))
}

/// Remove the marker if it is older than the staleness threshold.
///
/// Age comes from the marker's own timestamp; if the metadata is unreadable
/// (the holder may have died mid-write) the file's modification time is used
/// instead. Returns true when the marker was removed and acquisition should
/// retry immediately.
fn reclaim_if_stale(lock_path: &Path, threshold: Duration) -> bool {
    let stale = match LockMetadata::from_file(lock_path) {
        Ok(meta) => meta.is_stale(threshold),
        Err(_) => marker_mtime_age(lock_path).is_some_and(|age| age > threshold),
    };

    if !stale {
        return false;
    }

    tracing::warn!(lock = %lock_path.display(), "reclaiming stale lock marker");
    match fs::remove_file(lock_path) {
        Ok(()) => true,
        // Someone else reclaimed it first; still worth retrying immediately.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(_) => false,
    }
}

/// Age of the marker by filesystem modification time.
fn marker_mtime_age(lock_path: &Path) -> Option<Duration> {
    let modified = fs::metadata(lock_path).ok()?.modified().ok()?;
    std::time::SystemTime::now().duration_since(modified).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_config() -> Config {
        Config {
            lock_timeout_ms: 200,
            lock_stale_ms: 10_000,
            lock_retry_min_ms: 5,
            lock_retry_max_ms: 15,
            ..Config::default()
        }
    }

    #[test]
    fn metadata_records_writer_identity() {
        let meta = LockMetadata::new("append");

        assert!(meta.owner.contains('@'));
        assert!(meta.pid.is_some());
        assert_eq!(meta.purpose, "append");
        assert!(meta.age().num_seconds() < 60);
    }

    #[test]
    fn metadata_json_roundtrip() {
        let meta = LockMetadata::new("job-start");
        let json = meta.to_json().unwrap();

        let parsed: LockMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.purpose, "job-start");
        assert_eq!(parsed.owner, meta.owner);
    }

    #[test]
    fn metadata_staleness_threshold() {
        let mut meta = LockMetadata::new("append");
        assert!(!meta.is_stale(Duration::from_secs(30)));

        meta.acquired_at = Utc::now() - ChronoDuration::seconds(60);
        assert!(meta.is_stale(Duration::from_secs(30)));
        assert!(!meta.is_stale(Duration::from_secs(120)));
    }

    #[test]
    fn acquire_creates_and_drop_removes() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");

        let guard = acquire(&lock_path, "append", &fast_config()).unwrap();
        assert!(lock_path.exists());
        assert_eq!(guard.path(), lock_path);

        let meta = LockMetadata::from_file(&lock_path).unwrap();
        assert_eq!(meta.purpose, "append");

        drop(guard);
        assert!(!lock_path.exists());
    }

    #[test]
    fn acquire_held_lock_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");
        let config = fast_config();

        let _guard = acquire(&lock_path, "first", &config).unwrap();

        let started = Instant::now();
        let result = acquire(&lock_path, "second", &config);
        let waited = started.elapsed();

        assert!(matches!(result, Err(SeslogError::LockTimeout(_))));
        assert!(waited >= Duration::from_millis(200));
        // Bounded wait: nowhere near the staleness threshold.
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn acquire_after_release_succeeds() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");
        let config = fast_config();

        let guard = acquire(&lock_path, "first", &config).unwrap();
        drop(guard);

        let guard = acquire(&lock_path, "second", &config).unwrap();
        guard.release().unwrap();
        assert!(!lock_path.exists());
    }

    #[test]
    fn stale_marker_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");
        let config = Config {
            lock_stale_ms: 1_000,
            ..fast_config()
        };

        // Simulate a crashed holder: marker exists, holder is long gone.
        let abandoned = LockMetadata {
            owner: "ghost@host".to_string(),
            pid: Some(99_999),
            acquired_at: Utc::now() - ChronoDuration::seconds(30),
            purpose: "append".to_string(),
        };
        fs::write(&lock_path, abandoned.to_json().unwrap()).unwrap();

        let guard = acquire(&lock_path, "takeover", &config).unwrap();

        let meta = LockMetadata::from_file(&lock_path).unwrap();
        assert_eq!(meta.purpose, "takeover");
        drop(guard);
    }

    #[test]
    fn fresh_marker_is_not_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");
        let config = fast_config();

        let holder = LockMetadata::new("append");
        fs::write(&lock_path, holder.to_json().unwrap()).unwrap();

        let result = acquire(&lock_path, "contender", &config);
        assert!(matches!(result, Err(SeslogError::LockTimeout(_))));
        assert!(lock_path.exists());
    }

    #[test]
    fn unparsable_marker_reclaimed_by_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");
        let config = Config {
            lock_timeout_ms: 2_000,
            lock_stale_ms: 50,
            lock_retry_min_ms: 5,
            lock_retry_max_ms: 15,
            ..Config::default()
        };

        // A holder killed mid-write leaves garbage with no timestamp.
        fs::write(&lock_path, "{truncated").unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let guard = acquire(&lock_path, "takeover", &config).unwrap();
        drop(guard);
    }

    #[test]
    fn release_after_reclaim_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");

        let guard = acquire(&lock_path, "append", &fast_config()).unwrap();

        // Another party reclaims the marker out from under us.
        fs::remove_file(&lock_path).unwrap();

        assert!(guard.release().is_ok());
    }

    #[test]
    fn contending_threads_serialize() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("s1.lock");
        let config = Config {
            lock_timeout_ms: 5_000,
            ..fast_config()
        };

        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let max_seen = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock_path = lock_path.clone();
                let config = config.clone();
                let counter = counter.clone();
                let max_seen = max_seen.clone();
                std::thread::spawn(move || {
                    let _guard = acquire(&lock_path, "test", &config).unwrap();
                    let inside = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                    max_seen.fetch_max(inside, std::sync::atomic::Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_seen.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!lock_path.exists());
    }
}

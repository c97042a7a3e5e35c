//! Store directory resolution and per-session path derivation.
//!
//! Every seslog process is short-lived and independently spawned, so there is
//! no shared in-memory state: all participants resolve the same sessions
//! directory and address the same files. This module is the single source of
//! truth for that layout.
//!
//! # Derived filenames
//!
//! Session identifiers arrive from an untrusted host and may contain path
//! separators, `..` segments, or characters that are unsafe in filenames. All
//! per-session files are therefore addressed by a derived name combining a
//! sanitized human-legible prefix with a truncated SHA-256 of the full id:
//!
//! ```text
//! <prefix>-<hash16>.meta       atomically replaced metadata record
//! <prefix>-<hash16>.log        append-only NDJSON observations
//! <prefix>-<hash16>.lock       transient observation-log lock
//! <prefix>-<hash16>.pending    transient pending-job counter
//! <prefix>-<hash16>.pending.lock  transient counter lock
//! ```
//!
//! The hash makes distinct ids collision-resistant even when their sanitized
//! prefixes coincide; the prefix keeps the directory debuggable by eye.

use crate::error::{Result, SeslogError};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Environment variable overriding the sessions directory.
pub const STORE_DIR_ENV: &str = "SESLOG_DIR";

/// Default store location under the user's home directory.
pub const DEFAULT_STORE_SUBDIR: &str = ".seslog/sessions";

/// Length of the sanitized human-legible prefix.
const NAME_PREFIX_LEN: usize = 12;

/// Hex characters of SHA-256 kept in the derived name.
const NAME_HASH_LEN: usize = 16;

/// Resolved paths for the session store.
#[derive(Debug, Clone)]
pub struct StoreContext {
    /// Absolute path to the directory holding all per-session files.
    pub sessions_dir: PathBuf,
}

impl StoreContext {
    /// Resolve the store context from the environment.
    ///
    /// Uses `SESLOG_DIR` when set, otherwise `~/.seslog/sessions`. The
    /// directory is created if missing so hook processes never race on
    /// first use.
    pub fn resolve() -> Result<Self> {
        let sessions_dir = match std::env::var_os(STORE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir()
                .ok_or_else(|| {
                    SeslogError::UserError(
                        "could not determine home directory; set SESLOG_DIR".to_string(),
                    )
                })?
                .join(DEFAULT_STORE_SUBDIR),
        };

        Self::resolve_from(sessions_dir)
    }

    /// Resolve the store context at a specific directory.
    ///
    /// This is the entry point used by tests and by embedders that manage
    /// their own layout.
    pub fn resolve_from<P: AsRef<Path>>(sessions_dir: P) -> Result<Self> {
        let sessions_dir = sessions_dir.as_ref().to_path_buf();

        if !sessions_dir.exists() {
            std::fs::create_dir_all(&sessions_dir).map_err(|e| {
                SeslogError::UserError(format!(
                    "failed to create sessions directory '{}': {}",
                    sessions_dir.display(),
                    e
                ))
            })?;
        }

        Ok(Self { sessions_dir })
    }

    /// Compute the derived filename stem for a session identifier.
    pub fn derived_name(session_id: &str) -> String {
        let mut prefix: String = session_id
            .chars()
            .take(NAME_PREFIX_LEN)
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        if prefix.is_empty() {
            prefix = "session".to_string();
        }

        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        let digest = hex::encode(hasher.finalize());

        format!("{}-{}", prefix, &digest[..NAME_HASH_LEN])
    }

    /// Path to the config file at the store root.
    pub fn config_path(&self) -> PathBuf {
        self.sessions_dir.join("config.yaml")
    }

    /// Path to a session's metadata record.
    pub fn meta_path(&self, session_id: &str) -> PathBuf {
        self.session_file(session_id, "meta")
    }

    /// Path to a session's observation log.
    pub fn log_path(&self, session_id: &str) -> PathBuf {
        self.session_file(session_id, "log")
    }

    /// Path to a session's observation-log lock marker.
    pub fn lock_path(&self, session_id: &str) -> PathBuf {
        self.session_file(session_id, "lock")
    }

    /// Path to a session's pending-job counter.
    pub fn pending_path(&self, session_id: &str) -> PathBuf {
        self.session_file(session_id, "pending")
    }

    /// Path to a session's pending-counter lock marker.
    pub fn pending_lock_path(&self, session_id: &str) -> PathBuf {
        self.session_file(session_id, "pending.lock")
    }

    fn session_file(&self, session_id: &str, extension: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.{}", Self::derived_name(session_id), extension))
    }

    /// List the derived names of all sessions with a metadata record.
    ///
    /// Used by the reaper and the status command; order is unspecified.
    pub fn list_session_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        if !self.sessions_dir.exists() {
            return Ok(names);
        }

        let entries = std::fs::read_dir(&self.sessions_dir).map_err(|e| {
            SeslogError::UserError(format!(
                "failed to read sessions directory '{}': {}",
                self.sessions_dir.display(),
                e
            ))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                SeslogError::UserError(format!("failed to read sessions directory entry: {}", e))
            })?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Path to a metadata record addressed by derived name.
    ///
    /// The reaper discovers sessions by directory listing, where only the
    /// derived name is known.
    pub fn meta_path_for_name(&self, derived_name: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.meta", derived_name))
    }

    /// Path to an observation log addressed by derived name.
    pub fn log_path_for_name(&self, derived_name: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.log", derived_name))
    }
}

//! Configuration model for seslog.
//!
//! This module defines the Config struct that represents an optional
//! `config.yaml` at the root of the sessions directory. It supports
//! forward-compatible YAML parsing (unknown fields are ignored), sensible
//! defaults for every field, and validation of timing values.
//!
//! All values are timing knobs: the store has no behavioral switches, only
//! bounds on how long each blocking primitive is allowed to wait.

use crate::error::{Result, SeslogError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_lock_stale_ms() -> u64 {
    30_000
}

fn default_lock_retry_min_ms() -> u64 {
    25
}

fn default_lock_retry_max_ms() -> u64 {
    100
}

fn default_pending_poll_ms() -> u64 {
    250
}

fn default_pending_max_wait_ms() -> u64 {
    120_000
}

fn default_session_max_age_minutes() -> u64 {
    1_440
}

/// Timing configuration for the session store.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum time to wait for a lock before giving up (milliseconds).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Age past which a lock marker is presumed abandoned and reclaimed.
    #[serde(default = "default_lock_stale_ms")]
    pub lock_stale_ms: u64,

    /// Lower bound of the jittered sleep between lock retries.
    #[serde(default = "default_lock_retry_min_ms")]
    pub lock_retry_min_ms: u64,

    /// Upper bound of the jittered sleep between lock retries.
    #[serde(default = "default_lock_retry_max_ms")]
    pub lock_retry_max_ms: u64,

    /// Interval between pending-counter polls while waiting for zero.
    #[serde(default = "default_pending_poll_ms")]
    pub pending_poll_ms: u64,

    /// Maximum time the wait-until-zero barrier blocks before proceeding.
    #[serde(default = "default_pending_max_wait_ms")]
    pub pending_max_wait_ms: u64,

    /// Default inactivity threshold for the stale-session sweep (minutes).
    #[serde(default = "default_session_max_age_minutes")]
    pub session_max_age_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_stale_ms: default_lock_stale_ms(),
            lock_retry_min_ms: default_lock_retry_min_ms(),
            lock_retry_max_ms: default_lock_retry_max_ms(),
            pending_poll_ms: default_pending_poll_ms(),
            pending_max_wait_ms: default_pending_max_wait_ms(),
            session_max_age_minutes: default_session_max_age_minutes(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Returns the defaults when the file does not exist. A file that exists
    /// but fails to parse is an error: silently ignoring it would make the
    /// store run with timings the operator did not choose.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SeslogError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            SeslogError::UserError(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("lock_timeout_ms", self.lock_timeout_ms),
            ("lock_stale_ms", self.lock_stale_ms),
            ("lock_retry_min_ms", self.lock_retry_min_ms),
            ("lock_retry_max_ms", self.lock_retry_max_ms),
            ("pending_poll_ms", self.pending_poll_ms),
            ("pending_max_wait_ms", self.pending_max_wait_ms),
            ("session_max_age_minutes", self.session_max_age_minutes),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(SeslogError::UserError(format!(
                    "invalid config: {} must be greater than zero",
                    name
                )));
            }
        }

        if self.lock_retry_min_ms > self.lock_retry_max_ms {
            return Err(SeslogError::UserError(format!(
                "invalid config: lock_retry_min_ms ({}) exceeds lock_retry_max_ms ({})",
                self.lock_retry_min_ms, self.lock_retry_max_ms
            )));
        }

        Ok(())
    }

    /// Lock acquisition timeout as a `Duration`.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Lock staleness threshold as a `Duration`.
    pub fn lock_stale(&self) -> Duration {
        Duration::from_millis(self.lock_stale_ms)
    }

    /// Pending-counter poll interval as a `Duration`.
    pub fn pending_poll(&self) -> Duration {
        Duration::from_millis(self.pending_poll_ms)
    }

    /// Pending-counter barrier cap as a `Duration`.
    pub fn pending_max_wait(&self) -> Duration {
        Duration::from_millis(self.pending_max_wait_ms)
    }
}

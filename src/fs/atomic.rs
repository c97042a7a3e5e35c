//! Atomic file writes for session state.
//!
//! Every metadata write follows write-temp-then-rename:
//! 1. Write content to a uniquely named temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. Rename over the target
//!
//! The rename is the atomicity boundary: a reader either sees the old record
//! or the new one, never a partial write. Source and target must live on the
//! same filesystem, which holds because the temp file is created as a sibling
//! of the target. A crash between steps can leave a `.tmp` file behind; the
//! unique suffix keeps concurrent writers from clobbering each other's temps.

use crate::error::{Result, SeslogError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomically write bytes to a file.
///
/// Creates the parent directory if needed, writes to a sibling temp file,
/// fsyncs, and renames into place. The target is never observable in a
/// half-written state.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            SeslogError::UserError(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = temp_sibling(path)?;
    write_and_sync(&temp_path, content)?;
    replace_by_rename(&temp_path, path)
}

/// Atomically write a string to a file.
///
/// Convenience wrapper around `atomic_write` for string content.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Build a unique temp path next to the target.
///
/// The suffix combines the process id with a per-process counter so two
/// processes (or two threads) replacing the same record never share a temp
/// file.
fn temp_sibling(target: &Path) -> Result<PathBuf> {
    static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SeslogError::UserError("invalid file path".to_string()))?;

    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let temp_name = format!(".{}.{}.{}.tmp", filename, std::process::id(), seq);
    Ok(parent.join(temp_name))
}

/// Write content to a file and fsync it.
fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        SeslogError::UserError(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        SeslogError::UserError(format!("failed to write temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        SeslogError::UserError(format!("failed to sync temporary file: {}", e))
    })?;

    Ok(())
}

/// Rename the temp file over the target.
///
/// On POSIX `rename()` atomically replaces an existing destination. The
/// parent directory is synced afterwards so the new directory entry is
/// durable too.
#[cfg(unix)]
fn replace_by_rename(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        SeslogError::UserError(format!(
            "failed to replace '{}': {}",
            target.display(),
            e
        ))
    })?;

    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Non-POSIX fallback: remove the destination first, then rename.
///
/// This leaves a window where the target is briefly absent, which readers
/// already tolerate (an absent record reads as `None`).
#[cfg(not(unix))]
fn replace_by_rename(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        let _ = fs::remove_file(target);
    }

    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        SeslogError::UserError(format!(
            "failed to replace '{}': {}",
            target.display(),
            e
        ))
    })
}

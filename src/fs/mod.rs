//! Filesystem helpers for seslog.
//!
//! Session state is plain files, so corruption resistance lives here:
//! atomic replace-by-rename is the only way metadata ever reaches disk.

mod atomic;

pub use atomic::{atomic_write, atomic_write_file};

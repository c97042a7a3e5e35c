//! Error types for the seslog CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! The variants follow the store's error taxonomy: user/filesystem errors,
//! malformed persisted data, and lock contention.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for seslog operations.
///
/// Each variant maps to a specific exit code. Lock contention is split into
/// its own variants so callers that treat contention as a soft failure
/// (observation appends) can match on it without string inspection.
#[derive(Error, Debug)]
pub enum SeslogError {
    /// User provided invalid arguments, or a filesystem operation failed.
    #[error("{0}")]
    UserError(String),

    /// A persisted record failed to parse.
    #[error("Malformed session data: {0}")]
    DataError(String),

    /// Lock acquisition timed out while another holder was active.
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(String),

    /// Lock file could not be created or written for a non-contention reason.
    #[error("Lock operation failed: {0}")]
    LockError(String),
}

impl SeslogError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SeslogError::UserError(_) => exit_codes::USER_ERROR,
            SeslogError::DataError(_) => exit_codes::DATA_ERROR,
            SeslogError::LockTimeout(_) => exit_codes::LOCK_FAILURE,
            SeslogError::LockError(_) => exit_codes::LOCK_FAILURE,
        }
    }
}

/// Result type alias for seslog operations.
pub type Result<T> = std::result::Result<T, SeslogError>;

//! Exit code constants for the seslog CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, filesystem failure)
//! - 2: Malformed persisted data surfaced to the user
//! - 4: Lock acquisition failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, unknown session, or a filesystem failure.
pub const USER_ERROR: i32 = 1;

/// Malformed persisted data: a single-record read hit unparsable content.
pub const DATA_ERROR: i32 = 2;

/// Lock acquisition failure: a session lock could not be acquired in time.
pub const LOCK_FAILURE: i32 = 4;

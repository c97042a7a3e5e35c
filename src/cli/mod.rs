//! CLI argument parsing for seslog.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Seslog: file-based session state store for agent hook pipelines.
///
/// Session state lives as plain files in one sessions directory:
/// - a metadata record per session, replaced atomically
/// - an append-only observation log, serialized by a lock file
/// - a pending-job counter tracking detached background work
///
/// Every invocation is a short-lived process; coordination between
/// concurrent invocations happens entirely through the filesystem.
#[derive(Parser, Debug)]
#[command(name = "seslog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for seslog.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a session.
    ///
    /// Creates the session's metadata record with status `active`.
    Start(StartArgs),

    /// Record an observation into a session's log.
    ///
    /// Appends one event record. If the log lock is busy past its timeout
    /// the observation is dropped and reported, but the command still
    /// succeeds: capture must never block the host workflow.
    Observe(ObserveArgs),

    /// End a session and tear down its files.
    ///
    /// Waits for pending background jobs, stamps the terminal status,
    /// prints the final record as JSON, and removes the session's files.
    End(EndArgs),

    /// Background-job bookkeeping.
    ///
    /// Track detached jobs against a session and wait for them to drain.
    Job(JobCommand),

    /// Knowledge-reference bookkeeping.
    ///
    /// Attach artifact identifiers produced by background jobs to a session.
    Refs(RefsCommand),

    /// Show sessions or one session's full state.
    Status(StatusArgs),

    /// Finalize and remove sessions with no recent activity.
    Sweep(SweepArgs),
}

/// Arguments for the `start` command.
#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Opaque session identifier supplied by the host.
    pub session_id: String,

    /// Project name; defaults to the final component of --path.
    #[arg(long)]
    pub project: Option<String>,

    /// Project directory the session runs in.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

/// Arguments for the `observe` command.
#[derive(Parser, Debug)]
pub struct ObserveArgs {
    /// Session to append to.
    pub session_id: String,

    /// Free-form event payload; read from stdin when omitted.
    pub payload: Option<String>,

    /// Name of the tool that produced the event.
    #[arg(long)]
    pub tool: String,

    /// Event category (file_edit, command, error, other).
    #[arg(long, default_value = "other")]
    pub category: String,

    /// Mark the event as a failure.
    #[arg(long)]
    pub error: bool,
}

/// Arguments for the `end` command.
#[derive(Parser, Debug)]
pub struct EndArgs {
    /// Session to end.
    pub session_id: String,

    /// Record the session as stopped instead of completed.
    #[arg(long)]
    pub stopped: bool,

    /// Summary to store on the final record (synchronous fast path).
    #[arg(long)]
    pub summary: Option<String>,

    /// Keep the session's files on disk instead of deleting them.
    #[arg(long)]
    pub keep_files: bool,
}

/// Background-job subcommands.
#[derive(Parser, Debug)]
pub struct JobCommand {
    #[command(subcommand)]
    pub action: JobAction,
}

/// Actions for `seslog job`.
#[derive(Subcommand, Debug)]
pub enum JobAction {
    /// Register a detached background job against a session.
    Start(JobStartArgs),

    /// Mark one background job as finished.
    Done(JobDoneArgs),

    /// Block until the session has no pending background jobs.
    Wait(JobWaitArgs),
}

/// Arguments for `job start`.
#[derive(Parser, Debug)]
pub struct JobStartArgs {
    /// Session the job belongs to.
    pub session_id: String,
}

/// Arguments for `job done`.
#[derive(Parser, Debug)]
pub struct JobDoneArgs {
    /// Session the job belongs to.
    pub session_id: String,
}

/// Arguments for `job wait`.
#[derive(Parser, Debug)]
pub struct JobWaitArgs {
    /// Session to wait on.
    pub session_id: String,

    /// Override the configured maximum wait (milliseconds).
    #[arg(long)]
    pub max_wait_ms: Option<u64>,

    /// Treat unreadable counter state as zero instead of still-pending.
    #[arg(long)]
    pub lenient: bool,
}

/// Knowledge-reference subcommands.
#[derive(Parser, Debug)]
pub struct RefsCommand {
    #[command(subcommand)]
    pub action: RefsAction,
}

/// Actions for `seslog refs`.
#[derive(Subcommand, Debug)]
pub enum RefsAction {
    /// Append knowledge references to a session's record.
    Add(RefsAddArgs),
}

/// Arguments for `refs add`.
#[derive(Parser, Debug)]
pub struct RefsAddArgs {
    /// Session to attach the references to.
    pub session_id: String,

    /// Artifact identifiers to append.
    #[arg(required = true)]
    pub refs: Vec<String>,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Show one session's full record and observation count.
    pub session_id: Option<String>,
}

/// Arguments for the `sweep` command.
#[derive(Parser, Debug)]
pub struct SweepArgs {
    /// Override the configured inactivity threshold (minutes).
    #[arg(long)]
    pub max_age_minutes: Option<u64>,
}

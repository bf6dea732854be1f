//! # Actor Runners
//!
//! Two interchangeable backends execute the same [`VotePlan`]:
//!
//! | Backend              | Actors        | Tally lives in          | Locks            |
//! |----------------------|---------------|-------------------------|------------------|
//! | [`ThreadRunner`]     | OS threads    | `Arc<SharedBallot>`     | `LocalLock`      |
//! | `ProcessRunner`      | forked procs  | POSIX shared memory     | named semaphores |
//!
//! Both measure `elapsed` from the first spawn to the completion of the last
//! writer, then wait for the readers.

mod thread;
#[cfg(unix)]
mod process;

pub use self::thread::ThreadRunner;
#[cfg(unix)]
pub use self::process::ProcessRunner;

use std::io;
use std::path::Path;
use std::time::Duration;

use ballot_core::{CancelToken, GateError, VoteSink};
use thiserror::Error;

use crate::config::Backend;
use crate::plan::VotePlan;

/// Run failures.
#[derive(Error, Debug)]
pub enum RunError {
    /// A shared primitive could not be created or attached. Fatal.
    #[error("resource initialization failed for {resource}: {reason}")]
    ResourceInit {
        /// What failed.
        resource: String,
        /// Why.
        reason: String,
    },

    /// An actor could not be started. The batch was cancelled and reaped.
    #[error("failed to spawn {actor}: {source}")]
    Spawn {
        /// Which actor.
        actor: String,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// Gate failure outside an actor.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// File IO failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The coordinator is shut down.
    #[error("coordinator is shut down")]
    Shutdown,

    /// An actor thread panicked.
    #[error("actor {0} panicked")]
    ActorPanicked(String),
}

impl RunError {
    /// Returns true for errors that end the program with a failure code.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ResourceInit { .. } | Self::Spawn { .. })
    }
}

#[cfg(unix)]
impl From<ballot_ipc::IpcError> for RunError {
    fn from(err: ballot_ipc::IpcError) -> Self {
        let resource = match &err {
            ballot_ipc::IpcError::ResourceInit { resource, .. }
            | ballot_ipc::IpcError::Attach { resource, .. }
            | ballot_ipc::IpcError::Layout { resource, .. } => resource.clone(),
            ballot_ipc::IpcError::Semaphore { name, .. }
            | ballot_ipc::IpcError::InvalidName { name, .. } => name.clone(),
        };
        Self::ResourceInit {
            resource,
            reason: err.to_string(),
        }
    }
}

/// Result type for runs.
pub type RunResult<T> = Result<T, RunError>;

/// What a runner needs for one batch.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    /// The schedule.
    pub plan: &'a VotePlan,
    /// Session cancellation.
    pub cancel: &'a CancelToken,
    /// In-process vote sink (threads).
    pub sink: &'a dyn VoteSink,
    /// Transaction log that forked children reopen in append mode.
    pub log_path: Option<&'a Path>,
}

/// Timing and health of one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// First spawn to last writer completion.
    pub elapsed: Duration,
    /// First spawn to last reader completion.
    pub total_elapsed: Duration,
    /// Actors that returned an error, panicked or exited non-zero.
    pub failed_actors: usize,
    /// Whether shutdown was requested during the batch.
    pub cancelled: bool,
}

/// A backend that executes a [`VotePlan`].
pub trait ActorRunner {
    /// Which backend this is.
    fn backend(&self) -> Backend;

    /// Runs every actor of the plan to completion.
    ///
    /// # Errors
    ///
    /// [`RunError::Spawn`] if an actor could not be started.
    fn run(&self, ctx: &RunContext<'_>) -> RunResult<BatchReport>;
}

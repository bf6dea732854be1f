//! # Process Backend
//!
//! One forked child per actor. Children reattach to the session by name and
//! run the same actor bodies as threads.
//!
//! ```text
//! parent                                   child
//! ──────                                   ─────
//! fork writers 1..W ─┐                     ignore SIGINT
//! fork readers 1..R ─┤                     IpcSession::open(names)
//! relay thread ──────┤ token ▶ shm flag    reopen transaction log (append)
//! waitpid writers    │                     run_writer / run_reader
//! elapsed ◀──────────┘                     drop handles, _exit(code)
//! waitpid readers
//! ```
//!
//! Children never unlink anything. Exit code 0 means success; anything else
//! counts as a failed actor.

#![allow(unsafe_code)]

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::thread;
use std::time::Instant;

use ballot_core::{NullSink, VoteSink};
use ballot_ipc::{IpcSession, ResourceNames};
use crossbeam_channel::{bounded, select};
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use tracing::{error, info, warn};

use super::{ActorRunner, BatchReport, RunContext, RunError, RunResult};
use crate::actor::{run_reader, run_writer};
use crate::config::Backend;
use crate::plan::{ReaderTask, WriterTask};
use crate::txlog::TransactionLog;

/// Child exit code for an actor error.
const EXIT_ACTOR_ERROR: i32 = 1;
/// Child exit code for a panic.
const EXIT_PANIC: i32 = 2;

/// What a forked child does.
#[derive(Clone, Copy)]
enum Role<'a> {
    Writer(&'a WriterTask),
    Reader(&'a ReaderTask),
}

impl Role<'_> {
    fn label(&self) -> String {
        match self {
            Self::Writer(task) => format!("writer {}", task.index),
            Self::Reader(task) => format!("reader {}", task.index),
        }
    }
}

/// Runs actors as forked processes over the owner's [`IpcSession`].
#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner<'a> {
    session: &'a IpcSession,
}

impl<'a> ProcessRunner<'a> {
    /// Runner over the owner session.
    #[must_use]
    pub const fn new(session: &'a IpcSession) -> Self {
        Self { session }
    }

    fn spawn(&self, role: Role<'_>, log_path: Option<&Path>) -> RunResult<Pid> {
        // SAFETY: the child only opens fresh handles, runs the actor and
        // leaves through `_exit`; it never returns into the caller's frames.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { child }) => Ok(child),
            Ok(ForkResult::Child) => {
                let code = child_main(self.session.names(), role, log_path);
                // SAFETY: terminates the child without running the parent's
                // destructors or atexit handlers.
                unsafe { libc::_exit(code) }
            }
            Err(errno) => Err(RunError::Spawn {
                actor: role.label(),
                source: io::Error::from(errno),
            }),
        }
    }
}

fn child_main(names: &ResourceNames, role: Role<'_>, log_path: Option<&Path>) -> i32 {
    // SAFETY: installs SIG_IGN, no handler code runs.
    if let Err(errno) = unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) } {
        warn!(%errno, "child could not ignore SIGINT");
    }

    match panic::catch_unwind(AssertUnwindSafe(|| child_work(names, role, log_path))) {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            error!(actor = %role.label(), pid = std::process::id(), %err, "child actor failed");
            EXIT_ACTOR_ERROR
        }
        Err(_) => EXIT_PANIC,
    }
}

fn child_work(names: &ResourceNames, role: Role<'_>, log_path: Option<&Path>) -> RunResult<()> {
    let session = IpcSession::open(names.clone())?;
    let ballot = session.ballot();
    let shared = ballot.shared();

    match role {
        Role::Writer(task) => {
            let log = log_path.map(TransactionLog::reopen).transpose()?;
            let sink: &dyn VoteSink = match &log {
                Some(log) => log,
                None => &NullSink,
            };
            run_writer(ballot, task, sink, shared)?;
        }
        Role::Reader(task) => {
            run_reader(ballot, task, shared)?;
        }
    }
    Ok(())
}

/// Blocks until `pid` exits. Returns true on exit code 0.
fn reap(pid: Pid) -> bool {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, 0)) => return true,
            Ok(WaitStatus::Exited(_, code)) => {
                warn!(%pid, code, "child exited with failure");
                return false;
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                warn!(%pid, ?sig, "child killed by signal");
                return false;
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(errno) => {
                error!(%pid, %errno, "waitpid failed");
                return false;
            }
        }
    }
}

impl ActorRunner for ProcessRunner<'_> {
    fn backend(&self) -> Backend {
        Backend::Process
    }

    fn run(&self, ctx: &RunContext<'_>) -> RunResult<BatchReport> {
        let plan = ctx.plan;
        let shared = self.session.ballot().shared();

        info!(
            writers = plan.writer_count(),
            readers = plan.reader_count(),
            seed = plan.seed,
            region = %self.session.names().region,
            "process batch starting"
        );

        let start = Instant::now();
        let mut writers = Vec::with_capacity(plan.writer_count());
        let mut readers = Vec::with_capacity(plan.reader_count());

        let roles = plan
            .writers
            .iter()
            .map(Role::Writer)
            .chain(plan.readers.iter().map(Role::Reader));

        for role in roles {
            if ctx.cancel.is_cancelled() {
                shared.header().cancel();
            }
            match self.spawn(role, ctx.log_path) {
                Ok(pid) => match role {
                    Role::Writer(_) => writers.push(pid),
                    Role::Reader(_) => readers.push(pid),
                },
                Err(err) => {
                    shared.header().cancel();
                    for pid in writers.iter().chain(&readers) {
                        reap(*pid);
                    }
                    error!(%err, "process batch aborted");
                    return Err(err);
                }
            }
        }

        // Forking is done; only now start a helper thread in this process.
        let (done_tx, done_rx) = bounded::<()>(0);
        let wake = ctx.cancel.wake_receiver();
        let report = thread::scope(|scope| {
            let relay = thread::Builder::new()
                .name("cancel-relay".to_string())
                .spawn_scoped(scope, move || {
                    select! {
                        recv(wake) -> _ => shared.header().cancel(),
                        recv(done_rx) -> _ => {}
                    }
                });
            if let Err(err) = &relay {
                warn!(%err, "cancel relay unavailable");
                if ctx.cancel.is_cancelled() {
                    shared.header().cancel();
                }
            }

            let mut failed = 0;
            for pid in &writers {
                failed += usize::from(!reap(*pid));
            }
            let elapsed = start.elapsed();
            for pid in &readers {
                failed += usize::from(!reap(*pid));
            }
            let total_elapsed = start.elapsed();

            drop(done_tx);
            BatchReport {
                elapsed,
                total_elapsed,
                failed_actors: failed,
                cancelled: ctx.cancel.is_cancelled() || shared.header().is_cancelled(),
            }
        });

        info!(elapsed = ?report.elapsed, failed = report.failed_actors, "process batch finished");
        Ok(report)
    }
}

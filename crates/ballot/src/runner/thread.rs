//! Thread backend: one named OS thread per actor, all sharing one
//! in-process ballot.

use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use ballot_core::{GateResult, LocalBallot};
use tracing::{error, info, warn};

use super::{ActorRunner, BatchReport, RunContext, RunError, RunResult};
use crate::actor::{run_reader, run_writer};
use crate::config::Backend;

/// Runs actors as scoped threads over a [`LocalBallot`].
#[derive(Debug, Clone, Copy)]
pub struct ThreadRunner<'a> {
    ballot: &'a LocalBallot,
}

impl<'a> ThreadRunner<'a> {
    /// Runner over `ballot`.
    #[must_use]
    pub const fn new(ballot: &'a LocalBallot) -> Self {
        Self { ballot }
    }
}

/// Joins one actor, counting errors and panics as failures.
fn join_actor<T>(handle: ScopedJoinHandle<'_, GateResult<T>>, failed: &mut usize) {
    let name = handle.thread().name().unwrap_or("actor").to_string();
    match handle.join() {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            warn!(actor = %name, %err, "actor failed");
            *failed += 1;
        }
        Err(_) => {
            error!(actor = %name, "{}", RunError::ActorPanicked(name.clone()));
            *failed += 1;
        }
    }
}

impl ActorRunner for ThreadRunner<'_> {
    fn backend(&self) -> Backend {
        Backend::Thread
    }

    fn run(&self, ctx: &RunContext<'_>) -> RunResult<BatchReport> {
        let plan = ctx.plan;
        let sink = ctx.sink;
        let ballot = self.ballot;
        // Per-batch token: a spawn failure stops this batch only.
        let cancel = ctx.cancel.child();
        let cancel = &cancel;

        info!(
            writers = plan.writer_count(),
            readers = plan.reader_count(),
            seed = plan.seed,
            "thread batch starting"
        );

        let start = Instant::now();
        thread::scope(|scope| {
            let mut spawn_error = None;

            let mut writers = Vec::with_capacity(plan.writer_count());
            for task in &plan.writers {
                let spawned = thread::Builder::new()
                    .name(format!("writer-{}", task.index))
                    .spawn_scoped(scope, move || run_writer(ballot, task, sink, cancel));
                match spawned {
                    Ok(handle) => writers.push(handle),
                    Err(source) => {
                        spawn_error = Some(RunError::Spawn {
                            actor: format!("writer {}", task.index),
                            source,
                        });
                        break;
                    }
                }
            }

            let mut readers = Vec::with_capacity(plan.reader_count());
            if spawn_error.is_none() {
                for task in &plan.readers {
                    let spawned = thread::Builder::new()
                        .name(format!("reader-{}", task.index))
                        .spawn_scoped(scope, move || run_reader(ballot, task, cancel));
                    match spawned {
                        Ok(handle) => readers.push(handle),
                        Err(source) => {
                            spawn_error = Some(RunError::Spawn {
                                actor: format!("reader {}", task.index),
                                source,
                            });
                            break;
                        }
                    }
                }
            }

            if spawn_error.is_some() {
                cancel.cancel();
            }

            let mut failed = 0;
            for handle in writers {
                join_actor(handle, &mut failed);
            }
            let elapsed = start.elapsed();
            for handle in readers {
                join_actor(handle, &mut failed);
            }
            let total_elapsed = start.elapsed();

            if let Some(err) = spawn_error {
                error!(%err, "thread batch aborted");
                return Err(err);
            }

            info!(?elapsed, failed, "thread batch finished");
            Ok(BatchReport {
                elapsed,
                total_elapsed,
                failed_actors: failed,
                cancelled: cancel.is_cancelled(),
            })
        })
    }
}

//! # Coordinator
//!
//! Owns every session resource and drives runs:
//!
//! ```text
//! RunConfig ─▶ configure tally ─▶ VotePlan ─▶ ActorRunner ─▶ quiescent check
//!                   │                              │               │
//!                   ▼                              ▼               ▼
//!          transaction log setup          vote lines (sink)   statistics,
//!                                                             summary, perf line
//! ```
//!
//! One run at a time. [`Coordinator::shutdown`] cancels, waits for the run in
//! flight and removes the IPC objects exactly once; it is safe to call from
//! the interrupt thread and again from `main`.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use ballot_core::{
    Ballot, CancelToken, GateLock, InvariantViolation, LocalBallot, NullSink, RingLog,
    StateAccess, TallySnapshot, VoteOutcome, VoteSink, VoterId,
};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::{Adjustment, Backend, BallotConfig, RunConfig};
use crate::perf::{PerfRecord, PerfStore, PerfSummary};
use crate::plan::VotePlan;
use crate::runner::{ActorRunner, BatchReport, RunContext, RunError, RunResult, ThreadRunner};
use crate::txlog::{SessionCounts, SessionMode, TransactionLog};

#[cfg(unix)]
use crate::runner::ProcessRunner;
#[cfg(unix)]
use ballot_ipc::{IpcSession, ResourceNames};

/// Distinguishes coordinators created by one process.
static SESSION_SEQ: AtomicU32 = AtomicU32::new(0);

/// Outcome of one run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Backend used.
    pub backend: Backend,
    /// Plan seed, for replay.
    pub seed: u64,
    /// Writers spawned.
    pub writers: usize,
    /// Readers spawned.
    pub readers: usize,
    /// First spawn to last writer.
    pub elapsed: Duration,
    /// First spawn to last reader.
    pub total_elapsed: Duration,
    /// Quiescent tally after all actors finished.
    pub tally: TallySnapshot,
    /// Observations completed by readers.
    pub observations: u32,
    /// Observations that saw a broken invariant.
    pub violations: u32,
    /// Quiescent invariant check, `None` when it holds.
    pub violation: Option<InvariantViolation>,
    /// Actors that failed.
    pub failed_actors: usize,
    /// Whether shutdown interrupted the run.
    pub cancelled: bool,
    /// Transaction log written for this run.
    pub log_path: Option<PathBuf>,
    /// Corrections made to the request.
    pub adjustments: Vec<Adjustment>,
}

impl RunReport {
    /// Votes recorded.
    #[must_use]
    pub fn recorded(&self) -> u32 {
        self.tally.total_votes
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} mode completed in {:.2} seconds",
            self.backend,
            self.elapsed.as_secs_f64()
        )?;
        writeln!(
            f,
            "Voters: {}, Observers: {}, Seed: {}",
            self.writers, self.readers, self.seed
        )?;
        writeln!(
            f,
            "Rejected: {} duplicate, {} invalid, {} registry full",
            self.tally.duplicate_rejections,
            self.tally.invalid_rejections,
            self.tally.registry_full_rejections
        )?;
        if self.failed_actors > 0 {
            writeln!(f, "Failed actors: {}", self.failed_actors)?;
        }
        if self.cancelled {
            writeln!(f, "Run was interrupted")?;
        }
        if let Some(path) = &self.log_path {
            writeln!(f, "Transaction log: {}", path.display())?;
        }
        write!(f, "{}", self.tally)
    }
}

/// Quiescent snapshot plus the header counters of one ballot.
fn settle<A: StateAccess, L: GateLock>(
    ballot: &Ballot<A, L>,
) -> RunResult<(TallySnapshot, Option<InvariantViolation>, u32, u32)> {
    let (tally, checked) = ballot.read(|state| (state.snapshot(), state.check_invariants()))?;
    if let Err(violation) = &checked {
        error!(%violation, "tally inconsistent after run");
    }
    let header = ballot.shared().header();
    Ok((
        tally,
        checked.err(),
        header.observations(),
        header.violations(),
    ))
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Session owner: ballots, IPC objects, ring log and cancellation.
pub struct Coordinator {
    config: BallotConfig,
    local: LocalBallot,
    #[cfg(unix)]
    ipc: IpcSession,
    ring: RingLog,
    cancel: CancelToken,
    run_lock: Mutex<()>,
    torn_down: AtomicBool,
    /// Set once the IPC objects are gone. Held for the whole teardown.
    teardown: Mutex<bool>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("data_dir", &self.config.data_dir)
            .field("torn_down", &self.torn_down.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates the session resources.
    ///
    /// # Errors
    ///
    /// [`RunError::ResourceInit`] if the IPC objects cannot be created.
    pub fn new(config: BallotConfig) -> RunResult<Self> {
        #[cfg(unix)]
        let ipc = {
            let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
            let tag = format!("{}-{seq}", std::process::id());
            IpcSession::create(ResourceNames::new(&config.ipc_prefix, tag))?
        };
        #[cfg(not(unix))]
        let _ = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);

        let ring = RingLog::with_capacity(config.ring_log_capacity);
        info!(
            data_dir = %config.data_dir.display(),
            ring_capacity = ring.capacity(),
            "coordinator ready"
        );

        Ok(Self {
            config,
            local: Ballot::local(),
            #[cfg(unix)]
            ipc,
            ring,
            cancel: CancelToken::new(),
            run_lock: Mutex::new(()),
            torn_down: AtomicBool::new(false),
            teardown: Mutex::new(false),
        })
    }

    /// Loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &BallotConfig {
        &self.config
    }

    /// Session cancellation token.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// In-memory copy of every vote record of thread and manual sessions.
    #[must_use]
    pub const fn ring_log(&self) -> &RingLog {
        &self.ring
    }

    /// The in-process ballot.
    #[must_use]
    pub const fn local_ballot(&self) -> &LocalBallot {
        &self.local
    }

    /// The owner IPC session.
    #[cfg(unix)]
    #[must_use]
    pub const fn ipc_session(&self) -> &IpcSession {
        &self.ipc
    }

    /// Returns true once [`Self::shutdown`] started.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> RunResult<()> {
        if self.is_shut_down() {
            Err(RunError::Shutdown)
        } else {
            Ok(())
        }
    }

    fn open_log(&self, mode: SessionMode) -> RunResult<Option<TransactionLog>> {
        if !self.config.transaction_logs {
            return Ok(None);
        }
        Ok(Some(TransactionLog::create(&self.config.data_dir, mode)?))
    }

    /// Runs one batch to completion.
    ///
    /// # Errors
    ///
    /// [`RunError::Shutdown`] after shutdown, [`RunError::Spawn`] if an actor
    /// could not start, IO and gate failures.
    pub fn run(&self, run: RunConfig) -> RunResult<RunReport> {
        self.ensure_live()?;
        let _running = self.run_lock.lock();
        self.ensure_live()?;

        for adjustment in &run.adjustments {
            warn!(%adjustment, "request adjusted");
        }

        let plan = VotePlan::generate(&run, &self.config);
        let mode = SessionMode::Simulated(run.backend);
        let log = self.open_log(mode)?;
        if let Some(log) = &log {
            let counts = SessionCounts {
                writers: plan.writer_count(),
                readers: plan.reader_count(),
            };
            log.write_setup(&run.candidates, mode, Some(counts))?;
        }

        let log_sink: &dyn VoteSink = match &log {
            Some(log) => log,
            None => &NullSink,
        };
        let sink = (&self.ring, log_sink);
        let ctx = RunContext {
            plan: &plan,
            cancel: &self.cancel,
            sink: &sink,
            log_path: log.as_ref().map(TransactionLog::path),
        };

        let (batch, (tally, violation, observations, violations)) = match run.backend {
            Backend::Thread => {
                self.local.configure(&run.candidates)?;
                let batch = ThreadRunner::new(&self.local).run(&ctx)?;
                (batch, settle(&self.local)?)
            }
            Backend::Process => self.run_process(&run, &ctx)?,
        };

        if let Some(log) = &log {
            log.write_statistics(batch.elapsed, &tally)?;
            log.write_summary(&tally)?;
        }

        let cancelled = batch.cancelled || self.cancel.is_cancelled();
        if cancelled {
            info!("run interrupted; no performance line recorded");
        } else {
            let record = PerfRecord::new(
                run.backend,
                count_u32(plan.writer_count()),
                count_u32(plan.reader_count()),
                batch.elapsed,
            );
            PerfStore::open(self.config.perf_path())?.append(&record)?;
        }

        info!(
            backend = %run.backend,
            seed = plan.seed,
            recorded = tally.total_votes,
            rejected = tally.rejections(),
            elapsed = ?batch.elapsed,
            "run finished"
        );

        Ok(RunReport {
            backend: run.backend,
            seed: plan.seed,
            writers: plan.writer_count(),
            readers: plan.reader_count(),
            elapsed: batch.elapsed,
            total_elapsed: batch.total_elapsed,
            tally,
            observations,
            violations,
            violation,
            failed_actors: batch.failed_actors,
            cancelled,
            log_path: log.as_ref().map(|l| l.path().to_path_buf()),
            adjustments: run.adjustments,
        })
    }

    #[cfg(unix)]
    fn run_process(
        &self,
        run: &RunConfig,
        ctx: &RunContext<'_>,
    ) -> RunResult<(
        BatchReport,
        (TallySnapshot, Option<InvariantViolation>, u32, u32),
    )> {
        let ballot = self.ipc.ballot();
        ballot.configure(&run.candidates)?;
        let batch = ProcessRunner::new(&self.ipc).run(ctx)?;
        Ok((batch, settle(ballot)?))
    }

    #[cfg(not(unix))]
    fn run_process(
        &self,
        _run: &RunConfig,
        _ctx: &RunContext<'_>,
    ) -> RunResult<(
        BatchReport,
        (TallySnapshot, Option<InvariantViolation>, u32, u32),
    )> {
        Err(RunError::ResourceInit {
            resource: "process backend".to_string(),
            reason: "not supported on this platform".to_string(),
        })
    }

    /// Starts an interactive session over the in-process ballot.
    ///
    /// # Errors
    ///
    /// [`RunError::Shutdown`], IO and gate failures.
    pub fn manual(&self, candidates: &[String]) -> RunResult<ManualSession<'_>> {
        self.ensure_live()?;
        let _running = self.run_lock.lock();

        self.local.configure(candidates)?;
        let log = self.open_log(SessionMode::Manual)?;
        if let Some(log) = &log {
            log.write_setup(candidates, SessionMode::Manual, None)?;
        }
        info!(candidates = candidates.len(), "manual session started");

        Ok(ManualSession {
            coordinator: self,
            candidates: candidates.to_vec(),
            log,
        })
    }

    /// Aggregates the performance file and writes a report next to it.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn report(&self) -> RunResult<(PerfSummary, PathBuf)> {
        let store = PerfStore::open(self.config.perf_path())?;
        let data = store.contents()?;
        let summary = PerfSummary::from_records(&store.load()?);
        let path = summary.write_report(&self.config.data_dir, &data)?;
        Ok((summary, path))
    }

    /// Cancels, waits for the run in flight and removes the IPC objects.
    /// The first call does the teardown; concurrent calls block until it has
    /// finished and then return `Ok(())`.
    ///
    /// # Errors
    ///
    /// IPC cleanup failures, reported to the first caller only.
    pub fn shutdown(&self) -> RunResult<()> {
        self.cancel.cancel();
        self.torn_down.store(true, Ordering::Release);

        let mut done = self.teardown.lock();
        if *done {
            return Ok(());
        }
        let _idle = self.run_lock.lock();
        *done = true;
        #[cfg(unix)]
        self.ipc.destroy()?;

        info!("coordinator shut down");
        Ok(())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(%err, "shutdown on drop failed");
        }
    }
}

/// Votes typed at the console, one write transaction each.
pub struct ManualSession<'a> {
    coordinator: &'a Coordinator,
    candidates: Vec<String>,
    log: Option<TransactionLog>,
}

impl fmt::Debug for ManualSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualSession")
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl ManualSession<'_> {
    /// Candidate names, index order.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Casts one vote.
    ///
    /// # Errors
    ///
    /// [`RunError::Shutdown`] and gate failures.
    pub fn cast(&self, voter: VoterId, candidate: usize) -> RunResult<VoteOutcome> {
        let coordinator = self.coordinator;
        coordinator.ensure_live()?;
        let _running = coordinator.run_lock.lock();

        let log_sink: &dyn VoteSink = match &self.log {
            Some(log) => log,
            None => &NullSink,
        };
        let outcome = coordinator
            .local
            .cast_vote(voter, candidate, &(&coordinator.ring, log_sink))?;
        Ok(outcome)
    }

    /// Current tally from a read transaction.
    ///
    /// # Errors
    ///
    /// Gate failures.
    pub fn view(&self) -> RunResult<TallySnapshot> {
        Ok(self.coordinator.local.observe()?)
    }

    /// Writes the log summary and returns the final tally.
    ///
    /// # Errors
    ///
    /// IO and gate failures.
    pub fn finish(self) -> RunResult<TallySnapshot> {
        let tally = self.coordinator.local.snapshot()?;
        if let Some(log) = &self.log {
            log.write_summary(&tally)?;
        }
        info!(recorded = tally.total_votes, "manual session finished");
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunRequest, ThinkRange};

    fn quick_config(dir: &std::path::Path) -> BallotConfig {
        BallotConfig {
            data_dir: dir.to_path_buf(),
            writer_think_ms: ThinkRange::fixed(0),
            reader_think_ms: ThinkRange::fixed(0),
            observation_cycles: 2,
            ring_log_capacity: 4096,
            ..BallotConfig::default()
        }
    }

    #[test]
    fn test_manual_session() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(quick_config(dir.path())).unwrap();
        let names = vec!["Alice".to_string(), "Bob".to_string()];

        let session = coordinator.manual(&names).unwrap();
        assert_eq!(session.cast(1, 0).unwrap(), VoteOutcome::Recorded);
        assert_eq!(session.cast(1, 1).unwrap(), VoteOutcome::DuplicateVote);
        assert_eq!(session.cast(2, 5).unwrap(), VoteOutcome::InvalidCandidate);
        assert_eq!(session.view().unwrap().votes(), vec![1, 0]);

        let tally = session.finish().unwrap();
        assert_eq!(tally.total_votes, 1);

        let ring = String::from_utf8(coordinator.ring_log().contents()).unwrap();
        assert_eq!(ring.lines().count(), 3);
        assert!(ring.starts_with("SUCCESS: VoterID 1 voted for Candidate 'Alice' (ID: 0)"));
    }

    #[test]
    fn test_run_after_shutdown_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(quick_config(dir.path())).unwrap();
        coordinator.shutdown().unwrap();
        coordinator.shutdown().unwrap();

        let run = RunRequest::new(Backend::Thread).sanitize();
        assert!(matches!(coordinator.run(run), Err(RunError::Shutdown)));
        assert!(matches!(
            coordinator.manual(&["A".to_string()]),
            Err(RunError::Shutdown)
        ));
    }

    #[test]
    fn test_thread_run_records_perf_line() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(quick_config(dir.path())).unwrap();

        let mut request = RunRequest::new(Backend::Thread);
        request.writers = 12;
        request.readers = 2;
        request.seed = Some(3);
        let report = coordinator.run(request.sanitize()).unwrap();

        assert_eq!(report.recorded(), 12);
        assert_eq!(report.observations, 4);
        assert!(report.violation.is_none());
        assert!(!report.cancelled);

        let records = PerfStore::open(coordinator.config().perf_path())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].writers, records[0].readers), (12, 2));
    }
}

//! # Transactions
//!
//! The read and write bodies every backend runs. A [`Ballot`] pairs a state
//! accessor with a [`SyncGate`]; all access to [`BallotState`] goes through a
//! closure that runs with the gate held.
//!
//! | Transaction   | Gate side | Effect                                    |
//! |---------------|-----------|-------------------------------------------|
//! | `cast_vote`   | writer    | `apply_vote` + one [`VoteRecord`] to sink |
//! | `observe`     | reader    | snapshot + invariant check                |
//! | `configure`   | writer    | `reset` + run counters cleared            |

#![allow(unsafe_code)]

use std::sync::Arc;

use crate::error::GateResult;
use crate::state::{BallotState, SharedBallot, TallySnapshot, VoteOutcome, VoterId};
use crate::sync::{GateLock, LocalLock, SyncGate};

/// Gives a transaction access to the shared block.
///
/// Threads share an `Arc<SharedBallot>`; processes implement this on their
/// mapped region.
pub trait StateAccess: Send + Sync {
    /// The shared block.
    fn shared(&self) -> &SharedBallot;
}

impl StateAccess for Arc<SharedBallot> {
    #[inline]
    fn shared(&self) -> &SharedBallot {
        self
    }
}

/// One vote attempt as seen from inside the write lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteRecord<'a> {
    /// Who voted.
    pub voter: VoterId,
    /// Requested candidate index.
    pub candidate: usize,
    /// Candidate name if the index was valid.
    pub candidate_name: Option<&'a str>,
    /// What happened.
    pub outcome: VoteOutcome,
}

impl VoteRecord<'_> {
    /// The transaction-log line for this attempt, without timestamp.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.outcome {
            VoteOutcome::Recorded => format!(
                "SUCCESS: VoterID {} voted for Candidate '{}' (ID: {})",
                self.voter,
                self.candidate_name.unwrap_or("?"),
                self.candidate
            ),
            VoteOutcome::DuplicateVote => {
                format!("FAILED VOTE: VoterID {} attempted to vote again", self.voter)
            }
            VoteOutcome::InvalidCandidate => format!(
                "INVALID VOTE: VoterID {} attempted to vote for invalid candidate ID {}",
                self.voter, self.candidate
            ),
            VoteOutcome::RegistryFull => format!(
                "REJECTED VOTE: VoterID {} could not be registered (registry full)",
                self.voter
            ),
        }
    }
}

/// Receives every vote attempt while the write lock is held, so records
/// appear in commit order.
pub trait VoteSink: Send + Sync {
    /// Records one attempt. Must not block on the gate.
    fn record(&self, record: &VoteRecord<'_>);
}

/// Discards records.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl VoteSink for NullSink {
    fn record(&self, _record: &VoteRecord<'_>) {}
}

impl<A: VoteSink, B: VoteSink> VoteSink for (A, B) {
    fn record(&self, record: &VoteRecord<'_>) {
        self.0.record(record);
        self.1.record(record);
    }
}

impl<S: VoteSink + ?Sized> VoteSink for &S {
    fn record(&self, record: &VoteRecord<'_>) {
        (**self).record(record);
    }
}

/// Releases a gate side on unwind. The normal path calls [`Held::finish`] so
/// that release errors reach the caller.
struct Held<F: Fn() -> GateResult<()>> {
    exit: F,
    armed: bool,
}

impl<F: Fn() -> GateResult<()>> Held<F> {
    const fn new(exit: F) -> Self {
        Self { exit, armed: true }
    }

    fn finish(mut self) -> GateResult<()> {
        self.armed = false;
        (self.exit)()
    }
}

impl<F: Fn() -> GateResult<()>> Drop for Held<F> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = (self.exit)() {
                tracing::error!(%err, "failed to leave gate while unwinding");
            }
        }
    }
}

/// Shared tally plus the gate that protects it.
#[derive(Debug)]
pub struct Ballot<A, L> {
    access: A,
    gate: SyncGate<L>,
}

/// Ballot shared by threads of one process.
pub type LocalBallot = Ballot<Arc<SharedBallot>, LocalLock>;

impl LocalBallot {
    /// Fresh block with an in-process gate.
    #[must_use]
    pub fn local() -> Self {
        Self {
            access: Arc::new(SharedBallot::new()),
            gate: SyncGate::local(),
        }
    }
}

impl Default for LocalBallot {
    fn default() -> Self {
        Self::local()
    }
}

impl<A: StateAccess, L: GateLock> Ballot<A, L> {
    /// Pairs a block with a gate.
    ///
    /// # Safety
    ///
    /// Every actor that reaches the same `SharedBallot` must use locks that
    /// refer to the same underlying primitives as `gate`. Two gates over one
    /// block let writers race.
    pub const unsafe fn from_parts(access: A, gate: SyncGate<L>) -> Self {
        Self { access, gate }
    }

    /// The shared block, for header access.
    #[inline]
    pub fn shared(&self) -> &SharedBallot {
        self.access.shared()
    }

    /// The state accessor.
    #[inline]
    pub fn access(&self) -> &A {
        &self.access
    }

    /// The gate guarding the block.
    #[inline]
    pub fn gate(&self) -> &SyncGate<L> {
        &self.gate
    }

    /// Runs `f` as a read transaction.
    ///
    /// # Errors
    ///
    /// Gate failures on entry or exit.
    pub fn read<R>(&self, f: impl FnOnce(&BallotState) -> R) -> GateResult<R> {
        let shared = self.access.shared();
        let readers = shared.header().readers();

        self.gate.reader_enter(readers)?;
        let held = Held::new(|| self.gate.reader_exit(readers));

        // SAFETY: the reader side is held, so no writer is inside.
        let value = f(unsafe { &*shared.state_ptr() });

        held.finish()?;
        Ok(value)
    }

    /// Runs `f` as a write transaction.
    ///
    /// # Errors
    ///
    /// Gate failures on entry or exit.
    pub fn write<R>(&self, f: impl FnOnce(&mut BallotState) -> R) -> GateResult<R> {
        let shared = self.access.shared();

        self.gate.writer_enter()?;
        let held = Held::new(|| self.gate.writer_exit());

        // SAFETY: the write lock is held, so nobody else is inside.
        let value = f(unsafe { &mut *shared.state_ptr() });

        held.finish()?;
        Ok(value)
    }

    /// Casts one vote and hands the attempt to `sink` before releasing the
    /// write lock.
    ///
    /// # Errors
    ///
    /// Gate failures only. Rejections are [`VoteOutcome`] values.
    pub fn cast_vote(
        &self,
        voter: VoterId,
        candidate: usize,
        sink: &dyn VoteSink,
    ) -> GateResult<VoteOutcome> {
        self.write(|state| {
            let outcome = state.apply_vote(voter, candidate);
            sink.record(&VoteRecord {
                voter,
                candidate,
                candidate_name: state.candidate_name(candidate),
                outcome,
            });
            if !outcome.is_recorded() {
                tracing::debug!(voter, candidate, outcome = outcome.label(), "vote rejected");
            }
            outcome
        })
    }

    /// Takes a snapshot and checks the tally invariants.
    ///
    /// A violation is logged and counted in the header; the snapshot is
    /// returned either way.
    ///
    /// # Errors
    ///
    /// Gate failures only.
    pub fn observe(&self) -> GateResult<TallySnapshot> {
        let (snapshot, checked) = self.read(|state| (state.snapshot(), state.check_invariants()))?;

        let header = self.shared().header();
        header.note_observation(checked.is_ok());
        if let Err(violation) = checked {
            tracing::error!(%violation, "tally invariant broken");
        }

        Ok(snapshot)
    }

    /// Replaces the candidates and clears the tally and run counters.
    ///
    /// # Errors
    ///
    /// Gate failures only.
    pub fn configure<S: AsRef<str>>(&self, names: &[S]) -> GateResult<()> {
        let header = self.shared().header();
        self.write(|state| {
            state.reset(names);
            header.reset_run();
        })
    }

    /// Snapshot without the invariant bookkeeping.
    ///
    /// # Errors
    ///
    /// Gate failures only.
    pub fn snapshot(&self) -> GateResult<TallySnapshot> {
        self.read(BallotState::snapshot)
    }

    /// Asks every actor on this block to stop at its next safe point.
    pub fn cancel(&self) {
        self.shared().header().cancel();
    }

    /// Returns true once [`Self::cancel`] was called by anyone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared().header().is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl VoteSink for Collect {
        fn record(&self, record: &VoteRecord<'_>) {
            self.0.lock().push(record.describe());
        }
    }

    fn abc() -> LocalBallot {
        let ballot = Ballot::local();
        ballot.configure(&["A", "B", "C"]).unwrap();
        ballot
    }

    #[test]
    fn test_scenario_five_votes_then_observe() {
        let ballot = abc();
        for voter in 1..=5 {
            ballot.cast_vote(voter, 0, &NullSink).unwrap();
        }
        let tally = ballot.observe().unwrap();
        assert_eq!(tally.votes(), vec![5, 0, 0]);
        assert_eq!(tally.total_votes, 5);
        assert_eq!(ballot.shared().header().violations(), 0);
        assert_eq!(ballot.shared().header().observations(), 1);
    }

    #[test]
    fn test_sink_sees_every_attempt() {
        let ballot = abc();
        let sink = Collect::default();
        ballot.cast_vote(42, 0, &sink).unwrap();
        ballot.cast_vote(42, 1, &sink).unwrap();
        ballot.cast_vote(7, 3, &sink).unwrap();

        let lines = sink.0.lock();
        assert_eq!(lines[0], "SUCCESS: VoterID 42 voted for Candidate 'A' (ID: 0)");
        assert_eq!(lines[1], "FAILED VOTE: VoterID 42 attempted to vote again");
        assert_eq!(
            lines[2],
            "INVALID VOTE: VoterID 7 attempted to vote for invalid candidate ID 3"
        );
    }

    #[test]
    fn test_same_voter_from_many_threads() {
        let ballot = Arc::new(abc());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ballot = Arc::clone(&ballot);
                thread::spawn(move || ballot.cast_vote(99, i % 3, &NullSink).unwrap())
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let recorded = outcomes.iter().filter(|o| o.is_recorded()).count();
        assert_eq!(recorded, 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == VoteOutcome::DuplicateVote)
                .count(),
            7
        );
        assert_eq!(ballot.snapshot().unwrap().total_votes, 1);
    }

    #[test]
    fn test_writers_never_overlap() {
        let ballot = Arc::new(abc());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (ballot, inside, max_seen) =
                    (Arc::clone(&ballot), Arc::clone(&inside), Arc::clone(&max_seen));
                thread::spawn(move || {
                    for _ in 0..20 {
                        ballot
                            .write(|_| {
                                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                                max_seen.fetch_max(now, Ordering::SeqCst);
                                thread::yield_now();
                                inside.fetch_sub(1, Ordering::SeqCst);
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_readers_overlap() {
        let ballot = Arc::new(abc());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (ballot, inside, max_seen) =
                    (Arc::clone(&ballot), Arc::clone(&inside), Arc::clone(&max_seen));
                thread::spawn(move || {
                    ballot
                        .read(|_| {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(100));
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .unwrap();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) > 1);
        assert_eq!(ballot.shared().header().reader_count(), 0);
    }

    #[test]
    fn test_gate_released_after_panic() {
        let ballot = Arc::new(abc());
        let inner = Arc::clone(&ballot);
        let result = thread::spawn(move || {
            inner.write(|_| panic!("boom")).unwrap();
        })
        .join();
        assert!(result.is_err());

        assert!(ballot.cast_vote(1, 0, &NullSink).unwrap().is_recorded());
    }

    #[test]
    fn test_configure_clears_cancel() {
        let ballot = abc();
        ballot.cancel();
        assert!(ballot.is_cancelled());
        ballot.configure(&["X"]).unwrap();
        assert!(!ballot.is_cancelled());
    }
}

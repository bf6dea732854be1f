//! Actor bodies shared by both backends.
//!
//! Each body is generic over the state accessor, the lock kind and the
//! cancellation source, so a thread and a forked child run the same code.

use ballot_core::{
    Ballot, Cancellation, GateLock, GateResult, StateAccess, VoteOutcome, VoteSink,
};
use tracing::{debug, info};

use crate::plan::{ReaderTask, WriterTask};

/// Pauses, then casts exactly one vote.
///
/// Returns `None` if cancelled during the pause; a started vote always
/// completes.
///
/// # Errors
///
/// Gate failures.
pub fn run_writer<A, L, C>(
    ballot: &Ballot<A, L>,
    task: &WriterTask,
    sink: &dyn VoteSink,
    cancel: &C,
) -> GateResult<Option<VoteOutcome>>
where
    A: StateAccess,
    L: GateLock,
    C: Cancellation + ?Sized,
{
    if !cancel.pause(task.think) {
        debug!(writer = task.index, "writer cancelled before voting");
        return Ok(None);
    }

    let outcome = ballot.cast_vote(task.voter, task.candidate, sink)?;
    info!(
        writer = task.index,
        voter = task.voter,
        candidate = task.candidate,
        outcome = outcome.label(),
        "vote cast"
    );
    Ok(Some(outcome))
}

/// Runs the reader's observation cycles. Returns how many completed.
///
/// # Errors
///
/// Gate failures.
pub fn run_reader<A, L, C>(ballot: &Ballot<A, L>, task: &ReaderTask, cancel: &C) -> GateResult<u32>
where
    A: StateAccess,
    L: GateLock,
    C: Cancellation + ?Sized,
{
    let mut completed = 0;
    for think in &task.thinks {
        if !cancel.pause(*think) {
            debug!(reader = task.index, completed, "reader cancelled");
            break;
        }
        let tally = ballot.observe()?;
        completed += 1;
        info!(
            reader = task.index,
            cycle = completed,
            total = tally.total_votes,
            "tally observed"
        );
        debug!("\n{tally}");
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_core::{CancelToken, NullSink};
    use std::time::Duration;

    fn writer(voter: u32, candidate: usize) -> WriterTask {
        WriterTask {
            index: 1,
            voter,
            candidate,
            think: Duration::ZERO,
        }
    }

    #[test]
    fn test_writer_votes_once() {
        let ballot = Ballot::local();
        ballot.configure(&["A", "B"]).unwrap();
        let cancel = CancelToken::new();

        let outcome = run_writer(&ballot, &writer(5, 1), &NullSink, &cancel).unwrap();
        assert_eq!(outcome, Some(VoteOutcome::Recorded));
        assert_eq!(ballot.snapshot().unwrap().votes(), vec![0, 1]);
    }

    #[test]
    fn test_cancelled_writer_does_not_vote() {
        let ballot = Ballot::local();
        ballot.configure(&["A"]).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        assert_eq!(run_writer(&ballot, &writer(1, 0), &NullSink, &cancel).unwrap(), None);
        assert_eq!(ballot.snapshot().unwrap().total_votes, 0);
    }

    #[test]
    fn test_reader_completes_cycles() {
        let ballot = Ballot::local();
        ballot.configure(&["A"]).unwrap();
        let task = ReaderTask {
            index: 1,
            thinks: vec![Duration::ZERO; 3],
        };

        assert_eq!(run_reader(&ballot, &task, &CancelToken::new()).unwrap(), 3);
        assert_eq!(ballot.shared().header().observations(), 3);
    }
}

//! # Vote Plans
//!
//! Everything random about a run is drawn up front from one seed, so the
//! thread and process backends can execute the identical plan and a run can
//! be replayed.

use std::time::Duration;

use ballot_core::VoterId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{BallotConfig, RunConfig};

/// One writer: pause, then cast exactly one vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterTask {
    /// Spawn position, starting at 1.
    pub index: usize,
    /// Voter casting the vote.
    pub voter: VoterId,
    /// Candidate index voted for.
    pub candidate: usize,
    /// Pause before voting.
    pub think: Duration,
}

/// One reader: a pause before every observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderTask {
    /// Spawn position, starting at 1.
    pub index: usize,
    /// One pause per observation cycle.
    pub thinks: Vec<Duration>,
}

/// The full schedule of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VotePlan {
    /// Seed the plan was drawn from.
    pub seed: u64,
    /// Writers in spawn order.
    pub writers: Vec<WriterTask>,
    /// Readers in spawn order.
    pub readers: Vec<ReaderTask>,
}

impl VotePlan {
    /// Draws a plan for `run`. Writer `i` (1-based) is voter `i` and picks a
    /// uniform candidate, unless `run.votes` lists the votes explicitly.
    #[must_use]
    pub fn generate(run: &RunConfig, config: &BallotConfig) -> Self {
        let seed = run.seed.or(config.seed).unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let candidates = run.candidates.len().max(1);

        let writers = match &run.votes {
            Some(votes) => votes
                .iter()
                .enumerate()
                .map(|(i, &(voter, candidate))| WriterTask {
                    index: i + 1,
                    voter,
                    candidate,
                    think: config.writer_think_ms.sample(&mut rng),
                })
                .collect(),
            None => (1..=run.writers)
                .map(|index| WriterTask {
                    index,
                    voter: index as VoterId,
                    candidate: rng.gen_range(0..candidates),
                    think: config.writer_think_ms.sample(&mut rng),
                })
                .collect(),
        };

        let readers = (1..=run.readers)
            .map(|index| ReaderTask {
                index,
                thinks: (0..config.observation_cycles)
                    .map(|_| config.reader_think_ms.sample(&mut rng))
                    .collect(),
            })
            .collect();

        Self {
            seed,
            writers,
            readers,
        }
    }

    /// Number of writers.
    #[must_use]
    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }

    /// Number of readers.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// Expected tally if every vote lands: per-candidate counts over the
    /// first vote of each distinct voter with a valid candidate.
    #[must_use]
    pub fn expected_votes(&self, candidates: usize) -> Vec<u32> {
        let mut seen = std::collections::HashSet::new();
        let mut votes = vec![0; candidates];
        for task in &self.writers {
            if task.candidate < candidates && seen.insert(task.voter) {
                votes[task.candidate] += 1;
            }
        }
        votes
    }
}

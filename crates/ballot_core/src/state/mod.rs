//! # Shared Tally State
//!
//! Plain data: candidates, per-candidate counts, the voter registry and the
//! rejection counters. Nothing in here synchronizes. Every method that takes
//! `&mut self` must run inside a write transaction, every `&self` method inside
//! a read transaction (see [`Ballot`](crate::txn::Ballot)).
//!
//! ## Layout
//!
//! ```text
//! BallotState (#[repr(C)], Pod, 4544 bytes)
//! ┌──────────────────────────────────────────────┐
//! │ candidate_count │ total_votes │ voted_count   │
//! │ duplicate_rej.  │ invalid_rej.│ registry_full │
//! ├──────────────────────────────────────────────┤
//! │ names[10][48]  (NUL padded UTF-8)            │
//! │ votes[10]                                    │
//! │ voted_ids[1000]                              │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The same bytes are used by threads (boxed) and by processes (mapped), so
//! the struct holds no pointers and no padding.

mod shared;

pub use shared::{GateHeader, SharedBallot};

use std::fmt;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::constants::{MAX_CANDIDATES, MAX_NAME_LEN, MAX_VOTERS};

/// Synthetic voter identifier.
pub type VoterId = u32;

/// Result of one vote attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteOutcome {
    /// The vote was counted and the voter registered.
    Recorded,
    /// The voter was already in the registry; nothing changed.
    DuplicateVote,
    /// The candidate index was out of range; nothing changed.
    InvalidCandidate,
    /// The registry has no room left; nothing changed.
    RegistryFull,
}

impl VoteOutcome {
    /// Returns true if the tally was updated.
    #[inline]
    #[must_use]
    pub const fn is_recorded(self) -> bool {
        matches!(self, Self::Recorded)
    }

    /// Short label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::DuplicateVote => "duplicate",
            Self::InvalidCandidate => "invalid-candidate",
            Self::RegistryFull => "registry-full",
        }
    }
}

/// A broken tally invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// `total_votes` differs from the sum of the per-candidate counts.
    #[error("total votes {total} != sum of candidate votes {sum}")]
    TotalMismatch {
        /// Stored total.
        total: u32,
        /// Sum over candidates.
        sum: u64,
    },

    /// `total_votes` differs from the registry size.
    #[error("total votes {total} != registered voters {registered}")]
    RegistryMismatch {
        /// Stored total.
        total: u32,
        /// Registry size.
        registered: u32,
    },

    /// A voter appears twice in the registry.
    #[error("voter {0} registered twice")]
    DuplicateRegistration(VoterId),
}

/// The tally, candidate list and voter registry.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BallotState {
    candidate_count: u32,
    total_votes: u32,
    voted_count: u32,
    duplicate_rejections: u32,
    invalid_rejections: u32,
    registry_full_rejections: u32,
    names: [[u8; MAX_NAME_LEN]; MAX_CANDIDATES],
    votes: [u32; MAX_CANDIDATES],
    voted_ids: [VoterId; MAX_VOTERS],
}

impl BallotState {
    /// Creates a zeroed tally with the given candidates.
    ///
    /// At most [`MAX_CANDIDATES`] names are kept.
    #[must_use]
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut state = Self::zeroed();
        state.reset(names);
        state
    }

    /// Replaces the candidate list and zeroes the tally, registry and counters.
    pub fn reset<S: AsRef<str>>(&mut self, names: &[S]) {
        *self = Self::zeroed();
        for (slot, name) in self.names.iter_mut().zip(names) {
            encode_name(slot, name.as_ref());
        }
        self.candidate_count = names.len().min(MAX_CANDIDATES) as u32;
    }

    /// Number of candidates on the ballot.
    #[inline]
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        (self.candidate_count as usize).min(MAX_CANDIDATES)
    }

    /// Display name of a candidate, if the index is valid.
    #[must_use]
    pub fn candidate_name(&self, index: usize) -> Option<&str> {
        if index >= self.candidate_count() {
            return None;
        }
        let slot = &self.names[index];
        let len = slot.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        std::str::from_utf8(&slot[..len]).ok()
    }

    /// Per-candidate counts.
    #[inline]
    #[must_use]
    pub fn votes(&self) -> &[u32] {
        &self.votes[..self.candidate_count()]
    }

    /// Running total of recorded votes.
    #[inline]
    #[must_use]
    pub const fn total_votes(&self) -> u32 {
        self.total_votes
    }

    /// Voters that have already voted, in registration order.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &[VoterId] {
        &self.voted_ids[..(self.voted_count as usize).min(MAX_VOTERS)]
    }

    /// Returns true if the voter is already registered.
    #[must_use]
    pub fn has_voted(&self, voter: VoterId) -> bool {
        self.registry().contains(&voter)
    }

    /// Applies one vote attempt.
    ///
    /// Checks run in a fixed order: duplicate voter, candidate range, registry
    /// capacity. On success the count, the total and the registry entry change
    /// together; on rejection only the matching rejection counter moves.
    pub fn apply_vote(&mut self, voter: VoterId, candidate: usize) -> VoteOutcome {
        if self.has_voted(voter) {
            self.duplicate_rejections = self.duplicate_rejections.saturating_add(1);
            return VoteOutcome::DuplicateVote;
        }

        if candidate >= self.candidate_count() {
            self.invalid_rejections = self.invalid_rejections.saturating_add(1);
            return VoteOutcome::InvalidCandidate;
        }

        let slot = self.voted_count as usize;
        if slot >= MAX_VOTERS {
            self.registry_full_rejections = self.registry_full_rejections.saturating_add(1);
            return VoteOutcome::RegistryFull;
        }

        self.votes[candidate] += 1;
        self.total_votes += 1;
        self.voted_ids[slot] = voter;
        self.voted_count += 1;

        VoteOutcome::Recorded
    }

    /// Checks `total == sum(votes) == |registry|` and registry uniqueness.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let sum: u64 = self.votes().iter().map(|&v| u64::from(v)).sum();
        if sum != u64::from(self.total_votes) {
            return Err(InvariantViolation::TotalMismatch {
                total: self.total_votes,
                sum,
            });
        }

        if self.voted_count != self.total_votes {
            return Err(InvariantViolation::RegistryMismatch {
                total: self.total_votes,
                registered: self.voted_count,
            });
        }

        let mut ids = self.registry().to_vec();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(InvariantViolation::DuplicateRegistration(pair[0]));
        }

        Ok(())
    }

    /// Copies the tally out for reporting.
    #[must_use]
    pub fn snapshot(&self) -> TallySnapshot {
        let candidates = (0..self.candidate_count())
            .map(|index| CandidateTally {
                index,
                name: self.candidate_name(index).unwrap_or("?").to_string(),
                votes: self.votes[index],
            })
            .collect();

        TallySnapshot {
            candidates,
            total_votes: self.total_votes,
            registered: self.voted_count,
            duplicate_rejections: self.duplicate_rejections,
            invalid_rejections: self.invalid_rejections,
            registry_full_rejections: self.registry_full_rejections,
        }
    }
}

impl Default for BallotState {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Writes `name` NUL padded, truncated on a character boundary so that at
/// least one trailing NUL remains.
fn encode_name(slot: &mut [u8; MAX_NAME_LEN], name: &str) {
    let mut end = name.len().min(MAX_NAME_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    slot.fill(0);
    slot[..end].copy_from_slice(&name.as_bytes()[..end]);
}

/// One candidate line of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateTally {
    /// Candidate index.
    pub index: usize,
    /// Display name.
    pub name: String,
    /// Votes counted so far.
    pub votes: u32,
}

/// Owned copy of the tally taken inside a read transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TallySnapshot {
    /// Candidates in index order.
    pub candidates: Vec<CandidateTally>,
    /// Running total.
    pub total_votes: u32,
    /// Registry size.
    pub registered: u32,
    /// Rejected repeat voters.
    pub duplicate_rejections: u32,
    /// Rejected out-of-range candidates.
    pub invalid_rejections: u32,
    /// Rejected because the registry was full.
    pub registry_full_rejections: u32,
}

impl TallySnapshot {
    /// Per-candidate counts in index order.
    #[must_use]
    pub fn votes(&self) -> Vec<u32> {
        self.candidates.iter().map(|c| c.votes).collect()
    }

    /// Share of the total held by a candidate, in percent.
    #[must_use]
    pub fn percentage(&self, index: usize) -> f64 {
        match self.candidates.get(index) {
            Some(c) if self.total_votes > 0 => {
                f64::from(c.votes) / f64::from(self.total_votes) * 100.0
            }
            _ => 0.0,
        }
    }

    /// All rejected attempts.
    #[must_use]
    pub fn rejections(&self) -> u32 {
        self.duplicate_rejections
            .saturating_add(self.invalid_rejections)
            .saturating_add(self.registry_full_rejections)
    }
}

impl fmt::Display for TallySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Current Vote Count ===")?;
        writeln!(f, "Total votes: {}", self.total_votes)?;
        for candidate in &self.candidates {
            writeln!(
                f,
                "• {}: {} votes ({:.1}%)",
                candidate.name,
                candidate.votes,
                self.percentage(candidate.index)
            )?;
        }
        write!(f, "===========================")
    }
}

//! # Ballot Core
//!
//! The synchronization engine behind the vote tally:
//! - **SharedState**: candidates, per-candidate counts and the voter registry,
//!   laid out as plain `#[repr(C)]` data so it can live in a shared mapping
//! - **SyncGate**: the first-reader-blocks-writer protocol over any lock
//!   capability (thread-local binary semaphores or named OS semaphores)
//! - **Transactions**: the read and write bodies every backend runs
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────┐        ┌────────────────────────────┐
//!  actor ───▶│ Ballot<A, L> │───────▶│ SyncGate<L>                │
//!            │  read/write  │        │  count_mutex │ write_lock  │
//!            └──────┬───────┘        └────────────────────────────┘
//!                   │ StateAccess
//!                   ▼
//!            ┌────────────────────────────┐
//!            │ SharedBallot               │
//!            │  GateHeader (atomics)      │
//!            │  UnsafeCell<BallotState>   │
//!            └────────────────────────────┘
//! ```
//!
//! The thread backend hands out `Arc<SharedBallot>`; the process backend maps
//! the same layout from a POSIX shared-memory object. Both run identical
//! transaction code.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ballot_core::{Ballot, NullSink};
//!
//! let ballot = Ballot::local();
//! ballot.configure(&["A".into(), "B".into()])?;
//! let outcome = ballot.cast_vote(7, 1, &NullSink)?;
//! let tally = ballot.observe()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cancel;
pub mod constants;
pub mod error;
pub mod ring_log;
pub mod state;
pub mod sync;
pub mod txn;

pub use cancel::{CancelToken, Cancellation};
pub use constants::{MAX_CANDIDATES, MAX_NAME_LEN, MAX_VOTERS};
pub use error::{GateError, GateResult};
pub use ring_log::{ByteLog, RingLog, RingReader};
pub use state::{
    BallotState, CandidateTally, GateHeader, InvariantViolation, SharedBallot, TallySnapshot,
    VoteOutcome, VoterId,
};
pub use sync::{GateLock, LocalLock, SyncGate};
pub use txn::{Ballot, LocalBallot, NullSink, StateAccess, VoteRecord, VoteSink};

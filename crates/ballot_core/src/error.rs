//! # Gate Error Types
//!
//! Failures of the synchronization layer. Vote rejections are not errors;
//! they are [`VoteOutcome`](crate::state::VoteOutcome) values.

use thiserror::Error;

/// Errors raised while entering or leaving a gate transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The underlying lock could not be acquired.
    #[error("failed to acquire {lock}: {reason}")]
    Acquire {
        /// Which lock of the gate.
        lock: &'static str,
        /// OS or runtime reason.
        reason: String,
    },

    /// The underlying lock could not be released.
    #[error("failed to release {lock}: {reason}")]
    Release {
        /// Which lock of the gate.
        lock: &'static str,
        /// OS or runtime reason.
        reason: String,
    },

    /// A lock was released that nobody holds.
    #[error("{0} released while not held")]
    NotHeld(&'static str),

    /// A reader left while the reader count was already zero.
    #[error("reader exit with zero active readers")]
    ReaderUnderflow,
}

/// Result type for gate operations.
pub type GateResult<T> = Result<T, GateError>;

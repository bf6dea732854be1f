//! # Tally Limits
//!
//! Compile-time capacities of the shared tally. They size the `#[repr(C)]`
//! layout that every process maps, so changing one changes the shared-memory
//! format.

/// Maximum number of candidates on a ballot.
pub const MAX_CANDIDATES: usize = 10;

/// Maximum number of distinct voters the registry can hold.
pub const MAX_VOTERS: usize = 1000;

/// Inline storage for one candidate name, in bytes (NUL padded).
pub const MAX_NAME_LEN: usize = 48;

/// Maximum number of reader actors in one run.
pub const MAX_OBSERVERS: usize = 20;

/// Candidate count used when the requested one is out of range.
pub const DEFAULT_CANDIDATES: usize = 3;

/// Writer count used when the requested one is out of range.
pub const DEFAULT_VOTERS: usize = 10;

/// Reader count used when the requested one is out of range.
pub const DEFAULT_OBSERVERS: usize = 3;

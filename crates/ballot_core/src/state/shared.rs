//! # Shared Ballot Block
//!
//! The unit that is shared between actors: an atomics-only header followed by
//! the tally in an `UnsafeCell`.
//!
//! ```text
//! ┌──────────────────────────── SharedBallot ───────────────────────────┐
//! │ GateHeader: magic │ reader_count │ cancelled │ observations │ viol. │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │ UnsafeCell<BallotState>                                             │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Threads share it through an `Arc`; processes map it from a shared-memory
//! object and initialize it in place with [`SharedBallot::init_at`].

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::Zeroable;

use super::BallotState;

/// Atomic fields that live next to the tally.
///
/// `reader_count` is only modified while holding the gate's count mutex; it is
/// atomic so that it can be read for diagnostics without the gate.
#[repr(C)]
#[derive(Debug)]
pub struct GateHeader {
    magic: AtomicU32,
    reader_count: AtomicU32,
    cancelled: AtomicU32,
    observations: AtomicU32,
    violations: AtomicU32,
}

impl GateHeader {
    fn new() -> Self {
        Self {
            magic: AtomicU32::new(SharedBallot::MAGIC),
            reader_count: AtomicU32::new(0),
            cancelled: AtomicU32::new(0),
            observations: AtomicU32::new(0),
            violations: AtomicU32::new(0),
        }
    }

    /// Number of readers currently inside a read transaction.
    #[inline]
    #[must_use]
    pub fn reader_count(&self) -> u32 {
        self.reader_count.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn readers(&self) -> &AtomicU32 {
        &self.reader_count
    }

    /// Returns true once any participant requested shutdown.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) != 0
    }

    /// Requests shutdown for every participant mapping this block.
    pub fn cancel(&self) {
        self.cancelled.store(1, Ordering::Release);
    }

    /// Completed observations since the last reset.
    #[must_use]
    pub fn observations(&self) -> u32 {
        self.observations.load(Ordering::Acquire)
    }

    /// Observations that found a broken invariant since the last reset.
    #[must_use]
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::Acquire)
    }

    pub(crate) fn note_observation(&self, consistent: bool) {
        self.observations.fetch_add(1, Ordering::AcqRel);
        if !consistent {
            self.violations.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Clears the run counters and the cancel flag. Call only while no actor
    /// is running.
    pub(crate) fn reset_run(&self) {
        self.cancelled.store(0, Ordering::Release);
        self.observations.store(0, Ordering::Release);
        self.violations.store(0, Ordering::Release);
    }
}

/// Header plus tally, shareable across threads or mapped across processes.
#[repr(C)]
#[derive(Debug)]
pub struct SharedBallot {
    header: GateHeader,
    state: UnsafeCell<BallotState>,
}

// SAFETY: the header is atomics only. The tally is reached only through
// `Ballot`, which holds the write lock for mutation and the reader side of the
// gate for reads.
unsafe impl Sync for SharedBallot {}

impl SharedBallot {
    /// Marker written into every initialized block ("BLT1").
    pub const MAGIC: u32 = 0x424C_5431;

    /// Creates an empty block with no candidates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: GateHeader::new(),
            state: UnsafeCell::new(BallotState::zeroed()),
        }
    }

    /// Initializes a block in place.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `size_of::<SharedBallot>()` bytes,
    /// suitably aligned, and not concurrently accessed.
    pub unsafe fn init_at(ptr: *mut Self) {
        ptr.write(Self::new());
    }

    /// The atomic header.
    #[inline]
    #[must_use]
    pub fn header(&self) -> &GateHeader {
        &self.header
    }

    /// Returns true if the block carries [`Self::MAGIC`].
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.header.magic.load(Ordering::Acquire) == Self::MAGIC
    }

    #[inline]
    pub(crate) fn state_ptr(&self) -> *mut BallotState {
        self.state.get()
    }
}

impl Default for SharedBallot {
    fn default() -> Self {
        Self::new()
    }
}

//! # Readers-Writers Gate
//!
//! First-reader-blocks-writer over two binary locks:
//!
//! ```text
//! reader enter:  count_mutex ▶ readers += 1 ▶ (0→1) write_lock ▶ count_mutex ◀
//! reader exit:   count_mutex ▶ readers -= 1 ▶ (1→0) write_lock ◀ count_mutex ◀
//! writer:        write_lock ▶ ... ▶ write_lock ◀
//! ```
//!
//! Any number of readers overlap; a writer excludes everyone. New readers are
//! admitted while readers are active, so a steady stream of readers can starve
//! writers.
//!
//! The gate is generic over [`GateLock`] so threads use [`LocalLock`] and
//! processes use named OS semaphores with the same protocol code.

mod local;

pub use local::LocalLock;

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{GateError, GateResult};

/// A binary lock that can be released by a different actor than the one that
/// acquired it.
pub trait GateLock: Send + Sync {
    /// Blocks until the lock is held by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Acquire`] if the underlying primitive fails.
    fn acquire(&self) -> GateResult<()>;

    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Release`] or [`GateError::NotHeld`].
    fn release(&self) -> GateResult<()>;

    /// Name used in error messages.
    fn name(&self) -> &'static str;
}

/// The two locks of the protocol.
///
/// The reader count itself lives in the shared header so that every process
/// sees the same value.
#[derive(Debug)]
pub struct SyncGate<L> {
    count_mutex: L,
    write_lock: L,
}

impl SyncGate<LocalLock> {
    /// Gate for actors inside one process.
    #[must_use]
    pub const fn local() -> Self {
        Self::new(LocalLock::new("count_mutex"), LocalLock::new("write_lock"))
    }
}

impl<L: GateLock> SyncGate<L> {
    /// Builds a gate from its two locks.
    pub const fn new(count_mutex: L, write_lock: L) -> Self {
        Self {
            count_mutex,
            write_lock,
        }
    }

    /// Enters the shared side. The first reader takes the write lock.
    ///
    /// # Errors
    ///
    /// Propagates lock failures. On error the caller is not inside.
    pub fn reader_enter(&self, readers: &AtomicU32) -> GateResult<()> {
        self.count_mutex.acquire()?;

        let entered = if readers.load(Ordering::Acquire) == 0 {
            self.write_lock.acquire()
        } else {
            Ok(())
        };
        if entered.is_ok() {
            readers.fetch_add(1, Ordering::AcqRel);
        }

        let released = self.count_mutex.release();
        entered.and(released)
    }

    /// Leaves the shared side. The last reader releases the write lock.
    ///
    /// # Errors
    ///
    /// [`GateError::ReaderUnderflow`] if no reader is inside, otherwise lock
    /// failures.
    pub fn reader_exit(&self, readers: &AtomicU32) -> GateResult<()> {
        self.count_mutex.acquire()?;

        let left = match readers.load(Ordering::Acquire) {
            0 => Err(GateError::ReaderUnderflow),
            1 => {
                readers.store(0, Ordering::Release);
                self.write_lock.release()
            }
            _ => {
                readers.fetch_sub(1, Ordering::AcqRel);
                Ok(())
            }
        };

        let released = self.count_mutex.release();
        left.and(released)
    }

    /// Takes the write lock.
    ///
    /// # Errors
    ///
    /// Propagates lock failures.
    #[inline]
    pub fn writer_enter(&self) -> GateResult<()> {
        self.write_lock.acquire()
    }

    /// Gives the write lock back.
    ///
    /// # Errors
    ///
    /// Propagates lock failures.
    #[inline]
    pub fn writer_exit(&self) -> GateResult<()> {
        self.write_lock.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reader_takes_write_lock() {
        let gate = SyncGate::local();
        let readers = AtomicU32::new(0);

        gate.reader_enter(&readers).unwrap();
        assert!(gate.write_lock.is_held());
        gate.reader_enter(&readers).unwrap();
        assert_eq!(readers.load(Ordering::Acquire), 2);

        gate.reader_exit(&readers).unwrap();
        assert!(gate.write_lock.is_held());
        gate.reader_exit(&readers).unwrap();
        assert!(!gate.write_lock.is_held());
        assert!(!gate.count_mutex.is_held());
    }

    #[test]
    fn test_reader_underflow() {
        let gate = SyncGate::local();
        let readers = AtomicU32::new(0);
        assert_eq!(gate.reader_exit(&readers), Err(GateError::ReaderUnderflow));
        assert!(!gate.count_mutex.is_held());
    }

    #[test]
    fn test_writer_exit_without_enter() {
        let gate = SyncGate::local();
        assert_eq!(gate.writer_exit(), Err(GateError::NotHeld("write_lock")));
    }
}

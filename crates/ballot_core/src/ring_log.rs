//! # Circular Byte Log
//!
//! A fixed-size in-memory log with one exclusive writer at a time and any
//! number of concurrent readers. When full, the oldest bytes are overwritten.
//!
//! ```text
//!  buf: [ o o o o n n n n n . . . ]      o = oldest kept, n = newest
//!                 ▲         ▲
//!          head - available  head (next write)
//! ```
//!
//! Readers hold their own cursor (an offset from the oldest kept byte), so
//! reading never consumes data for anyone else.

use parking_lot::RwLock;

use crate::txn::{VoteRecord, VoteSink};

/// Default capacity: 1 MiB.
pub const DEFAULT_RING_CAPACITY: usize = 1 << 20;

/// Byte sink for log text.
pub trait ByteLog: Send + Sync {
    /// Appends `bytes`, returns how many were stored.
    fn write(&self, bytes: &[u8]) -> usize;
}

#[derive(Debug)]
struct Ring {
    buf: Box<[u8]>,
    head: usize,
    available: usize,
}

impl Ring {
    fn start(&self) -> usize {
        (self.head + self.buf.len() - self.available) % self.buf.len()
    }

    fn copy_out(&self, offset: usize, out: &mut [u8]) -> usize {
        let n = out.len().min(self.available.saturating_sub(offset));
        let size = self.buf.len();
        let pos = (self.start() + offset) % size;
        let first = n.min(size - pos);
        out[..first].copy_from_slice(&self.buf[pos..pos + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        n
    }
}

/// 1 MiB (by default) overwrite-oldest byte log.
#[derive(Debug)]
pub struct RingLog {
    ring: RwLock<Ring>,
}

impl RingLog {
    /// Creates a log with [`DEFAULT_RING_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    /// Creates a log holding at most `capacity` bytes (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: RwLock::new(Ring {
                buf: vec![0; capacity.max(1)].into_boxed_slice(),
                head: 0,
                available: 0,
            }),
        }
    }

    /// Maximum number of bytes kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.read().buf.len()
    }

    /// Bytes currently kept.
    #[must_use]
    pub fn available(&self) -> usize {
        self.ring.read().available
    }

    /// A fresh cursor positioned at the oldest kept byte.
    #[must_use]
    pub fn reader(&self) -> RingReader<'_> {
        RingReader {
            log: self,
            offset: 0,
        }
    }

    /// Everything currently kept, oldest first.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        let ring = self.ring.read();
        let mut out = vec![0; ring.available];
        ring.copy_out(0, &mut out);
        out
    }

    /// Reads from `offset` bytes past the oldest kept byte.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> usize {
        self.ring.read().copy_out(offset, out)
    }
}

impl Default for RingLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteLog for RingLog {
    /// Input longer than the capacity is cut to the capacity.
    fn write(&self, bytes: &[u8]) -> usize {
        let mut ring = self.ring.write();
        let size = ring.buf.len();
        let n = bytes.len().min(size);
        let head = ring.head;

        let first = n.min(size - head);
        ring.buf[head..head + first].copy_from_slice(&bytes[..first]);
        ring.buf[..n - first].copy_from_slice(&bytes[first..n]);

        ring.head = (head + n) % size;
        ring.available = (ring.available + n).min(size);
        n
    }
}

impl VoteSink for RingLog {
    fn record(&self, record: &VoteRecord<'_>) {
        let mut line = record.describe();
        line.push('\n');
        self.write(line.as_bytes());
    }
}

/// Non-consuming cursor over a [`RingLog`].
#[derive(Debug)]
pub struct RingReader<'a> {
    log: &'a RingLog,
    offset: usize,
}

impl RingReader<'_> {
    /// Copies up to `out.len()` unread bytes, returns how many. Zero means the
    /// cursor has caught up.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.log.read_at(self.offset, out);
        self.offset += n;
        n
    }

    /// Moves the cursor back to the oldest kept byte.
    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    /// Current offset from the oldest kept byte.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VoteOutcome;

    #[test]
    fn test_wraparound_keeps_newest() {
        let log = RingLog::with_capacity(8);
        assert_eq!(log.write(b"abcdef"), 6);
        assert_eq!(log.write(b"ghij"), 4);
        assert_eq!(log.available(), 8);
        assert_eq!(log.contents(), b"cdefghij");
    }

    #[test]
    fn test_oversized_write_is_clamped() {
        let log = RingLog::with_capacity(4);
        assert_eq!(log.write(b"123456"), 4);
        assert_eq!(log.contents(), b"1234");
    }

    #[test]
    fn test_readers_have_independent_cursors() {
        let log = RingLog::with_capacity(64);
        log.write(b"hello world");

        let mut a = log.reader();
        let mut b = log.reader();
        let mut buf = [0u8; 5];

        assert_eq!(a.read(&mut buf), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(a.read(&mut buf), 5);
        assert_eq!(&buf, b" worl");

        assert_eq!(b.read(&mut buf), 5);
        assert_eq!(&buf, b"hello");

        let mut rest = [0u8; 16];
        assert_eq!(a.read(&mut rest), 1);
        assert_eq!(a.read(&mut rest), 0);
        a.rewind();
        assert_eq!(a.offset(), 0);
    }

    #[test]
    fn test_read_across_wrap() {
        let log = RingLog::with_capacity(6);
        log.write(b"1234");
        log.write(b"5678");
        let mut out = [0u8; 6];
        assert_eq!(log.reader().read(&mut out), 6);
        assert_eq!(&out, b"345678");
    }

    #[test]
    fn test_vote_records_land_as_lines() {
        let log = RingLog::new();
        log.record(&VoteRecord {
            voter: 3,
            candidate: 7,
            candidate_name: None,
            outcome: VoteOutcome::InvalidCandidate,
        });
        let text = String::from_utf8(log.contents()).unwrap();
        assert_eq!(
            text,
            "INVALID VOTE: VoterID 3 attempted to vote for invalid candidate ID 7\n"
        );
    }
}

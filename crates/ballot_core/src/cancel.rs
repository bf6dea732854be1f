//! # Cooperative Cancellation
//!
//! Actors never get killed mid-transaction. They check for cancellation
//! between steps and sleep through [`Cancellation::pause`], which wakes early
//! once shutdown is requested.
//!
//! ```text
//! CancelToken (session)
//!   ├─ child (run 1) ── cloned into every actor thread
//!   └─ child (run 2)
//!
//! cancel(): flag = true, drop wake Sender ─▶ every recv_timeout returns
//!           Disconnected ─▶ sleeping actors wake immediately
//! ```
//!
//! Processes cannot share a channel, so [`SharedBallot`] implements the same
//! trait over the cancellation flag in its mapped header.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::state::SharedBallot;

/// Polling step for flag-only cancellation.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Something an actor can check between steps.
pub trait Cancellation {
    /// Returns true once shutdown was requested.
    fn is_cancelled(&self) -> bool;

    /// Sleeps for `duration` or until cancelled.
    ///
    /// Returns `false` if the pause was cut short by cancellation.
    fn pause(&self, duration: Duration) -> bool;
}

#[derive(Debug)]
struct Inner {
    flag: AtomicBool,
    wake: Mutex<Option<Sender<()>>>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        if self.flag.swap(true, Ordering::AcqRel) {
            return;
        }
        self.wake.lock().take();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Clonable shutdown signal for actors in one process.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
    woken: Receiver<()>,
}

impl CancelToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                wake: Mutex::new(Some(tx)),
                children: Mutex::new(Vec::new()),
            }),
            woken: rx,
        }
    }

    /// Creates a token that is cancelled together with `self`, but can also
    /// be cancelled on its own without touching `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Requests shutdown. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// A receiver that disconnects on cancellation, for `select!`.
    #[must_use]
    pub fn wake_receiver(&self) -> Receiver<()> {
        self.woken.clone()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }

    fn pause(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.woken.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl Cancellation for SharedBallot {
    fn is_cancelled(&self) -> bool {
        self.header().is_cancelled()
    }

    fn pause(&self, duration: Duration) -> bool {
        // No deadline past the clock's range; only cancellation ends it.
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.header().is_cancelled() {
                return false;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    (deadline - now).min(POLL_SLICE)
                }
                None => POLL_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

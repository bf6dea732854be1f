//! In-process binary semaphore.

use parking_lot::{Condvar, Mutex};

use super::GateLock;
use crate::error::{GateError, GateResult};

/// A binary semaphore for actors that share an address space.
///
/// Unlike a mutex it has no owner: the last reader to leave releases the
/// write lock even when a different reader acquired it.
#[derive(Debug)]
pub struct LocalLock {
    name: &'static str,
    held: Mutex<bool>,
    available: Condvar,
}

impl LocalLock {
    /// Creates an unheld lock. `name` shows up in errors.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            held: Mutex::new(false),
            available: Condvar::new(),
        }
    }

    /// Returns true if someone holds the lock right now.
    #[must_use]
    pub fn is_held(&self) -> bool {
        *self.held.lock()
    }
}

impl GateLock for LocalLock {
    fn acquire(&self) -> GateResult<()> {
        let mut held = self.held.lock();
        while *held {
            self.available.wait(&mut held);
        }
        *held = true;
        Ok(())
    }

    fn release(&self) -> GateResult<()> {
        let mut held = self.held.lock();
        if !*held {
            return Err(GateError::NotHeld(self.name));
        }
        *held = false;
        drop(held);
        self.available.notify_one();
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

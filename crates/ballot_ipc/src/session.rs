//! # IPC Session
//!
//! One region plus its two named semaphores, bound into a [`Ballot`].
//!
//! The coordinator holds the owner session for the whole program run; every
//! forked actor opens its own participant session from the same
//! [`ResourceNames`].

use std::sync::atomic::{AtomicBool, Ordering};

use ballot_core::{Ballot, SyncGate};

use crate::error::IpcResult;
use crate::names::ResourceNames;
use crate::region::SharedRegion;
use crate::semaphore::NamedSemaphore;

/// Ballot shared across processes.
pub type ProcessBallot = Ballot<SharedRegion, NamedSemaphore>;

/// Owner or participant handle over one set of names.
#[derive(Debug)]
pub struct IpcSession {
    names: ResourceNames,
    ballot: ProcessBallot,
    owner: bool,
    destroyed: AtomicBool,
}

impl IpcSession {
    /// Creates every primitive. On failure, whatever was already created is
    /// removed again.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidName`](crate::IpcError::InvalidName) or [`IpcError::ResourceInit`](crate::IpcError::ResourceInit).
    pub fn create(names: ResourceNames) -> IpcResult<Self> {
        names.validate()?;

        let result = Self::create_parts(&names);
        match result {
            Ok((region, count_mutex, write_lock)) => {
                tracing::info!(region = %names.region, "IPC session created");
                Ok(Self::assemble(names, region, count_mutex, write_lock, true))
            }
            Err(err) => {
                unlink_all(&names);
                Err(err)
            }
        }
    }

    fn create_parts(
        names: &ResourceNames,
    ) -> IpcResult<(SharedRegion, NamedSemaphore, NamedSemaphore)> {
        let region = SharedRegion::create(&names.region)?;
        let count_mutex = NamedSemaphore::create(&names.count_mutex, "count_mutex", 1)?;
        let write_lock = NamedSemaphore::create(&names.write_lock, "write_lock", 1)?;
        Ok((region, count_mutex, write_lock))
    }

    /// Opens the primitives of an existing session.
    ///
    /// # Errors
    ///
    /// [`IpcError::Attach`](crate::IpcError::Attach), [`IpcError::Layout`](crate::IpcError::Layout) or
    /// [`IpcError::InvalidName`](crate::IpcError::InvalidName).
    pub fn open(names: ResourceNames) -> IpcResult<Self> {
        names.validate()?;
        let region = SharedRegion::open(&names.region)?;
        let count_mutex = NamedSemaphore::open(&names.count_mutex, "count_mutex")?;
        let write_lock = NamedSemaphore::open(&names.write_lock, "write_lock")?;
        Ok(Self::assemble(names, region, count_mutex, write_lock, false))
    }

    fn assemble(
        names: ResourceNames,
        region: SharedRegion,
        count_mutex: NamedSemaphore,
        write_lock: NamedSemaphore,
        owner: bool,
    ) -> Self {
        #[allow(unsafe_code)]
        // SAFETY: the region and both semaphores come from the same
        // `ResourceNames`, which is what every participant opens.
        let ballot = unsafe { Ballot::from_parts(region, SyncGate::new(count_mutex, write_lock)) };
        Self {
            names,
            ballot,
            owner,
            destroyed: AtomicBool::new(false),
        }
    }

    /// The ballot over the shared region.
    #[must_use]
    pub const fn ballot(&self) -> &ProcessBallot {
        &self.ballot
    }

    /// The names participants need to attach.
    #[must_use]
    pub const fn names(&self) -> &ResourceNames {
        &self.names
    }

    /// Returns true for the creating handle.
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.owner
    }

    /// Unlinks the region and both semaphores. Owner only, runs once; later
    /// calls and participant calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// The first unlink failure. The remaining objects are still attempted.
    pub fn destroy(&self) -> IpcResult<()> {
        if !self.owner || self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let region = self.ballot.access().destroy();
        let count = NamedSemaphore::unlink(&self.names.count_mutex).map(drop);
        let write = NamedSemaphore::unlink(&self.names.write_lock).map(drop);

        tracing::info!(region = %self.names.region, "IPC session destroyed");
        region.and(count).and(write)
    }
}

impl Drop for IpcSession {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::warn!(%err, "IPC cleanup on drop failed");
        }
    }
}

fn unlink_all(names: &ResourceNames) {
    let _ = nix::sys::mman::shm_unlink(names.region.as_str());
    for name in [&names.count_mutex, &names.write_lock] {
        if let Err(err) = NamedSemaphore::unlink(name) {
            tracing::warn!(%err, "cleanup after failed create");
        }
    }
}


//! # Shared-Memory Region
//!
//! A POSIX shared-memory object sized and laid out as one [`SharedBallot`].
//! The owner creates and initializes it; forked actors open it by name and
//! map the same bytes.
//!
//! ```text
//!  owner ── shm_open(O_CREAT|O_EXCL) ─ set_len ─ mmap ─ init_at ─┐
//!                                                                ▼
//!                                            /dev/shm/ballot.<pid>.tally
//!                                                                ▲
//!  child ── shm_open(O_RDWR) ─ size check ─ mmap ─ magic check ──┘
//! ```

#![allow(unsafe_code)]

use std::fs::File;
use std::io;
use std::mem::{align_of, size_of};
use std::os::unix::io::FromRawFd;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use ballot_core::{SharedBallot, StateAccess};
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;

use crate::error::{IpcError, IpcResult};
use crate::names;

/// Bytes mapped per region.
pub const REGION_SIZE: usize = size_of::<SharedBallot>();

/// A mapped ballot block.
#[derive(Debug)]
pub struct SharedRegion {
    block: NonNull<SharedBallot>,
    _map: MmapMut,
    name: String,
    owner: bool,
    unlinked: AtomicBool,
}

// SAFETY: `block` points into `_map`, which lives as long as `self` and is
// never remapped. `SharedBallot` itself is `Sync`.
unsafe impl Send for SharedRegion {}
// SAFETY: see above.
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Creates, sizes and initializes a fresh region. A stale object with the
    /// same name is removed first.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidName`] or [`IpcError::ResourceInit`]. Nothing is
    /// left behind on failure.
    pub fn create(name: &str) -> IpcResult<Self> {
        names::validate(name)?;
        let init_err = |source: io::Error| IpcError::ResourceInit {
            resource: name.to_string(),
            source,
        };

        let _ = shm_unlink(name);
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|errno| init_err(errno.into()))?;

        let mapped = Self::map_new(fd).map_err(init_err);
        let mut map = match mapped {
            Ok(map) => map,
            Err(err) => {
                let _ = shm_unlink(name);
                return Err(err);
            }
        };

        let block = match Self::checked_block(&mut map, name) {
            Ok(block) => block,
            Err(err) => {
                let _ = shm_unlink(name);
                return Err(err);
            }
        };
        // SAFETY: the mapping is aligned, REGION_SIZE long, writable and not
        // yet visible to anyone else.
        unsafe { SharedBallot::init_at(block.as_ptr()) };

        tracing::debug!(name, size = REGION_SIZE, "shared region created");

        Ok(Self {
            block,
            _map: map,
            name: name.to_string(),
            owner: true,
            unlinked: AtomicBool::new(false),
        })
    }

    fn map_new(fd: std::os::unix::io::RawFd) -> io::Result<MmapMut> {
        // SAFETY: `fd` was just returned by shm_open and is owned by nobody else.
        let file = unsafe { File::from_raw_fd(fd) };
        file.set_len(REGION_SIZE as u64)?;
        // SAFETY: the object is shared on purpose; all access goes through
        // `SharedBallot`'s atomics and the gate.
        unsafe { MmapOptions::new().len(REGION_SIZE).map_mut(&file) }
    }

    /// Opens a region created by the owner.
    ///
    /// # Errors
    ///
    /// [`IpcError::Attach`] if it cannot be opened or mapped,
    /// [`IpcError::Layout`] if its size or magic is wrong.
    pub fn open(name: &str) -> IpcResult<Self> {
        names::validate(name)?;
        let attach_err = |source: io::Error| IpcError::Attach {
            resource: name.to_string(),
            source,
        };

        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())
            .map_err(|errno| attach_err(errno.into()))?;
        // SAFETY: `fd` was just returned by shm_open.
        let file = unsafe { File::from_raw_fd(fd) };

        let len = file.metadata().map_err(attach_err)?.len();
        if len < REGION_SIZE as u64 {
            return Err(IpcError::Layout {
                resource: name.to_string(),
                reason: format!("{len} bytes, need {REGION_SIZE}"),
            });
        }

        // SAFETY: see `map_new`.
        let mut map = unsafe { MmapOptions::new().len(REGION_SIZE).map_mut(&file) }
            .map_err(attach_err)?;

        let block = Self::checked_block(&mut map, name)?;
        // SAFETY: `block` is aligned and in bounds (checked above).
        if !unsafe { block.as_ref() }.is_initialized() {
            return Err(IpcError::Layout {
                resource: name.to_string(),
                reason: "missing ballot magic".to_string(),
            });
        }

        Ok(Self {
            block,
            _map: map,
            name: name.to_string(),
            owner: false,
            unlinked: AtomicBool::new(false),
        })
    }

    fn checked_block(map: &mut MmapMut, name: &str) -> IpcResult<NonNull<SharedBallot>> {
        let ptr = map.as_mut_ptr().cast::<SharedBallot>();
        if map.len() < REGION_SIZE || (ptr as usize) % align_of::<SharedBallot>() != 0 {
            return Err(IpcError::Layout {
                resource: name.to_string(),
                reason: "mapping too small or misaligned".to_string(),
            });
        }
        NonNull::new(ptr).ok_or_else(|| IpcError::Layout {
            resource: name.to_string(),
            reason: "null mapping".to_string(),
        })
    }

    /// POSIX name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the handle that created the region.
    #[must_use]
    pub const fn is_owner(&self) -> bool {
        self.owner
    }

    /// Unlinks the object. Only the owner unlinks; repeated calls and calls
    /// on participant handles are no-ops. The mapping stays valid until drop.
    ///
    /// # Errors
    ///
    /// [`IpcError::ResourceInit`] if `shm_unlink` fails with anything but
    /// "not found".
    pub fn destroy(&self) -> IpcResult<()> {
        if !self.owner || self.unlinked.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match shm_unlink(self.name.as_str()) {
            Ok(()) | Err(Errno::ENOENT) => {
                tracing::debug!(name = %self.name, "shared region unlinked");
                Ok(())
            }
            Err(errno) => Err(IpcError::ResourceInit {
                resource: self.name.clone(),
                source: errno.into(),
            }),
        }
    }
}

impl StateAccess for SharedRegion {
    #[inline]
    fn shared(&self) -> &SharedBallot {
        // SAFETY: `block` is valid for the lifetime of `self` (see `Send`).
        unsafe { self.block.as_ref() }
    }
}

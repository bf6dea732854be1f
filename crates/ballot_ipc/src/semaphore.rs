//! # Named Semaphores
//!
//! POSIX named semaphores used as binary gate locks between processes.
//!
//! | Call                        | Who          | Effect                       |
//! |-----------------------------|--------------|------------------------------|
//! | [`NamedSemaphore::create`]  | owner        | `sem_open(O_CREAT\|O_EXCL)`  |
//! | [`NamedSemaphore::open`]    | participants | `sem_open(0)`                |
//! | drop                        | everyone     | `sem_close`                  |
//! | [`NamedSemaphore::unlink`]  | owner        | `sem_unlink`, idempotent     |

#![allow(unsafe_code)]

use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

use ballot_core::{GateError, GateLock, GateResult};
use nix::errno::Errno;

use crate::error::{IpcError, IpcResult};
use crate::names;

/// Permission bits for created semaphores.
const SEM_MODE: libc::c_uint = 0o600;

/// Handle to an open named semaphore.
#[derive(Debug)]
pub struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
    name: CString,
    label: &'static str,
}

// SAFETY: a `sem_t*` from `sem_open` may be used from any thread; all
// operations on it are thread-safe by POSIX.
unsafe impl Send for NamedSemaphore {}
// SAFETY: see above.
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Creates a new semaphore with `initial` permits, removing a stale one
    /// with the same name first.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidName`] or [`IpcError::ResourceInit`].
    pub fn create(name: &str, label: &'static str, initial: u32) -> IpcResult<Self> {
        let c_name = c_name(name)?;
        // A leftover from a crashed session would make O_EXCL fail.
        // SAFETY: `c_name` is a valid NUL-terminated string.
        unsafe { libc::sem_unlink(c_name.as_ptr()) };

        // SAFETY: valid name; the variadic arguments are mode and value as
        // `c_uint`, which is what `sem_open` reads with O_CREAT.
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                SEM_MODE,
                libc::c_uint::from(initial),
            )
        };

        Self::from_raw(sem, c_name, label).map_err(|source| IpcError::ResourceInit {
            resource: name.to_string(),
            source,
        })
    }

    /// Opens a semaphore created by the owner.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidName`] or [`IpcError::Attach`].
    pub fn open(name: &str, label: &'static str) -> IpcResult<Self> {
        let c_name = c_name(name)?;
        // SAFETY: valid name; without O_CREAT no variadic arguments are read.
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };

        Self::from_raw(sem, c_name, label).map_err(|source| IpcError::Attach {
            resource: name.to_string(),
            source,
        })
    }

    fn from_raw(sem: *mut libc::sem_t, name: CString, label: &'static str) -> io::Result<Self> {
        if sem == libc::SEM_FAILED {
            return Err(Errno::last().into());
        }
        NonNull::new(sem)
            .map(|sem| Self { sem, name, label })
            .ok_or_else(|| io::Error::from(Errno::EINVAL))
    }

    /// Removes the name from the system. Open handles stay usable.
    ///
    /// Returns `Ok(false)` if the name was already gone.
    ///
    /// # Errors
    ///
    /// [`IpcError::Semaphore`] for anything but "not found".
    pub fn unlink(name: &str) -> IpcResult<bool> {
        let c_name = c_name(name)?;
        // SAFETY: valid NUL-terminated name.
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
            return Ok(true);
        }
        match Errno::last() {
            Errno::ENOENT => Ok(false),
            errno => Err(IpcError::Semaphore {
                name: name.to_string(),
                source: errno.into(),
            }),
        }
    }

    /// Current permit count, `None` where the platform cannot report it.
    #[must_use]
    pub fn value(&self) -> Option<i32> {
        let mut value: libc::c_int = 0;
        // SAFETY: `sem` is open until drop; `value` is a valid out pointer.
        if unsafe { libc::sem_getvalue(self.sem.as_ptr(), &mut value) } == 0 {
            Some(value)
        } else {
            None
        }
    }

    /// POSIX name.
    #[must_use]
    pub fn posix_name(&self) -> &str {
        self.name.to_str().unwrap_or("<non-utf8>")
    }
}

impl GateLock for NamedSemaphore {
    fn acquire(&self) -> GateResult<()> {
        loop {
            // SAFETY: `sem` came from a successful `sem_open` and is open
            // until drop.
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => {
                    return Err(GateError::Acquire {
                        lock: self.label,
                        reason: errno.desc().to_string(),
                    })
                }
            }
        }
    }

    fn release(&self) -> GateResult<()> {
        // Binary lock: a permit already available means nobody holds it.
        if self.value().is_some_and(|value| value >= 1) {
            return Err(GateError::NotHeld(self.label));
        }
        // SAFETY: see `acquire`.
        if unsafe { libc::sem_post(self.sem.as_ptr()) } == 0 {
            return Ok(());
        }
        Err(GateError::Release {
            lock: self.label,
            reason: Errno::last().desc().to_string(),
        })
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: closed exactly once, here.
        if unsafe { libc::sem_close(self.sem.as_ptr()) } != 0 {
            tracing::warn!(name = self.posix_name(), errno = %Errno::last(), "sem_close failed");
        }
    }
}

fn c_name(name: &str) -> IpcResult<CString> {
    names::validate(name)?;
    CString::new(name).map_err(|_| IpcError::InvalidName {
        name: name.to_string(),
        reason: "contains NUL",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unique(tag: &str) -> String {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        format!(
            "/ballot-sem-test.{}.{}.{}",
            std::process::id(),
            tag,
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_create_open_post_wait() {
        let name = unique("basic");
        let owner = NamedSemaphore::create(&name, "write_lock", 1).unwrap();
        let other = NamedSemaphore::open(&name, "write_lock").unwrap();

        owner.acquire().unwrap();
        other.release().unwrap();
        other.acquire().unwrap();
        owner.release().unwrap();

        assert!(NamedSemaphore::unlink(&name).unwrap());
    }

    #[test]
    fn test_release_unheld_is_error() {
        let name = unique("unheld");
        let sem = NamedSemaphore::create(&name, "write_lock", 1).unwrap();
        assert_eq!(sem.release(), Err(GateError::NotHeld("write_lock")));
        assert_eq!(sem.value(), Some(1));

        sem.acquire().unwrap();
        assert_eq!(sem.value(), Some(0));
        sem.release().unwrap();
        assert_eq!(sem.release(), Err(GateError::NotHeld("write_lock")));
        assert_eq!(sem.value(), Some(1));

        NamedSemaphore::unlink(&name).unwrap();
    }

    #[test]
    fn test_unlink_twice() {
        let name = unique("twice");
        let _sem = NamedSemaphore::create(&name, "count_mutex", 1).unwrap();
        assert!(NamedSemaphore::unlink(&name).unwrap());
        assert!(!NamedSemaphore::unlink(&name).unwrap());
    }

    #[test]
    fn test_open_missing_fails() {
        let name = unique("missing");
        let err = NamedSemaphore::open(&name, "write_lock").unwrap_err();
        assert!(matches!(err, IpcError::Attach { .. }));
    }

    #[test]
    fn test_create_replaces_stale() {
        let name = unique("stale");
        let first = NamedSemaphore::create(&name, "write_lock", 1).unwrap();
        drop(first);
        let second = NamedSemaphore::create(&name, "write_lock", 1).unwrap();
        assert_eq!(second.posix_name(), name);
        NamedSemaphore::unlink(&name).unwrap();
    }
}

//! POSIX names of one session's primitives.

use std::fmt;

use crate::error::{IpcError, IpcResult};

/// Longest name accepted for any object. Linux allows 251 bytes for
/// semaphores (`NAME_MAX - 4`); macOS allows 31 for everything.
#[cfg(target_os = "macos")]
const MAX_NAME: usize = 31;
#[cfg(not(target_os = "macos"))]
const MAX_NAME: usize = 251;

/// Default prefix for every object.
pub const DEFAULT_PREFIX: &str = "ballot";

/// The three names a session uses. Participants need only these to attach.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceNames {
    /// Shared-memory object holding the ballot block.
    pub region: String,
    /// Semaphore guarding the reader count.
    pub count_mutex: String,
    /// Semaphore excluding writers.
    pub write_lock: String,
}

impl ResourceNames {
    /// Names for `prefix` and an arbitrary session tag.
    pub fn new(prefix: &str, tag: impl fmt::Display) -> Self {
        Self {
            region: format!("/{prefix}.{tag}.tally"),
            count_mutex: format!("/{prefix}.{tag}.count"),
            write_lock: format!("/{prefix}.{tag}.write"),
        }
    }

    /// Names tagged with the current process id.
    #[must_use]
    pub fn for_current_process(prefix: &str) -> Self {
        Self::new(prefix, std::process::id())
    }

    /// Checks all three names.
    ///
    /// # Errors
    ///
    /// [`IpcError::InvalidName`] for the first bad name.
    pub fn validate(&self) -> IpcResult<()> {
        for name in self.iter() {
            validate(name)?;
        }
        Ok(())
    }

    /// Region, count mutex, write lock.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [
            self.region.as_str(),
            self.count_mutex.as_str(),
            self.write_lock.as_str(),
        ]
        .into_iter()
    }
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self::for_current_process(DEFAULT_PREFIX)
    }
}

/// One leading slash, no other slash, no NUL, bounded length.
pub(crate) fn validate(name: &str) -> IpcResult<()> {
    let invalid = |reason| {
        Err(IpcError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    let Some(rest) = name.strip_prefix('/') else {
        return invalid("must start with '/'");
    };
    if rest.is_empty() {
        return invalid("empty");
    }
    if rest.contains('/') {
        return invalid("contains '/' after the first character");
    }
    if name.contains('\0') {
        return invalid("contains NUL");
    }
    if name.len() > MAX_NAME {
        return invalid("too long");
    }
    Ok(())
}

//! Errors raised while creating, opening or removing OS primitives.

use std::io;

use thiserror::Error;

/// IPC failures.
#[derive(Error, Debug)]
pub enum IpcError {
    /// The owner could not create a primitive. Fatal for the session.
    #[error("failed to create {resource}: {source}")]
    ResourceInit {
        /// POSIX name of the object.
        resource: String,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// A participant could not open an existing primitive.
    #[error("failed to attach to {resource}: {source}")]
    Attach {
        /// POSIX name of the object.
        resource: String,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// The object exists but does not hold a ballot block.
    #[error("{resource} has an unexpected layout: {reason}")]
    Layout {
        /// POSIX name of the object.
        resource: String,
        /// What did not match.
        reason: String,
    },

    /// Closing or unlinking a semaphore failed.
    #[error("semaphore {name}: {source}")]
    Semaphore {
        /// POSIX name of the semaphore.
        name: String,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// Not a valid POSIX object name.
    #[error("invalid IPC name {name:?}: {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// Rule that was broken.
        reason: &'static str,
    },
}

impl IpcError {
    /// Returns true for errors that must end the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ResourceInit { .. } | Self::InvalidName { .. })
    }
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;

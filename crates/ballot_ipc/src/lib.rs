//! # Ballot IPC
//!
//! Cross-process building blocks for the process backend:
//! - **SharedRegion**: the `SharedBallot` block in a POSIX shared-memory object
//! - **NamedSemaphore**: named semaphores implementing `GateLock`
//! - **IpcSession**: owner / participant bundle producing a `ProcessBallot`
//!
//! ## Lifecycle
//!
//! ```text
//! coordinator            child (fork)            child (fork)
//!     │ create                │                       │
//!     │──────────────▶ names ─┼─ open ───────────────▶│ open
//!     │                       │ work, close, _exit    │ work, close, _exit
//!     │ waitpid ◀─────────────┘◀──────────────────────┘
//!     │ destroy (unlink, once)
//! ```
//!
//! Participants never unlink. The owner unlinks exactly once, on explicit
//! `destroy` or on drop.

#![cfg(unix)]
#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod names;
pub mod region;
pub mod semaphore;
pub mod session;

pub use error::{IpcError, IpcResult};
pub use names::{ResourceNames, DEFAULT_PREFIX};
pub use region::{SharedRegion, REGION_SIZE};
pub use semaphore::NamedSemaphore;
pub use session::{IpcSession, ProcessBallot};

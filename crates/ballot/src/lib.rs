//! # Ballot
//!
//! A readers-writers vote tally exercised by two interchangeable backends:
//! OS threads sharing one in-process ballot, and forked processes sharing a
//! POSIX shared-memory block guarded by named semaphores.
//!
//! ## Modules
//!
//! - [`config`]: TOML tunables and request sanitizing
//! - [`plan`]: seeded vote plans, identical for both backends
//! - [`actor`]: writer and reader bodies
//! - [`runner`]: the thread and process backends
//! - [`coordinator`]: session ownership, runs, manual voting and teardown
//! - [`txlog`] and [`perf`]: session logs, performance data and reports
//! - [`console`]: the interactive program loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use ballot::{Backend, BallotConfig, Coordinator, RunRequest};
//!
//! let coordinator = Coordinator::new(BallotConfig::default())?;
//! let report = coordinator.run(RunRequest::new(Backend::Thread).sanitize())?;
//! println!("{report}");
//! coordinator.shutdown()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actor;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod perf;
pub mod plan;
pub mod runner;
pub mod telemetry;
pub mod txlog;

pub use config::{Adjustment, Backend, BallotConfig, ConfigError, RunConfig, RunRequest, ThinkRange};
pub use console::{Console, Phase};
pub use coordinator::{Coordinator, ManualSession, RunReport};
pub use perf::{PerfRecord, PerfStore, PerfSummary};
pub use plan::VotePlan;
pub use runner::{ActorRunner, BatchReport, RunContext, RunError, RunResult, ThreadRunner};
#[cfg(unix)]
pub use runner::ProcessRunner;
pub use txlog::{SessionMode, TransactionLog};

//! # Transaction Log
//!
//! One human-readable file per session:
//!
//! ```text
//! =================================================
//! VOTING SESSION LOG - Thread MODE
//! =================================================
//! Session started at: Sun Oct 18 10:00:00 2026
//! ...
//! CANDIDATE SETUP:
//! Candidate 0: Alice
//! ...
//! VOTING RECORD:
//! [18-10-2026 10:00:01] SUCCESS: VoterID 1 voted for Candidate 'Alice' (ID: 0)
//! ...
//! EXECUTION STATISTICS:
//! ...
//! VOTING SESSION SUMMARY
//! ...
//! END OF VOTING SESSION LOG
//! ```
//!
//! Vote lines are written and flushed while the write lock is held, so lines
//! from threads and forked children never interleave. Every handle appends.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ballot_core::{TallySnapshot, VoteRecord, VoteSink};
use chrono::Local;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::Backend;

const RULE: &str = "=================================================";
const DASHES: &str = "-------------------------------------------------";

/// `ctime`-style wall clock for section headers.
pub(crate) fn clock_time() -> String {
    Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Timestamp used in file names.
pub(crate) fn file_stamp() -> String {
    Local::now().format("%d-%m-%Y_%H-%M-%S").to_string()
}

/// Which kind of session a log describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// Votes typed at the console.
    Manual,
    /// A simulated batch.
    Simulated(Backend),
}

impl SessionMode {
    /// Label used in the file name and header.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Simulated(backend) => backend.label(),
        }
    }
}

/// Actor counts written to the setup section of simulated sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionCounts {
    /// Writers (voters).
    pub writers: usize,
    /// Readers (observers).
    pub readers: usize,
}

/// Append-only, line-oriented session log.
#[derive(Debug)]
pub struct TransactionLog {
    path: PathBuf,
    out: Mutex<BufWriter<File>>,
}

impl TransactionLog {
    /// Creates `vote_log_[<stamp>]_<Mode>.txt` in `dir` and writes the header.
    ///
    /// # Errors
    ///
    /// IO failures creating the directory or file.
    pub fn create(dir: &Path, mode: SessionMode) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("vote_log_[{}]_{}.txt", file_stamp(), mode.label()));
        let log = Self::reopen(&path)?;

        let mut header = String::new();
        let _ = writeln!(header, "{RULE}");
        let _ = writeln!(header, "VOTING SESSION LOG - {} MODE", mode.label());
        let _ = writeln!(header, "{RULE}");
        let _ = writeln!(header, "Session started at: {}\n", clock_time());
        let _ = writeln!(header, "System information: Synchronized Voting System");
        let _ = writeln!(header, "{DASHES}\n");
        log.write_block(&header)?;

        debug!(path = %log.path.display(), "transaction log created");
        Ok(log)
    }

    /// Opens an existing log for appending.
    ///
    /// # Errors
    ///
    /// IO failures opening the file.
    pub fn reopen(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Candidate list, mode details and the start of the voting record.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn write_setup(
        &self,
        candidates: &[String],
        mode: SessionMode,
        counts: Option<SessionCounts>,
    ) -> io::Result<()> {
        let mut text = String::from("CANDIDATE SETUP:\n");
        for (i, name) in candidates.iter().enumerate() {
            let _ = writeln!(text, "Candidate {i}: {name}");
        }
        text.push('\n');

        match mode {
            SessionMode::Manual => {
                text.push_str("MODE DETAILS: Manual interactive mode\n");
                text.push_str("INTERACTION: User-driven via CLI\n");
            }
            SessionMode::Simulated(backend) => {
                let _ = writeln!(text, "MODE DETAILS: {backend} simulation mode");
                if let Some(counts) = counts {
                    let _ = writeln!(
                        text,
                        "CONFIGURATION: {} voters, {} observers",
                        counts.writers, counts.readers
                    );
                }
                match backend {
                    Backend::Thread => {
                        text.push_str("IMPLEMENTATION: Using OS threads (std::thread)\n");
                    }
                    Backend::Process => {
                        text.push_str("IMPLEMENTATION: Using fork() for separate processes\n");
                        text.push_str("SYNCHRONIZATION: Shared memory and POSIX semaphores\n");
                    }
                }
            }
        }
        let _ = writeln!(text, "{DASHES}\n");
        text.push_str("VOTING RECORD:\n");
        self.write_block(&text)
    }

    /// Timing and outcome counts of a finished batch.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn write_statistics(&self, elapsed: Duration, tally: &TallySnapshot) -> io::Result<()> {
        let mut text = String::from("\nEXECUTION STATISTICS:\n");
        let _ = writeln!(
            text,
            "Total execution time: {:.2} seconds",
            elapsed.as_secs_f64()
        );
        let _ = writeln!(text, "Rejected duplicate votes: {}", tally.duplicate_rejections);
        let _ = writeln!(text, "Rejected invalid votes: {}", tally.invalid_rejections);
        let _ = writeln!(
            text,
            "Rejected registrations (registry full): {}",
            tally.registry_full_rejections
        );
        self.write_block(&text)
    }

    /// Final results and the closing banner.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn write_summary(&self, tally: &TallySnapshot) -> io::Result<()> {
        let mut text = format!("\n{DASHES}\nVOTING SESSION SUMMARY\n{DASHES}\n");
        let _ = writeln!(text, "Session ended at: {}", clock_time());
        let _ = writeln!(text, "Total votes cast: {}\n", tally.total_votes);
        text.push_str("FINAL RESULTS:\n");
        for candidate in &tally.candidates {
            let _ = writeln!(
                text,
                "• {}: {} votes ({:.1}%)",
                candidate.name,
                candidate.votes,
                tally.percentage(candidate.index)
            );
        }
        let _ = writeln!(text, "\n{RULE}\nEND OF VOTING SESSION LOG\n{RULE}");
        self.write_block(&text)
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }

    fn write_block(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

impl VoteSink for TransactionLog {
    fn record(&self, record: &VoteRecord<'_>) {
        let line = format!(
            "[{}] {}\n",
            Local::now().format("%d-%m-%Y %H:%M:%S"),
            record.describe()
        );
        if let Err(err) = self.write_block(&line) {
            warn!(path = %self.path.display(), %err, "failed to write vote record");
        }
    }
}

//! # Configuration
//!
//! Two layers:
//! - [`BallotConfig`]: tunables loaded once from TOML (every field optional)
//! - [`RunRequest`] → [`RunConfig`]: what the user asked for, clamped to the
//!   documented defaults with one [`Adjustment`] per correction
//!
//! ```toml
//! data_dir = "runs"
//! observation_cycles = 5
//! seed = 7
//!
//! [writer_think_ms]
//! min_ms = 1000
//! max_ms = 3000
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ballot_core::constants::{
    DEFAULT_CANDIDATES, DEFAULT_OBSERVERS, DEFAULT_VOTERS, MAX_CANDIDATES, MAX_OBSERVERS,
    MAX_VOTERS,
};
use ballot_core::ring_log::DEFAULT_RING_CAPACITY;
use ballot_core::VoterId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Candidate names used when the requested list is unusable.
pub const DEFAULT_CANDIDATE_NAMES: [&str; DEFAULT_CANDIDATES] =
    ["Candidate A", "Candidate B", "Candidate C"];

/// Config loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`BallotConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Which actor backend runs a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OS threads sharing the in-process ballot.
    Thread,
    /// Forked processes sharing the IPC session.
    Process,
}

impl Backend {
    /// Mode label used in file names and performance lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Thread => "Thread",
            Self::Process => "Process",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive think-time range in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkRange {
    /// Shortest pause.
    pub min_ms: u64,
    /// Longest pause.
    pub max_ms: u64,
}

impl ThinkRange {
    /// Range with both ends in milliseconds.
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Fixed pause.
    #[must_use]
    pub const fn fixed(ms: u64) -> Self {
        Self::new(ms, ms)
    }

    /// Draws one pause. Reversed bounds are swapped.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        Duration::from_millis(rng.gen_range(lo..=hi))
    }
}

/// Tunables, loaded from TOML. Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallotConfig {
    /// Directory for transaction logs, performance data and reports.
    pub data_dir: PathBuf,
    /// Write a `vote_log_[..]_<Mode>.txt` per session.
    pub transaction_logs: bool,
    /// Performance data file name inside `data_dir`.
    pub perf_file: String,
    /// Prefix of the POSIX object names.
    pub ipc_prefix: String,
    /// Pause before a writer votes.
    pub writer_think_ms: ThinkRange,
    /// Pause before each observation.
    pub reader_think_ms: ThinkRange,
    /// Observations per reader.
    pub observation_cycles: u32,
    /// Capacity of the in-memory vote ring log.
    pub ring_log_capacity: usize,
    /// Seed for vote plans when a run does not give one.
    pub seed: Option<u64>,
}

impl Default for BallotConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            transaction_logs: true,
            perf_file: "performance_data.txt".to_string(),
            ipc_prefix: "ballot".to_string(),
            writer_think_ms: ThinkRange::new(1000, 3000),
            reader_think_ms: ThinkRange::new(1000, 3000),
            observation_cycles: 5,
            ring_log_capacity: DEFAULT_RING_CAPACITY,
            seed: None,
        }
    }
}

impl BallotConfig {
    /// Loads a TOML file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// The TOML error.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Full path of the performance data file.
    #[must_use]
    pub fn perf_path(&self) -> PathBuf {
        self.data_dir.join(&self.perf_file)
    }
}

/// A run as requested, before clamping. Counts are signed so that any user
/// input can be represented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    /// Backend to use.
    pub backend: Backend,
    /// Candidate names. Empty entries get a generated name.
    pub candidates: Vec<String>,
    /// Candidate count as typed, reported when out of range. Defaults to
    /// the length of `candidates`.
    pub candidate_count: Option<i64>,
    /// Number of writer actors.
    pub writers: i64,
    /// Number of reader actors.
    pub readers: i64,
    /// Plan seed.
    pub seed: Option<u64>,
    /// Explicit `(voter, candidate)` per writer instead of a random plan.
    pub votes: Option<Vec<(VoterId, usize)>>,
}

impl RunRequest {
    /// Request with default candidates and counts.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            candidates: DEFAULT_CANDIDATE_NAMES.iter().map(ToString::to_string).collect(),
            candidate_count: None,
            writers: DEFAULT_VOTERS as i64,
            readers: DEFAULT_OBSERVERS as i64,
            seed: None,
            votes: None,
        }
    }

    /// Clamps every field to its valid range.
    #[must_use]
    pub fn sanitize(self) -> RunConfig {
        let mut adjustments = Vec::new();

        let requested = self
            .candidate_count
            .unwrap_or_else(|| i64::try_from(self.candidates.len()).unwrap_or(i64::MAX));
        let candidates = if (1..=MAX_CANDIDATES).contains(&self.candidates.len())
            && clamp_count(requested, MAX_CANDIDATES).is_some()
        {
            self.candidates
                .into_iter()
                .enumerate()
                .map(|(i, name)| {
                    let trimmed = name.trim();
                    if trimmed.is_empty() {
                        adjustments.push(Adjustment::CandidateName(i));
                        format!("Candidate {}", i + 1)
                    } else {
                        trimmed.to_string()
                    }
                })
                .collect()
        } else {
            adjustments.push(Adjustment::Candidates(requested));
            DEFAULT_CANDIDATE_NAMES.iter().map(ToString::to_string).collect()
        };

        let writers = clamp_count(self.writers, MAX_VOTERS).unwrap_or_else(|| {
            adjustments.push(Adjustment::Writers(self.writers));
            DEFAULT_VOTERS
        });

        let readers =
            clamp_count(self.readers, MAX_OBSERVERS).unwrap_or_else(|| {
                adjustments.push(Adjustment::Readers(self.readers));
                DEFAULT_OBSERVERS
            });

        // An explicit vote list decides the writer count.
        let votes = self.votes.filter(|v| !v.is_empty()).map(|mut v| {
            v.truncate(MAX_VOTERS);
            v
        });
        let writers = votes.as_ref().map_or(writers, Vec::len);

        RunConfig {
            backend: self.backend,
            candidates,
            writers,
            readers,
            seed: self.seed,
            votes,
            adjustments,
        }
    }
}

fn clamp_count(requested: i64, max: usize) -> Option<usize> {
    usize::try_from(requested)
        .ok()
        .filter(|n| (1..=max).contains(n))
}

/// One correction applied by [`RunRequest::sanitize`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Adjustment {
    /// Candidate count was out of range.
    Candidates(i64),
    /// Candidate at this index had an empty name.
    CandidateName(usize),
    /// Writer count was out of range.
    Writers(i64),
    /// Reader count was out of range.
    Readers(i64),
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Candidates(n) => write!(
                f,
                "{n} candidates is out of range (1-{MAX_CANDIDATES}). Using default ({DEFAULT_CANDIDATES} candidates)."
            ),
            Self::CandidateName(i) => {
                write!(f, "Empty name for candidate {i}. Using default name.")
            }
            Self::Writers(n) => write!(
                f,
                "{n} voters is out of range (1-{MAX_VOTERS}). Using default ({DEFAULT_VOTERS} voters)."
            ),
            Self::Readers(n) => write!(
                f,
                "{n} observers is out of range (1-{MAX_OBSERVERS}). Using default ({DEFAULT_OBSERVERS} observers)."
            ),
        }
    }
}

/// A validated run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Backend to use.
    pub backend: Backend,
    /// `1..=MAX_CANDIDATES` non-empty names.
    pub candidates: Vec<String>,
    /// `1..=MAX_VOTERS` writers.
    pub writers: usize,
    /// `1..=MAX_OBSERVERS` readers.
    pub readers: usize,
    /// Plan seed, if fixed.
    pub seed: Option<u64>,
    /// Explicit votes, if given.
    pub votes: Option<Vec<(VoterId, usize)>>,
    /// Corrections made while sanitizing.
    pub adjustments: Vec<Adjustment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = BallotConfig::from_toml("").unwrap();
        assert_eq!(config, BallotConfig::default());
        assert_eq!(config.observation_cycles, 5);
        assert_eq!(config.perf_path(), PathBuf::from("./performance_data.txt"));
    }

    #[test]
    fn test_partial_toml() {
        let config = BallotConfig::from_toml(
            r#"
            data_dir = "/tmp/ballot"
            seed = 9

            [writer_think_ms]
            min_ms = 0
            max_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ballot"));
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.writer_think_ms, ThinkRange::new(0, 10));
        assert_eq!(config.reader_think_ms, ThinkRange::new(1000, 3000));
    }

    #[test]
    fn test_bad_toml_is_error() {
        assert!(BallotConfig::from_toml("observation_cycles = \"many\"").is_err());
    }

    #[test]
    fn test_sanitize_keeps_valid_request() {
        let mut request = RunRequest::new(Backend::Thread);
        request.candidates = vec!["A".into(), "B".into()];
        request.writers = 5;
        request.readers = 2;
        let config = request.sanitize();
        assert!(config.adjustments.is_empty());
        assert_eq!(config.candidates, vec!["A", "B"]);
        assert_eq!((config.writers, config.readers), (5, 2));
    }

    #[test]
    fn test_sanitize_clamps_out_of_range() {
        let request = RunRequest {
            backend: Backend::Process,
            candidates: (0..11).map(|i| i.to_string()).collect(),
            candidate_count: None,
            writers: 0,
            readers: 21,
            seed: None,
            votes: None,
        };
        let config = request.sanitize();
        assert_eq!(config.candidates, DEFAULT_CANDIDATE_NAMES);
        assert_eq!(config.writers, DEFAULT_VOTERS);
        assert_eq!(config.readers, DEFAULT_OBSERVERS);
        assert_eq!(
            config.adjustments,
            vec![
                Adjustment::Candidates(11),
                Adjustment::Writers(0),
                Adjustment::Readers(21)
            ]
        );
    }

    #[test]
    fn test_sanitize_reports_typed_candidate_count() {
        let mut request = RunRequest::new(Backend::Thread);
        request.candidates = Vec::new();
        request.candidate_count = Some(-3);
        let config = request.sanitize();
        assert_eq!(config.candidates, DEFAULT_CANDIDATE_NAMES);
        assert_eq!(config.adjustments, vec![Adjustment::Candidates(-3)]);
        assert_eq!(
            config.adjustments[0].to_string(),
            format!(
                "-3 candidates is out of range (1-{MAX_CANDIDATES}). Using default ({DEFAULT_CANDIDATES} candidates)."
            )
        );
    }

    #[test]
    fn test_sanitize_names_empty_candidates() {
        let mut request = RunRequest::new(Backend::Thread);
        request.candidates = vec!["Ada".into(), "  ".into()];
        let config = request.sanitize();
        assert_eq!(config.candidates, vec!["Ada", "Candidate 2"]);
        assert_eq!(config.adjustments, vec![Adjustment::CandidateName(1)]);
    }

    #[test]
    fn test_explicit_votes_set_writer_count() {
        let mut request = RunRequest::new(Backend::Thread);
        request.writers = 50;
        request.votes = Some(vec![(1, 0), (2, 1)]);
        let config = request.sanitize();
        assert_eq!(config.writers, 2);
        assert!(config.adjustments.is_empty());
    }

    #[test]
    fn test_think_range_sample_within_bounds() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let range = ThinkRange::new(30, 10);
        for _ in 0..100 {
            let d = range.sample(&mut rng);
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(30));
        }
        assert_eq!(ThinkRange::fixed(0).sample(&mut rng), Duration::ZERO);
    }
}

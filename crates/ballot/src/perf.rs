//! # Performance Data
//!
//! Every simulated batch appends one line to the performance file:
//!
//! ```text
//! [18-10-2026_10-00-00] Thread mode: 10 voters, 3 observers, 3.000000 seconds, 0.300000 sec/voter, 1.000000 sec/observer
//! ```
//!
//! Loading also accepts the older layout that stops after `seconds`; the
//! per-actor figures are then derived. Any other line is skipped.
//!
//! [`PerfSummary`] aggregates the file per backend. Per-actor means are
//! weighted by actor count, so a 1000-voter run outweighs a 10-voter run.

use std::fmt::{self, Write as _};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::config::Backend;
use crate::txlog::{clock_time, file_stamp};

static PERF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\[[^\]]*\])\s+(Thread|Process) mode:\s*(\d+) voters,\s*(\d+) observers,\s*([0-9.eE+-]+) seconds(?:,\s*([0-9.eE+-]+) sec/voter,\s*([0-9.eE+-]+) sec/observer)?",
    )
    .expect("performance line pattern is valid")
});

const RULE: &str = "=================================================";
const DASHES: &str = "-------------------------------------------------";

/// One measured batch.
#[derive(Clone, Debug, PartialEq)]
pub struct PerfRecord {
    /// `[dd-mm-YYYY_HH-MM-SS]`, brackets included.
    pub timestamp: String,
    /// Backend that ran the batch.
    pub backend: Backend,
    /// Writers in the batch.
    pub writers: u32,
    /// Readers in the batch.
    pub readers: u32,
    /// First spawn to last writer, in seconds.
    pub elapsed_seconds: f64,
    /// `elapsed_seconds / writers`.
    pub seconds_per_writer: f64,
    /// `elapsed_seconds / readers`.
    pub seconds_per_reader: f64,
}

fn per_actor(seconds: f64, actors: u32) -> f64 {
    if actors > 0 {
        seconds / f64::from(actors)
    } else {
        0.0
    }
}

impl PerfRecord {
    /// Record stamped with the current local time.
    #[must_use]
    pub fn new(backend: Backend, writers: u32, readers: u32, elapsed: Duration) -> Self {
        let elapsed_seconds = elapsed.as_secs_f64();
        Self {
            timestamp: format!("[{}]", file_stamp()),
            backend,
            writers,
            readers,
            elapsed_seconds,
            seconds_per_writer: per_actor(elapsed_seconds, writers),
            seconds_per_reader: per_actor(elapsed_seconds, readers),
        }
    }

    /// Parses either line layout. Returns `None` for anything else.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let caps = PERF_LINE.captures(line.trim())?;
        let backend = match &caps[2] {
            "Thread" => Backend::Thread,
            _ => Backend::Process,
        };
        let writers = caps[3].parse().ok()?;
        let readers = caps[4].parse().ok()?;
        let elapsed_seconds: f64 = caps[5].parse().ok()?;

        let (seconds_per_writer, seconds_per_reader) = match (caps.get(6), caps.get(7)) {
            (Some(w), Some(r)) => (w.as_str().parse().ok()?, r.as_str().parse().ok()?),
            _ => (
                per_actor(elapsed_seconds, writers),
                per_actor(elapsed_seconds, readers),
            ),
        };

        Some(Self {
            timestamp: caps[1].to_string(),
            backend,
            writers,
            readers,
            elapsed_seconds,
            seconds_per_writer,
            seconds_per_reader,
        })
    }
}

impl fmt::Display for PerfRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} mode: {} voters, {} observers, {:.6} seconds, {:.6} sec/voter, {:.6} sec/observer",
            self.timestamp,
            self.backend,
            self.writers,
            self.readers,
            self.elapsed_seconds,
            self.seconds_per_writer,
            self.seconds_per_reader
        )
    }
}

/// The performance data file.
#[derive(Clone, Debug)]
pub struct PerfStore {
    path: PathBuf,
}

impl PerfStore {
    /// Opens the file, writing the header if it does not exist yet.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self { path: path.into() };
        store.ensure_header()?;
        Ok(store)
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_header(&self) -> io::Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write!(file, "{}", perf_header(&clock_time()))?;
        debug!(path = %self.path.display(), "performance file created");
        Ok(())
    }

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn append(&self, record: &PerfRecord) -> io::Result<()> {
        self.ensure_header()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{record}")
    }

    /// Raw file contents, empty if the file is missing.
    ///
    /// # Errors
    ///
    /// IO failures other than a missing file.
    pub fn contents(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    /// Every parseable record, in file order.
    ///
    /// # Errors
    ///
    /// IO failures other than a missing file.
    pub fn load(&self) -> io::Result<Vec<PerfRecord>> {
        Ok(parse_records(&self.contents()?))
    }
}

fn perf_header(created: &str) -> String {
    format!(
        "{RULE}\nVOTING SYSTEM PERFORMANCE DATA\n{RULE}\nFile created: {created}\n\n\
         Format: [Timestamp] Mode: voters, observers, seconds, sec/voter, sec/observer\n\
         {DASHES}\n\n"
    )
}

fn parse_records(text: &str) -> Vec<PerfRecord> {
    text.lines().filter_map(PerfRecord::parse).collect()
}

/// Aggregate of one backend's records.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendStats {
    /// Number of records.
    pub runs: usize,
    /// Sum of writers.
    pub writers: u64,
    /// Sum of readers.
    pub readers: u64,
    /// Sum of elapsed seconds.
    pub total_seconds: f64,
    /// Writer-weighted mean of seconds per writer.
    pub mean_per_writer: f64,
    /// Reader-weighted mean of seconds per reader.
    pub mean_per_reader: f64,
}

impl BackendStats {
    fn collect<'a>(records: impl Iterator<Item = &'a PerfRecord>) -> Option<Self> {
        let mut runs = 0;
        let (mut writers, mut readers) = (0_u64, 0_u64);
        let (mut total_seconds, mut writer_sum, mut reader_sum) = (0.0, 0.0, 0.0);

        for record in records {
            runs += 1;
            writers += u64::from(record.writers);
            readers += u64::from(record.readers);
            total_seconds += record.elapsed_seconds;
            writer_sum += record.seconds_per_writer * f64::from(record.writers);
            reader_sum += record.seconds_per_reader * f64::from(record.readers);
        }
        if runs == 0 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = |sum: f64, n: u64| if n > 0 { sum / n as f64 } else { 0.0 };
        Some(Self {
            runs,
            writers,
            readers,
            total_seconds,
            mean_per_writer: mean(writer_sum, writers),
            mean_per_reader: mean(reader_sum, readers),
        })
    }
}

/// Which backend won one per-actor metric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Faster {
    /// Threads were faster by `seconds`, `percent` of the process figure.
    Thread {
        /// Absolute difference.
        seconds: f64,
        /// Relative difference.
        percent: f64,
    },
    /// Processes were faster by `seconds`, `percent` of the thread figure.
    Process {
        /// Absolute difference.
        seconds: f64,
        /// Relative difference.
        percent: f64,
    },
    /// Identical means.
    Identical,
}

/// Signed difference in percent: positive when processes are faster.
fn signed_percent(thread: f64, process: f64) -> f64 {
    let diff = thread - process;
    let base = if diff > 0.0 { thread } else { process };
    diff / base * 100.0
}

fn compare(thread: f64, process: f64) -> Faster {
    let percent = signed_percent(thread, process).abs();
    if thread < process {
        Faster::Thread {
            seconds: process - thread,
            percent,
        }
    } else if process < thread {
        Faster::Process {
            seconds: thread - process,
            percent,
        }
    } else {
        Faster::Identical
    }
}

/// Overall verdict across both metrics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Conclusion {
    /// Both metrics favour processes, by the mean percentage.
    ProcessesFaster(f64),
    /// Both metrics favour threads, by the mean percentage.
    ThreadsFaster(f64),
    /// The metrics disagree.
    Mixed,
}

/// Thread versus process comparison. Present only when both backends have
/// non-zero per-writer means.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Comparison {
    /// Per-writer verdict.
    pub per_writer: Faster,
    /// Per-reader verdict, absent when either reader mean is zero.
    pub per_reader: Option<Faster>,
    /// Overall verdict.
    pub conclusion: Conclusion,
}

impl Comparison {
    fn between(thread: &BackendStats, process: &BackendStats) -> Option<Self> {
        if thread.mean_per_writer <= 0.0 || process.mean_per_writer <= 0.0 {
            return None;
        }
        let writer_pct = signed_percent(thread.mean_per_writer, process.mean_per_writer);
        let per_writer = compare(thread.mean_per_writer, process.mean_per_writer);

        let (per_reader, reader_pct) =
            if thread.mean_per_reader > 0.0 && process.mean_per_reader > 0.0 {
                (
                    Some(compare(thread.mean_per_reader, process.mean_per_reader)),
                    signed_percent(thread.mean_per_reader, process.mean_per_reader),
                )
            } else {
                (None, 0.0)
            };

        let overall = (writer_pct.abs() + reader_pct.abs()) / 2.0;
        let conclusion = if writer_pct > 0.0 && reader_pct > 0.0 {
            Conclusion::ProcessesFaster(overall)
        } else if writer_pct < 0.0 && reader_pct < 0.0 {
            Conclusion::ThreadsFaster(overall)
        } else {
            Conclusion::Mixed
        };

        Some(Self {
            per_writer,
            per_reader,
            conclusion,
        })
    }
}

/// Everything the performance report says.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerfSummary {
    /// Thread backend aggregate.
    pub thread: Option<BackendStats>,
    /// Process backend aggregate.
    pub process: Option<BackendStats>,
    /// Present when both backends can be compared.
    pub comparison: Option<Comparison>,
}

impl PerfSummary {
    /// Aggregates `records` per backend.
    #[must_use]
    pub fn from_records(records: &[PerfRecord]) -> Self {
        let of = |backend: Backend| BackendStats::collect(records.iter().filter(|r| r.backend == backend));
        let thread = of(Backend::Thread);
        let process = of(Backend::Process);
        let comparison = match (&thread, &process) {
            (Some(t), Some(p)) => Comparison::between(t, p),
            _ => None,
        };
        Self {
            thread,
            process,
            comparison,
        }
    }

    /// Number of records aggregated.
    #[must_use]
    pub fn measurements(&self) -> usize {
        self.thread.as_ref().map_or(0, |s| s.runs) + self.process.as_ref().map_or(0, |s| s.runs)
    }

    /// True if no line could be parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measurements() == 0
    }

    /// Full report text: the raw data followed by the analysis.
    #[must_use]
    pub fn render_report(&self, data: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{RULE}\nPERFORMANCE ANALYSIS REPORT\n{RULE}");
        let _ = writeln!(out, "Report generated at: {}\n", clock_time());
        let _ = writeln!(out, "System information: Synchronized Voting System");
        let _ = writeln!(out, "{DASHES}\n");
        let _ = writeln!(out, "PERFORMANCE DATA:");
        out.push_str(data);
        if !data.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');

        if self.is_empty() {
            out.push_str("\nNo valid performance data found in the expected format.\n");
            return out;
        }

        let _ = writeln!(out, "{DASHES}\nPERFORMANCE ANALYSIS\n{DASHES}");
        let _ = writeln!(
            out,
            "Total measurements: {} (Thread mode: {}, Process mode: {})\n",
            self.measurements(),
            self.thread.as_ref().map_or(0, |s| s.runs),
            self.process.as_ref().map_or(0, |s| s.runs),
        );
        for (label, stats) in [("Thread", &self.thread), ("Process", &self.process)] {
            if let Some(stats) = stats {
                let _ = writeln!(out, "{label} Mode Analysis:");
                let _ = writeln!(out, "• Total number of voters: {}", stats.writers);
                let _ = writeln!(out, "• Total number of observers: {}", stats.readers);
                let _ = writeln!(out, "• Total execution time: {:.6} seconds", stats.total_seconds);
                let _ = writeln!(out, "• Average time per voter: {:.6} seconds", stats.mean_per_writer);
                let _ = writeln!(
                    out,
                    "• Average time per observer: {:.6} seconds\n",
                    stats.mean_per_reader
                );
            }
        }

        if let Some(cmp) = &self.comparison {
            out.push_str("PERFORMANCE COMPARISON:\n");
            let _ = writeln!(out, "{}", verdict_line("Per Voter", cmp.per_writer));
            if let Some(per_reader) = cmp.per_reader {
                let _ = writeln!(out, "{}", verdict_line("Per Observer", per_reader));
            }
            out.push_str("\nOVERALL CONCLUSION:\n");
            let _ = match cmp.conclusion {
                Conclusion::ProcessesFaster(pct) => {
                    writeln!(out, "Processes were faster than threads by {pct:.2}%.")
                }
                Conclusion::ThreadsFaster(pct) => {
                    writeln!(out, "Threads were faster than processes by {pct:.2}%.")
                }
                Conclusion::Mixed => writeln!(
                    out,
                    "Mixed results: one mode was faster for voters, the other for observers."
                ),
            };
        }

        let _ = writeln!(out, "\n{RULE}\nEND OF PERFORMANCE ANALYSIS\n{RULE}");
        out
    }

    /// Writes `performance_report_[<stamp>].txt` into `dir`.
    ///
    /// # Errors
    ///
    /// IO failures.
    pub fn write_report(&self, dir: &Path, data: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("performance_report_[{}].txt", file_stamp()));
        fs::write(&path, self.render_report(data))?;
        info!(
            path = %path.display(),
            measurements = self.measurements(),
            "performance report written"
        );
        Ok(path)
    }
}

fn verdict_line(metric: &str, verdict: Faster) -> String {
    match verdict {
        Faster::Thread { seconds, percent } => {
            format!("• {metric}: Thread mode is faster by {seconds:.6} seconds ({percent:.2}%)")
        }
        Faster::Process { seconds, percent } => {
            format!("• {metric}: Process mode is faster by {seconds:.6} seconds ({percent:.2}%)")
        }
        Faster::Identical => format!("• {metric}: Both modes have identical performance"),
    }
}

/// Condensed console view.
impl fmt::Display for PerfSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Performance Comparison ===")?;
        if self.is_empty() {
            return writeln!(f, "No valid performance data found.");
        }
        for (label, stats) in [("Thread", &self.thread), ("Process", &self.process)] {
            if let Some(stats) = stats {
                writeln!(f, "{label} Mode:")?;
                writeln!(
                    f,
                    "• Total voters: {}, Total observers: {}",
                    stats.writers, stats.readers
                )?;
                writeln!(f, "• Avg time per voter: {:.6} seconds", stats.mean_per_writer)?;
                writeln!(f, "• Avg time per observer: {:.6} seconds", stats.mean_per_reader)?;
            }
        }
        if let Some(cmp) = &self.comparison {
            writeln!(f, "{}", verdict_line("Per Voter", cmp.per_writer))?;
            if let Some(per_reader) = cmp.per_reader {
                writeln!(f, "{}", verdict_line("Per Observer", per_reader))?;
            }
        }
        write!(f, "===========================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = "\
=================================================
VOTING SYSTEM PERFORMANCE DATA
=================================================
File created: Sun Oct 18 10:00:00 2026

Format: [Timestamp] Mode: voters, observers, seconds, sec/voter, sec/observer
-------------------------------------------------

[18-10-2026_10-00-00] Thread mode: 10 voters, 2 observers, 4.000000 seconds, 0.400000 sec/voter, 2.000000 sec/observer
[18-10-2026_10-01-00] Thread mode: 30 voters, 2 observers, 6.000000 seconds
garbage line
[18-10-2026_10-02-00] Process mode: 10 voters, 5 observers, 2.000000 seconds, 0.200000 sec/voter, 0.400000 sec/observer
[18-10-2026_10-03-00] Process mode: ten voters, 1 observers, 2.0 seconds
";

    #[test]
    fn test_parse_both_layouts_and_skip_garbage() {
        let records = parse_records(DATA);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].backend, Backend::Thread);
        assert_eq!((records[0].writers, records[0].readers), (10, 2));
        assert!((records[0].seconds_per_reader - 2.0).abs() < 1e-9);

        // Legacy layout derives the per-actor figures.
        assert!((records[1].seconds_per_writer - 0.2).abs() < 1e-9);
        assert!((records[1].seconds_per_reader - 3.0).abs() < 1e-9);
        assert_eq!(records[1].timestamp, "[18-10-2026_10-01-00]");

        assert_eq!(records[2].backend, Backend::Process);
    }

    #[test]
    fn test_record_line_parses_back() {
        let record = PerfRecord::new(Backend::Process, 8, 4, Duration::from_millis(2000));
        let line = record.to_string();
        assert!(line.contains("Process mode: 8 voters, 4 observers, 2.000000 seconds, 0.250000 sec/voter, 0.500000 sec/observer"));
        assert_eq!(PerfRecord::parse(&line), Some(record));
    }

    #[test]
    fn test_weighted_means() {
        let summary = PerfSummary::from_records(&parse_records(DATA));
        let thread = summary.thread.as_ref().unwrap();
        assert_eq!(thread.runs, 2);
        assert_eq!((thread.writers, thread.readers), (40, 4));
        assert!((thread.total_seconds - 10.0).abs() < 1e-9);
        // (0.4 * 10 + 0.2 * 30) / 40
        assert!((thread.mean_per_writer - 0.25).abs() < 1e-9);
        // (2.0 * 2 + 3.0 * 2) / 4
        assert!((thread.mean_per_reader - 2.5).abs() < 1e-9);
        assert_eq!(summary.measurements(), 3);
    }

    #[test]
    fn test_comparison_and_conclusion() {
        let summary = PerfSummary::from_records(&parse_records(DATA));
        let cmp = summary.comparison.unwrap();

        // thread 0.25 vs process 0.2: processes faster by 20% of the thread figure
        match cmp.per_writer {
            Faster::Process { seconds, percent } => {
                assert!((seconds - 0.05).abs() < 1e-9);
                assert!((percent - 20.0).abs() < 1e-9);
            }
            other => panic!("unexpected verdict {other:?}"),
        }
        // thread 2.5 vs process 0.4: 84%
        assert!(matches!(cmp.per_reader, Some(Faster::Process { .. })));
        match cmp.conclusion {
            Conclusion::ProcessesFaster(pct) => assert!((pct - 52.0).abs() < 1e-9),
            other => panic!("unexpected conclusion {other:?}"),
        }
    }

    #[test]
    fn test_mixed_and_identical() {
        let thread = BackendStats {
            runs: 1,
            writers: 1,
            readers: 1,
            total_seconds: 1.0,
            mean_per_writer: 1.0,
            mean_per_reader: 1.0,
        };
        let process = BackendStats {
            mean_per_writer: 2.0,
            mean_per_reader: 0.5,
            ..thread.clone()
        };
        let cmp = Comparison::between(&thread, &process).unwrap();
        assert!(matches!(cmp.per_writer, Faster::Thread { .. }));
        assert_eq!(cmp.conclusion, Conclusion::Mixed);

        let same = Comparison::between(&thread, &thread).unwrap();
        assert_eq!(same.per_writer, Faster::Identical);
        assert_eq!(same.conclusion, Conclusion::Mixed);
    }

    #[test]
    fn test_store_header_append_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = PerfStore::open(dir.path().join("performance_data.txt")).unwrap();
        assert!(store.load().unwrap().is_empty());

        store
            .append(&PerfRecord::new(Backend::Thread, 10, 3, Duration::from_secs(3)))
            .unwrap();
        store
            .append(&PerfRecord::new(Backend::Process, 10, 3, Duration::from_secs(6)))
            .unwrap();

        let data = store.contents().unwrap();
        assert!(data.starts_with(&format!("{RULE}\nVOTING SYSTEM PERFORMANCE DATA\n{RULE}\n")));
        let records = store.load().unwrap();
        assert_eq!(records.len(), 2);

        let summary = PerfSummary::from_records(&records);
        let path = summary.write_report(dir.path(), &data).unwrap();
        let report = fs::read_to_string(path).unwrap();
        assert!(report.contains("Total measurements: 2 (Thread mode: 1, Process mode: 1)"));
        assert!(report.contains("• Per Voter: Thread mode is faster by 0.300000 seconds (50.00%)"));
        assert!(report.contains("Threads were faster than processes by 50.00%."));
        assert!(report.contains("END OF PERFORMANCE ANALYSIS"));
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(
            perf_header("Sun Oct 18 10:00:00 2026"),
            DATA.split("[18-10").next().unwrap()
        );
    }

    #[test]
    fn test_empty_report() {
        let summary = PerfSummary::from_records(&[]);
        let report = summary.render_report("VOTING SYSTEM PERFORMANCE DATA\n");
        assert!(report.contains("No valid performance data found in the expected format."));
        assert!(summary.to_string().contains("No valid performance data found."));
    }
}

//! End-to-end runs of the thread backend through the coordinator.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use ballot::{Backend, BallotConfig, Coordinator, PerfStore, RunConfig, RunRequest, ThinkRange};
use ballot_core::VoterId;

fn config(dir: &Path) -> BallotConfig {
    BallotConfig {
        data_dir: dir.to_path_buf(),
        writer_think_ms: ThinkRange::new(0, 5),
        reader_think_ms: ThinkRange::new(0, 5),
        observation_cycles: 3,
        ..BallotConfig::default()
    }
}

fn votes(candidates: &[&str], votes: Vec<(VoterId, usize)>) -> RunConfig {
    let mut request = RunRequest::new(Backend::Thread);
    request.candidates = candidates.iter().map(ToString::to_string).collect();
    request.readers = 2;
    request.seed = Some(11);
    request.votes = Some(votes);
    request.sanitize()
}

#[test]
fn test_five_voters_same_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();

    let run = votes(&["A", "B", "C"], (1..=5).map(|v| (v, 0)).collect());
    let report = coordinator.run(run).unwrap();

    assert_eq!(report.tally.votes(), vec![5, 0, 0]);
    assert_eq!(report.recorded(), 5);
    assert_eq!(report.tally.registered, 5);
    assert_eq!(report.failed_actors, 0);
    assert_eq!(report.observations, 6);
    assert_eq!(report.violations, 0);
    assert!(report.violation.is_none());
}

#[test]
fn test_same_voter_twice() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();

    let report = coordinator
        .run(votes(&["A", "B", "C"], vec![(42, 0), (42, 1)]))
        .unwrap();

    assert_eq!(report.recorded(), 1);
    assert_eq!(report.tally.duplicate_rejections, 1);
    assert_eq!(report.tally.votes().iter().sum::<u32>(), 1);
}

#[test]
fn test_out_of_range_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();

    let report = coordinator.run(votes(&["A", "B", "C"], vec![(1, 3)])).unwrap();

    assert_eq!(report.recorded(), 0);
    assert_eq!(report.tally.invalid_rejections, 1);
    assert_eq!(report.tally.registered, 0);
}

#[test]
fn test_transaction_log_lists_every_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();

    let report = coordinator
        .run(votes(&["Ada", "Grace"], vec![(1, 0), (2, 1), (1, 1), (3, 9)]))
        .unwrap();
    let text = fs::read_to_string(report.log_path.unwrap()).unwrap();

    let lines: Vec<_> = text.lines().filter(|l| l.starts_with('[')).collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines.iter().filter(|l| l.contains("SUCCESS")).count(), 2);
    assert_eq!(lines.iter().filter(|l| l.contains("FAILED VOTE")).count(), 1);
    assert_eq!(lines.iter().filter(|l| l.contains("INVALID VOTE")).count(), 1);
    assert!(text.contains("CONFIGURATION: 4 voters, 2 observers"));
    assert!(text.contains("Total votes cast: 2"));

    let ring = String::from_utf8(coordinator.ring_log().contents()).unwrap();
    assert_eq!(ring.lines().count(), 4);
}

#[test]
fn test_many_writers_keep_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();

    let mut request = RunRequest::new(Backend::Thread);
    request.writers = 200;
    request.readers = 8;
    request.seed = Some(5);
    let report = coordinator.run(request.sanitize()).unwrap();

    assert_eq!(report.recorded(), 200);
    assert_eq!(report.tally.registered, 200);
    assert_eq!(report.violations, 0);
    assert!(report.elapsed <= report.total_elapsed);

    let records = PerfStore::open(coordinator.config().perf_path())
        .unwrap()
        .load()
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].backend, Backend::Thread);
}

#[test]
fn test_shutdown_interrupts_sleeping_actors() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(BallotConfig {
        writer_think_ms: ThinkRange::fixed(30_000),
        reader_think_ms: ThinkRange::fixed(30_000),
        ..config(dir.path())
    })
    .unwrap();

    let start = Instant::now();
    let report = thread::scope(|scope| {
        let run = scope.spawn(|| coordinator.run(RunRequest::new(Backend::Thread).sanitize()));
        thread::sleep(Duration::from_millis(200));
        coordinator.shutdown().unwrap();
        run.join().unwrap()
    })
    .unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(report.cancelled);
    assert_eq!(report.recorded(), 0);
    assert!(PerfStore::open(coordinator.config().perf_path())
        .unwrap()
        .load()
        .unwrap()
        .is_empty());
}

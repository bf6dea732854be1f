//! Fork-based runs. Serialized: forking while other tests spawn threads is
//! best kept to one test at a time.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use ballot::{Backend, BallotConfig, Coordinator, RunConfig, RunRequest, ThinkRange};
use ballot_core::VoterId;
use serial_test::serial;

fn config(dir: &Path) -> BallotConfig {
    BallotConfig {
        data_dir: dir.to_path_buf(),
        writer_think_ms: ThinkRange::new(0, 20),
        reader_think_ms: ThinkRange::new(0, 20),
        observation_cycles: 2,
        ..BallotConfig::default()
    }
}

fn request(backend: Backend, votes: Vec<(VoterId, usize)>, readers: i64) -> RunConfig {
    let mut request = RunRequest::new(backend);
    request.candidates = vec!["A".into(), "B".into(), "C".into()];
    request.readers = readers;
    request.seed = Some(99);
    request.votes = Some(votes);
    request.sanitize()
}

#[test]
#[serial]
fn test_process_run_matches_thread_run() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();
    let plan = vec![(1, 0), (2, 2)];

    let start = Instant::now();
    let process = coordinator
        .run(request(Backend::Process, plan.clone(), 3))
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(30));

    let thread = coordinator.run(request(Backend::Thread, plan, 3)).unwrap();

    assert_eq!(process.failed_actors, 0);
    assert_eq!((process.writers, process.readers), (2, 3));
    assert_eq!(process.tally.votes(), vec![1, 0, 1]);
    assert_eq!(process.tally, thread.tally);
    assert_eq!(process.observations, 6);
    assert_eq!(process.violations, 0);
    assert!(process.violation.is_none());
    assert_eq!(process.seed, thread.seed);
}

#[test]
#[serial]
fn test_duplicate_voter_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();

    let report = coordinator
        .run(request(Backend::Process, vec![(42, 0), (42, 1), (42, 2)], 1))
        .unwrap();

    assert_eq!(report.failed_actors, 0);
    assert_eq!(report.recorded(), 1);
    assert_eq!(report.tally.duplicate_rejections, 2);
}

#[test]
#[serial]
fn test_children_append_to_transaction_log() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();

    let votes: Vec<_> = (1..=6).map(|v| (v, (v as usize) % 3)).collect();
    let report = coordinator
        .run(request(Backend::Process, votes, 2))
        .unwrap();
    let text = fs::read_to_string(report.log_path.as_ref().unwrap()).unwrap();

    let records: Vec<_> = text.lines().filter(|l| l.starts_with('[')).collect();
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|l| l.contains("SUCCESS: VoterID ")));
    assert!(text.contains("SYNCHRONIZATION: Shared memory and POSIX semaphores"));
    assert!(text.contains("Total votes cast: 6"));
}

#[test]
#[serial]
fn test_shutdown_unlinks_region() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(config(dir.path())).unwrap();
    let names = coordinator.ipc_session().names().clone();

    coordinator.shutdown().unwrap();
    coordinator.shutdown().unwrap();

    assert!(ballot_ipc::IpcSession::open(names).is_err());
}

#[test]
#[serial]
fn test_concurrent_shutdown_waits_for_teardown() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(BallotConfig {
        writer_think_ms: ThinkRange::fixed(300),
        reader_think_ms: ThinkRange::fixed(300),
        ..config(dir.path())
    })
    .unwrap();
    let names = coordinator.ipc_session().names().clone();
    let mut run = RunRequest::new(Backend::Process);
    run.writers = 6;
    run.readers = 2;
    let run = run.sanitize();

    std::thread::scope(|s| {
        let batch = s.spawn(|| coordinator.run(run));
        std::thread::sleep(Duration::from_millis(100));

        let first = s.spawn(|| coordinator.shutdown());
        std::thread::sleep(Duration::from_micros(200));
        coordinator.shutdown().unwrap();

        // Whichever call returns, the objects must already be gone.
        assert!(ballot_ipc::SharedRegion::open(&names.region).is_err());
        assert!(ballot_ipc::NamedSemaphore::open(&names.write_lock, "write_lock").is_err());
        assert!(ballot_ipc::NamedSemaphore::open(&names.count_mutex, "count_mutex").is_err());

        first.join().unwrap().unwrap();
        let _ = batch.join().unwrap();
    });
}

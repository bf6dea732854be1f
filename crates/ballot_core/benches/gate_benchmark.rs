//! # Gate Throughput Benchmark
//!
//! Cost of one transaction through the in-process gate:
//! 1. Uncontended read / write / vote
//! 2. Observation (snapshot + invariant check) on a full registry
//! 3. Mixed contention: reader threads hammering while a writer votes

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ballot_core::{Ballot, ByteLog, NullSink, RingLog, MAX_VOTERS};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const NAMES: [&str; 3] = ["A", "B", "C"];

// =============================================================================
// UNCONTENDED
// =============================================================================

fn bench_uncontended(c: &mut Criterion) {
    let ballot = Ballot::local();
    ballot.configure(&NAMES).unwrap();

    c.bench_function("gate_read_uncontended", |b| {
        b.iter(|| black_box(ballot.read(|s| s.total_votes()).unwrap()));
    });

    c.bench_function("gate_write_uncontended", |b| {
        b.iter(|| black_box(ballot.write(|s| s.candidate_count()).unwrap()));
    });

    // Duplicate path: registry scan + rejection counter, no growth.
    ballot.cast_vote(1, 0, &NullSink).unwrap();
    c.bench_function("cast_vote_duplicate", |b| {
        b.iter(|| black_box(ballot.cast_vote(1, 0, &NullSink).unwrap()));
    });
}

fn bench_observe_full_registry(c: &mut Criterion) {
    let ballot = Ballot::local();
    ballot.configure(&NAMES).unwrap();
    for voter in 0..MAX_VOTERS as u32 {
        ballot.cast_vote(voter, voter as usize % 3, &NullSink).unwrap();
    }

    c.bench_function("observe_full_registry", |b| {
        b.iter(|| black_box(ballot.observe().unwrap()));
    });
}

// =============================================================================
// CONTENDED
// =============================================================================

fn bench_write_under_readers(c: &mut Criterion) {
    let ballot = Arc::new(Ballot::local());
    ballot.configure(&NAMES).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let ballot = Arc::clone(&ballot);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    black_box(ballot.read(|s| s.total_votes()).unwrap());
                    // Leave gaps so the reader count drops to zero; the gate
                    // itself never lets a waiting writer cut in.
                    thread::sleep(Duration::from_micros(50));
                }
            })
        })
        .collect();

    c.bench_function("gate_write_with_3_readers", |b| {
        b.iter(|| black_box(ballot.write(|s| s.candidate_count()).unwrap()));
    });

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
}

fn bench_ring_log(c: &mut Criterion) {
    let log = RingLog::with_capacity(64 * 1024);
    let line = b"[18-10-2026 12:00:00] SUCCESS: VoterID 3 voted for Candidate 'A' (ID: 0)\n";

    c.bench_function("ring_log_write_line", |b| {
        b.iter(|| black_box(log.write(line)));
    });
}

criterion_group!(
    benches,
    bench_uncontended,
    bench_observe_full_registry,
    bench_write_under_readers,
    bench_ring_log
);
criterion_main!(benches);

//! Criterion benchmarks for reserved-chain following at various lengths.
//!
//! The follower is O(chain length) by design; this tracks the per-step cost
//! on straight chains of 8, 64 and 200 segments.
//!
//! Run with: cargo bench -p signalling --features bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use signalling::follow::follow_reservation;
use signalling::map::{RailPos, RailType, TileId};
use signalling::test_harness::RailNet;
use signalling::track::Trackdir;

/// A straight reserved run of `len` segments with one unreserved tile after.
fn build_chain(len: usize) -> RailNet {
    let mut net = RailNet::new();
    net.x_line(4, 1..=(len + 1));
    net.reserve_x_run(4, 1..=len);
    net
}

fn bench_follow(c: &mut Criterion) {
    let mut group = c.benchmark_group("follow_reservation");
    for len in [8usize, 64, 200] {
        let net = build_chain(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                follow_reservation(
                    &net.map,
                    RailNet::OWNER,
                    RailType::Rail.compatible(),
                    black_box(RailPos::tile(TileId(1, 4), Trackdir::XSw)),
                    false,
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_follow);
criterion_main!(benches);

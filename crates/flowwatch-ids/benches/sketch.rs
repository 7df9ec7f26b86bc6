//! Sketch update and window-close throughput.
//!
//! Run with: cargo bench -p flowwatch-ids

use std::hint::black_box;

use chrono::DateTime;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use flowwatch_ids::sketch::SketchInput;
use flowwatch_ids::{Detector, FlowRecord, Protocol, SketchConfig, SketchDivergence, Window};

fn records(hosts: u32, n: usize) -> Vec<FlowRecord> {
    let ts = DateTime::from_timestamp(0, 0).unwrap();
    (0..n)
        .map(|i| {
            let host = 0x0a00_0000 + (i as u32).wrapping_mul(2_654_435_761) % hosts;
            FlowRecord::new(
                ts,
                [10, 9, 9, 9].into(),
                std::net::Ipv4Addr::from(host).into(),
                Protocol::Tcp,
                60,
            )
        })
        .collect()
}

fn sketch(ncols: usize) -> SketchDivergence {
    SketchDivergence::new(SketchConfig {
        ncols,
        seed: Some(1),
        input: SketchInput::Packets,
        ..SketchConfig::default()
    })
    .unwrap()
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("sketch/update");
    let batch = records(10_000, 10_000);
    for ncols in [64, 1024] {
        let mut d = sketch(ncols);
        group.bench_with_input(BenchmarkId::from_parameter(ncols), &batch, |b, batch| {
            b.iter(|| {
                for r in batch {
                    d.update(black_box(r));
                }
            })
        });
    }
    group.finish();
}

fn bench_window_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("sketch/window_close");
    let batch = records(1_000, 2_000);
    for ncols in [64, 1024] {
        let mut d = sketch(ncols);
        let mut w = Window::first(DateTime::from_timestamp(0, 0).unwrap(), d.period()).unwrap();
        group.bench_function(BenchmarkId::from_parameter(ncols), |b| {
            b.iter(|| {
                for r in &batch {
                    d.update(r);
                }
                black_box(d.evaluate(&w));
                d.roll_baseline(&w);
                w = w.next().unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_update, bench_window_close);
criterion_main!(benches);

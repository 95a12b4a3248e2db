use criterion::{black_box, BenchmarkId, Criterion};

use mzwavelet::local_maxima::{local_maximum, LocalMaximumStrategy};

fn signal(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            (x * 0.013).sin() * 50.0
                + (x * 0.21).cos() * 5.0
                + ((x * 12.9898 + 78.233).sin() * 43758.5453).fract()
        })
        .collect()
}

fn strategies(c: &mut Criterion) {
    let x = signal(100_000);
    let mut group = c.benchmark_group("local_maximum");
    for win_size in [5, 21, 129] {
        for strategy in [
            LocalMaximumStrategy::Classic,
            LocalMaximumStrategy::Faster,
            LocalMaximumStrategy::New,
        ] {
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), win_size),
                &win_size,
                |b, win_size| b.iter(|| black_box(local_maximum(&x, *win_size, strategy).unwrap())),
            );
        }
    }
    group.finish();
}

criterion::criterion_group!(benches, strategies);
criterion::criterion_main!(benches);

use criterion::{black_box, Criterion};

use mzwavelet::cwt::{ConvolutionMethod, CwtEngine};
use mzwavelet::wavelet::{MotherKernel, PreparedKernels, ScaleSet};

fn signal(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            100.0 * (-(x - 5000.0).powi(2) / 200.0).exp()
                + 40.0 * (-(x - 12000.0).powi(2) / 50.0).exp()
                + ((x * 12.9898 + 78.233).sin() * 43758.5453).fract()
        })
        .collect()
}

fn transform(c: &mut Criterion) {
    let x = signal(20_000);
    let scales = ScaleSet::default();

    for (name, method) in [
        ("cwt_direct", ConvolutionMethod::Direct),
        ("cwt_fft", ConvolutionMethod::Fft),
        ("cwt_auto", ConvolutionMethod::Auto),
    ] {
        let engine = CwtEngine::new(MotherKernel::default(), method);
        c.bench_function(name, |b| {
            b.iter(|| black_box(engine.transform(&x, &scales).unwrap()))
        });
    }

    let prepared = PreparedKernels::mexican_hat(&scales, x.len()).unwrap();
    let engine = CwtEngine::default();
    c.bench_function("cwt_prepared", |b| {
        b.iter(|| black_box(engine.transform_prepared(&x, &prepared).unwrap()))
    });
}

criterion::criterion_group!(benches, transform);
criterion::criterion_main!(benches);

//! Conditioning cost per analysis window
//!
//! One window is processed per hop, so at 1 kHz with the default 200-sample
//! window and 50% overlap the whole chain has 100 ms per call. These benches
//! report how far below that each noise reduction level stays.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use grip_core::{GripConfig, ManualClock};
use grip_processing::{EmgGestureDetector, FeatureExtractor, SignalConditioner};
use std::f64::consts::PI;
use std::hint::black_box;
use std::sync::Arc;

fn emg_like(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 / 1000.0;
            40.0 * (2.0 * PI * 90.0 * t).sin()
                + 25.0 * (2.0 * PI * 150.0 * t + 0.7).sin()
                + 10.0 * (2.0 * PI * 50.0 * t).sin()
        })
        .collect()
}

/// Benchmark the conditioning chain at each level
fn bench_condition_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition_window");
    let conditioner = SignalConditioner::new(1000.0);

    for &window_size in &[200usize, 500] {
        let window = emg_like(window_size);
        for level in 1..=5u8 {
            group.bench_with_input(
                BenchmarkId::new(format!("level_{}", level), window_size),
                &window,
                |b, window| b.iter(|| conditioner.condition(black_box(window), level)),
            );
        }
    }
    group.finish();
}

/// Benchmark feature extraction on a conditioned window
fn bench_features(c: &mut Criterion) {
    let window = emg_like(200);
    c.bench_function("extract_features_200", |b| {
        b.iter(|| FeatureExtractor::extract(black_box(&window)))
    });
}

/// Benchmark sample intake including the windows it triggers
fn bench_sample_intake(c: &mut Criterion) {
    let samples = emg_like(1000);
    let mut group = c.benchmark_group("detector_one_second");
    for overlap in [0.5, 0.9] {
        let config = GripConfig {
            window_overlap: overlap,
            noise_reduction_level: 5,
            ..GripConfig::standard()
        };
        group.bench_with_input(BenchmarkId::new("overlap", overlap), &config, |b, config| {
            b.iter(|| {
                let clock = Arc::new(ManualClock::new());
                let mut detector = EmgGestureDetector::new(config, clock).unwrap();
                for &s in &samples {
                    black_box(detector.add_sample(s));
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_condition_levels, bench_features, bench_sample_intake);
criterion_main!(benches);

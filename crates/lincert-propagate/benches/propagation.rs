//! Criterion benchmarks for linear-inclusion propagation
//!
//! Run with: cargo bench -p lincert-propagate
//! HTML reports: target/criterion/report/index.html

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lincert_propagate::{
    affine_interval_extension, construct_out_features_counts, generate_weights_and_biases,
    ActivationFunc, Interval, LinearInclusion, LinearizationPoint, PropagationConfig,
    UncertainInput,
};
use ndarray::Array1;

fn make_input(n: usize, radius: f64) -> UncertainInput {
    let values = Array1::from_shape_fn(n, |j| (j as f64 * 0.37).sin());
    UncertainInput::with_uniform_uncertainty(values, radius).expect("valid benchmark input")
}

// ============================================================================
// Single-layer affine extension
// ============================================================================

fn bench_affine_extension(c: &mut Criterion) {
    let mut group = c.benchmark_group("Affine");

    for (in_dim, out_dim) in [(11, 10), (110, 100), (1100, 100)] {
        let params = generate_weights_and_biases(in_dim, &[out_dim], Some(0)).expect("params");
        let layer = params.layers()[0].clone();
        let theta: Vec<Interval> = (0..in_dim).map(|_| Interval::new(-0.1, 0.1)).collect();

        group.throughput(Throughput::Elements((in_dim * out_dim) as u64));
        group.bench_with_input(
            BenchmarkId::new("extension", format!("{in_dim}x{out_dim}")),
            &(&layer, &theta),
            |b, (layer, theta)| b.iter(|| affine_interval_extension(layer, black_box(theta))),
        );
    }
    group.finish();
}

// ============================================================================
// Whole-network inclusion
// ============================================================================

fn bench_linear_inclusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("LinearInclusion");

    for (size_scaler, depth) in [(1, 1), (1, 3), (10, 3), (100, 5)] {
        let n = size_scaler * 11;
        let out = construct_out_features_counts(n, (n - depth).min(10), depth).expect("widths");
        let params = generate_weights_and_biases(n, &out, Some(42)).expect("params");
        let input = make_input(n, 0.05);

        for linearization in [
            LinearizationPoint::PostActivationMidpoint,
            LinearizationPoint::PreActivationMidpoint,
        ] {
            let config = PropagationConfig { linearization };
            group.bench_with_input(
                BenchmarkId::new(format!("sigmoid/{linearization:?}"), format!("{n}in_{depth}layers")),
                &(&input, &params),
                |b, (input, params)| {
                    b.iter(|| {
                        LinearInclusion::with_config(
                            (*input).clone(),
                            ActivationFunc::Sigmoid,
                            (*params).clone(),
                            config,
                        )
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_affine_extension, bench_linear_inclusion);
criterion_main!(benches);

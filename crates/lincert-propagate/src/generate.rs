//! Random network parameters for benchmarking and instance sweeps.
//!
//! Weights follow the Kaiming-uniform scheme and biases the usual
//! fan-in-scaled uniform scheme: both are drawn from
//! `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`. Every generator takes an explicit
//! seed so a `(shape, seed)` pair always yields the same network.

use crate::params::{DenseLayer, NNParams};
use lincert_core::{LincertError, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::debug;

/// Layer widths for a network of `depth` layers shrinking from
/// `in_features` inputs to `out_features` outputs.
///
/// Returns `depth` strictly decreasing widths whose last entry is
/// `out_features`.
pub fn construct_out_features_counts(
    in_features: usize,
    out_features: usize,
    depth: usize,
) -> Result<Vec<usize>> {
    if depth == 0 || out_features == 0 {
        return Err(LincertError::InvalidParams(format!(
            "depth and out_features must be positive (got depth={depth}, out_features={out_features})"
        )));
    }
    if depth == 1 {
        return Ok(vec![out_features]);
    }
    if in_features <= out_features {
        return Err(LincertError::InvalidParams(format!(
            "in_features ({in_features}) must exceed out_features ({out_features}) for depth {depth}"
        )));
    }
    let span = (in_features - out_features) as f64;
    if span / (depth as f64) < 1.0 {
        return Err(LincertError::InvalidParams(format!(
            "cannot fit {depth} distinct layer widths between {in_features} and {out_features}"
        )));
    }

    let mut partition = BTreeSet::from([out_features]);
    let mut current = in_features;
    while partition.len() < depth {
        let step = (current - out_features) as f64 / (depth - partition.len() + 1) as f64;
        let next = (current as f64 - step).ceil() as usize;
        if next >= current {
            return Err(LincertError::InvalidParams(format!(
                "layer widths stopped shrinking at {current}"
            )));
        }
        current = next;
        partition.insert(current);
    }

    Ok(partition.into_iter().rev().collect())
}

/// Output width used by the sweep drivers for a given input width and depth.
pub fn suggested_out_features(in_features: usize, depth: usize) -> usize {
    let room = in_features.saturating_sub(depth);
    if room >= 100 {
        100
    } else if room < 10 {
        room.max(1)
    } else {
        10
    }
}

pub fn generate_weight_matrix<R: Rng>(
    in_features: usize,
    out_features: usize,
    rng: &mut R,
) -> Array2<f64> {
    let bound = 1.0 / (in_features as f64).sqrt();
    Array2::from_shape_simple_fn((out_features, in_features), || {
        rng.random_range(-bound..=bound)
    })
}

pub fn generate_bias_vector<R: Rng>(
    in_features: usize,
    out_features: usize,
    rng: &mut R,
) -> Array1<f64> {
    let bound = 1.0 / (in_features as f64).sqrt();
    Array1::from_shape_simple_fn(out_features, || rng.random_range(-bound..=bound))
}

/// Generate a full network with widths `in_features -> out_features[0] -> ...`.
///
/// `seed = None` draws a fresh seed from the operating system.
pub fn generate_weights_and_biases(
    in_features: usize,
    out_features: &[usize],
    seed: Option<u64>,
) -> Result<NNParams> {
    if in_features == 0 || out_features.is_empty() || out_features.contains(&0) {
        return Err(LincertError::InvalidParams(format!(
            "cannot generate a network {in_features} -> {out_features:?}"
        )));
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut layers = Vec::with_capacity(out_features.len());
    let mut fan_in = in_features;
    for &fan_out in out_features {
        let weight = generate_weight_matrix(fan_in, fan_out, &mut rng);
        let bias = generate_bias_vector(fan_in, fan_out, &mut rng);
        layers.push(DenseLayer::new(weight, bias)?);
        fan_in = fan_out;
    }
    debug!(
        in_features,
        widths = ?out_features,
        ?seed,
        "Generated network parameters"
    );

    NNParams::from_layers(layers)
}

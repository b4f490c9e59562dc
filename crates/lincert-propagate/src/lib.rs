//! Bound propagation and linearization for dense feed-forward networks.
//!
//! Given an uncertain input box, a monotone activation and the network
//! parameters, [`LinearInclusion`] propagates interval bounds layer by layer
//! and linearizes every neuron around a chosen point, recording the Taylor
//! residual that keeps the linear relaxation sound.
//!
//! The plain forward pass in [`forward`] supplies the ground-truth label the
//! robustness certificate is built for, and [`generate`] produces seeded
//! random networks for sweeps and benchmarks.

pub mod activation;
pub mod forward;
pub mod generate;
pub mod inclusion;
pub mod params;
pub mod types;
pub mod uncertain;

pub use activation::{ActivationFunc, CustomActivation, QUADLU_DEFAULT_ALPHA};
pub use forward::{argmax, compute_label, forward_pass};
pub use generate::{
    construct_out_features_counts, generate_bias_vector, generate_weight_matrix,
    generate_weights_and_biases, suggested_out_features,
};
pub use inclusion::{affine_interval_extension, propagate_layer, taylor_residual, LinearInclusion};
pub use params::{DenseLayer, NNParams};
pub use types::{LayerInclusion, LinearizationPoint, PropagationConfig};
pub use uncertain::UncertainInput;

// Re-export core types for downstream crates and tests
pub use lincert_core::{Interval, LincertError, Result};

#[cfg(test)]
mod tests;

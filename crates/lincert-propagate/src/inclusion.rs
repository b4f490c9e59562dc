//! Linear inclusion: layer-by-layer interval propagation with a first-order
//! Taylor linearization of every neuron.
//!
//! For layer `i` the engine consumes the post-activation box `theta[i-1]` and
//! produces, per neuron `k`:
//!
//! - `z[i][k]`, the interval extension of the affine map,
//! - `theta[i][k] = [f(z.lo), f(z.hi)]`, exact for monotone activations,
//! - `xi[i][k]`, the linearization point (see [`LinearizationPoint`]),
//! - `r[i][k] = theta - f(xi) - f'(xi) (z - xi)`, the residual interval that
//!   bounds the linearization error over the whole of `z[i][k]`.
//!
//! The resulting record is immutable. Changing any input means building a
//! new one.

use crate::activation::ActivationFunc;
use crate::forward::compute_label;
use crate::params::{DenseLayer, NNParams};
use crate::types::{LayerInclusion, LinearizationPoint, PropagationConfig};
use crate::uncertain::UncertainInput;
use lincert_core::{Interval, LincertError, Result};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Natural interval extension of `z = W x + b` over the box `theta_prev`.
pub fn affine_interval_extension(layer: &DenseLayer, theta_prev: &[Interval]) -> Result<Vec<Interval>> {
    if theta_prev.len() != layer.in_features() {
        return Err(LincertError::shape_mismatch(
            vec![layer.in_features()],
            vec![theta_prev.len()],
        ));
    }
    let z = layer
        .weight()
        .outer_iter()
        .zip(layer.bias().iter())
        .map(|(row, &b)| {
            row.iter()
                .zip(theta_prev)
                .fold(Interval::point(b), |acc, (&w, theta)| acc + theta.scale(w))
        })
        .collect();
    Ok(z)
}

/// Residual of the first-order Taylor expansion of `activation` at `xi`,
/// evaluated with interval arithmetic over `z` and its image `theta`.
pub fn taylor_residual(activation: &ActivationFunc, xi: f64, z: &Interval, theta: &Interval) -> Interval {
    let slope = activation.deriv(xi);
    theta
        .shift(-activation.eval(xi))
        .sub(&z.shift(-xi).scale(slope))
}

/// Propagate one layer: affine extension, activation image, linearization
/// and residual.
pub fn propagate_layer(
    layer: &DenseLayer,
    theta_prev: &[Interval],
    activation: &ActivationFunc,
    linearization: LinearizationPoint,
) -> Result<LayerInclusion> {
    let z = affine_interval_extension(layer, theta_prev)?;
    let theta: Vec<Interval> = z.iter().map(|zk| activation.interval_image(zk)).collect();
    let xi: Vec<f64> = z
        .iter()
        .zip(&theta)
        .map(|(zk, tk)| linearization.select(zk, tk))
        .collect();
    let r = z
        .iter()
        .zip(&theta)
        .zip(&xi)
        .map(|((zk, tk), &x)| taylor_residual(activation, x, zk, tk))
        .collect();
    Ok(LayerInclusion { z, theta, xi, r })
}

/// Per-query linear inclusion of a dense network.
#[derive(Debug, Clone)]
pub struct LinearInclusion {
    input: UncertainInput,
    activation: ActivationFunc,
    params: NNParams,
    config: PropagationConfig,
    layers: Vec<LayerInclusion>,
}

impl LinearInclusion {
    /// Build with the default linearization point.
    pub fn new(input: UncertainInput, activation: ActivationFunc, params: NNParams) -> Result<Self> {
        Self::with_config(input, activation, params, PropagationConfig::default())
    }

    pub fn with_config(
        input: UncertainInput,
        activation: ActivationFunc,
        params: NNParams,
        config: PropagationConfig,
    ) -> Result<Self> {
        if input.len() != params.input_dim() {
            return Err(LincertError::shape_mismatch(
                vec![params.input_dim()],
                vec![input.len()],
            ));
        }

        let start = Instant::now();
        let degenerate = input.uncertainties().iter().filter(|&&u| u == 0.0).count();
        if degenerate > 0 {
            warn!(
                coordinates = degenerate,
                "Input box has zero-width coordinates"
            );
        }

        let mut layers: Vec<LayerInclusion> = Vec::with_capacity(params.layer_count());
        for (i, layer) in params.iter().enumerate() {
            let theta_prev = match layers.last() {
                Some(prev) => prev.theta.as_slice(),
                None => input.theta_0(),
            };
            let result = propagate_layer(layer, theta_prev, &activation, config.linearization)
                .map_err(|e| e.in_layer(i))?;
            check_layer(i, &activation, &result);
            debug!(
                layer = i,
                neurons = result.width(),
                max_residual_width = result.max_residual_width(),
                "Propagated layer"
            );
            layers.push(result);
        }

        info!(
            activation = %activation,
            layers = layers.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Linear inclusion computed"
        );

        Ok(Self {
            input,
            activation,
            params,
            config,
            layers,
        })
    }

    pub fn input(&self) -> &UncertainInput {
        &self.input
    }

    pub fn activation(&self) -> &ActivationFunc {
        &self.activation
    }

    pub fn params(&self) -> &NNParams {
        &self.params
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Propagated layers `1..=L`, stored at indices `0..L`.
    pub fn layers(&self) -> &[LayerInclusion] {
        &self.layers
    }

    /// Post-activation box of layer `i`; `theta(0)` is the input box.
    pub fn theta(&self, i: usize) -> Option<&[Interval]> {
        match i {
            0 => Some(self.input.theta_0()),
            _ => self.layers.get(i - 1).map(|l| l.theta.as_slice()),
        }
    }

    /// Pre-activation box of layer `i >= 1`.
    pub fn z(&self, i: usize) -> Option<&[Interval]> {
        self.layer(i).map(|l| l.z.as_slice())
    }

    /// Linearization points of layer `i >= 1`.
    pub fn xi(&self, i: usize) -> Option<&[f64]> {
        self.layer(i).map(|l| l.xi.as_slice())
    }

    /// Residual intervals of layer `i >= 1`.
    pub fn r(&self, i: usize) -> Option<&[Interval]> {
        self.layer(i).map(|l| l.r.as_slice())
    }

    /// Layer `i >= 1` (1-indexed like the math).
    pub fn layer(&self, i: usize) -> Option<&LayerInclusion> {
        i.checked_sub(1).and_then(|idx| self.layers.get(idx))
    }

    /// Output box `theta[L]`.
    pub fn output_bounds(&self) -> &[Interval] {
        self.layers
            .last()
            .map_or(self.input.theta_0(), |l| l.theta.as_slice())
    }

    /// Ground-truth label of the nominal input.
    pub fn label(&self) -> Result<usize> {
        compute_label(&self.input, &self.activation, &self.params)
    }
}

fn check_layer(index: usize, activation: &ActivationFunc, layer: &LayerInclusion) {
    for k in non_monotone_neurons(activation, layer) {
        warn!(
            layer = index,
            neuron = k,
            z = %layer.z[k],
            activation = %activation,
            "Activation is not monotone on the pre-activation box; bounds may be unsound"
        );
    }
}

/// Sample points per pre-activation interval for the monotonicity check.
const MONOTONE_SAMPLES: usize = 16;

/// Neurons whose pre-activation interval the activation decreases on.
pub(crate) fn non_monotone_neurons(
    activation: &ActivationFunc,
    layer: &LayerInclusion,
) -> Vec<usize> {
    layer
        .z
        .iter()
        .enumerate()
        .filter(|(_, z)| !activation.check_monotone_on(z, MONOTONE_SAMPLES))
        .map(|(k, _)| k)
        .collect()
}

//! Configuration and per-layer result types for linear-inclusion propagation.

use lincert_core::Interval;
use serde::{Deserialize, Serialize};

/// Configuration for linear-inclusion propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Where each neuron's activation is linearized.
    pub linearization: LinearizationPoint,
}

/// Choice of the per-neuron linearization point `xi`.
///
/// Any point yields a sound relaxation; the choice only affects tightness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearizationPoint {
    /// `xi = midpoint(theta)`: midpoint of the post-activation interval.
    #[default]
    PostActivationMidpoint,
    /// `xi = midpoint(z)`: midpoint of the pre-activation interval.
    PreActivationMidpoint,
}

impl LinearizationPoint {
    pub fn select(self, z: &Interval, theta: &Interval) -> f64 {
        match self {
            LinearizationPoint::PostActivationMidpoint => theta.midpoint(),
            LinearizationPoint::PreActivationMidpoint => z.midpoint(),
        }
    }
}

impl std::str::FromStr for LinearizationPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "post" | "post_activation" | "post_activation_midpoint" => {
                Ok(LinearizationPoint::PostActivationMidpoint)
            }
            "pre" | "pre_activation" | "pre_activation_midpoint" => {
                Ok(LinearizationPoint::PreActivationMidpoint)
            }
            other => Err(format!("unknown linearization point '{other}'")),
        }
    }
}

/// Bounds and linearization data of one layer, indexed by neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInclusion {
    /// Pre-activation intervals.
    pub z: Vec<Interval>,
    /// Post-activation intervals, `[f(z.lo), f(z.hi)]`.
    pub theta: Vec<Interval>,
    /// Linearization points.
    pub xi: Vec<f64>,
    /// Taylor residual intervals.
    pub r: Vec<Interval>,
}

impl LayerInclusion {
    pub fn width(&self) -> usize {
        self.z.len()
    }

    /// Largest residual width in the layer; 0 for exact (affine) activations.
    pub fn max_residual_width(&self) -> f64 {
        self.r.iter().map(Interval::width).fold(0.0, f64::max)
    }
}

//! Box-shaped input uncertainty: a nominal input vector with a per-coordinate
//! radius.

use lincert_core::{Interval, LincertError, Result};
use ndarray::{arr1, Array1};
use serde::{Deserialize, Serialize};

/// A nominal input `v` with per-coordinate radius `u`, describing the box
/// `theta_0[j] = [v[j] - u[j], v[j] + u[j]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawUncertainInput", into = "RawUncertainInput")]
pub struct UncertainInput {
    values: Array1<f64>,
    uncertainties: Array1<f64>,
    theta_0: Vec<Interval>,
}

/// Wire form used for (de)serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawUncertainInput {
    values: Vec<f64>,
    uncertainties: Vec<f64>,
}

impl UncertainInput {
    /// Validate and build the input box.
    ///
    /// Fails on length mismatch, empty input, non-finite entries or negative
    /// radii. A zero radius is a valid degenerate coordinate.
    pub fn new(values: Array1<f64>, uncertainties: Array1<f64>) -> Result<Self> {
        if values.len() != uncertainties.len() {
            return Err(LincertError::shape_mismatch(
                vec![values.len()],
                vec![uncertainties.len()],
            ));
        }
        if values.is_empty() {
            return Err(LincertError::InvalidInput(
                "input vector must not be empty".to_string(),
            ));
        }
        if let Some(j) = values.iter().position(|v| !v.is_finite()) {
            return Err(LincertError::InvalidInput(format!(
                "input value {j} is not finite ({})",
                values[j]
            )));
        }
        if let Some(j) = uncertainties
            .iter()
            .position(|u| !u.is_finite() || *u < 0.0)
        {
            return Err(LincertError::InvalidInput(format!(
                "uncertainty {j} must be finite and non-negative (got {})",
                uncertainties[j]
            )));
        }

        let theta_0 = values
            .iter()
            .zip(uncertainties.iter())
            .map(|(&v, &u)| Interval::centered(v, u))
            .collect();

        Ok(Self {
            values,
            uncertainties,
            theta_0,
        })
    }

    pub fn from_vecs(values: Vec<f64>, uncertainties: Vec<f64>) -> Result<Self> {
        Self::new(Array1::from(values), Array1::from(uncertainties))
    }

    /// Same radius on every coordinate.
    pub fn with_uniform_uncertainty(values: Array1<f64>, radius: f64) -> Result<Self> {
        let uncertainties = Array1::from_elem(values.len(), radius);
        Self::new(values, uncertainties)
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn uncertainties(&self) -> &Array1<f64> {
        &self.uncertainties
    }

    /// The input box, one interval per coordinate.
    pub fn theta_0(&self) -> &[Interval] {
        &self.theta_0
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every radius is zero.
    pub fn is_degenerate(&self) -> bool {
        self.uncertainties.iter().all(|&u| u == 0.0)
    }
}

impl Default for UncertainInput {
    /// `v = [0.5, 0.5]`, `u = [0.5, 0.5]`, i.e. the unit square.
    fn default() -> Self {
        let values = arr1(&[0.5, 0.5]);
        let uncertainties = arr1(&[0.5, 0.5]);
        Self {
            theta_0: vec![Interval::new(0.0, 1.0); 2],
            values,
            uncertainties,
        }
    }
}

impl TryFrom<RawUncertainInput> for UncertainInput {
    type Error = LincertError;

    fn try_from(raw: RawUncertainInput) -> Result<Self> {
        Self::from_vecs(raw.values, raw.uncertainties)
    }
}

impl From<UncertainInput> for RawUncertainInput {
    fn from(input: UncertainInput) -> Self {
        Self {
            values: input.values.to_vec(),
            uncertainties: input.uncertainties.to_vec(),
        }
    }
}

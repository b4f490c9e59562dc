//! Scalar activation functions paired with their first derivatives.
//!
//! Linearization needs both the activation and its derivative at the
//! linearization point, and the interval extension relies on the activation
//! being monotone non-decreasing on the propagated box. All built-in
//! activations are monotone non-decreasing on the whole real line.

use lincert_core::{Interval, LincertError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default `alpha` of QuadLU.
pub const QUADLU_DEFAULT_ALPHA: f64 = 0.25;

/// A user-supplied activation given as a `(func, deriv)` pair.
///
/// `func` must be monotone non-decreasing wherever it is applied; this is not
/// enforced, a violation only makes the relaxation unsound.
#[derive(Debug, Clone, Copy)]
pub struct CustomActivation {
    pub name: &'static str,
    pub func: fn(f64) -> f64,
    pub deriv: fn(f64) -> f64,
}

/// An activation function together with its derivative.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationFunc {
    /// `f(x) = x`
    #[default]
    Identity,
    /// `f(x) = 1 / (1 + exp(-x))`
    Sigmoid,
    /// `f(x) = tanh(x)`
    Tanh,
    /// Piecewise quadratic unit with parameter `alpha > 0`:
    /// `0` for `x <= -alpha`, `(x + alpha)^2` in between, `4 alpha x` for `x >= alpha`.
    #[serde(rename = "quadlu")]
    QuadLu { alpha: f64 },
    #[serde(skip)]
    Custom(CustomActivation),
}

impl ActivationFunc {
    /// QuadLU with the default `alpha = 0.25`.
    pub fn quadlu() -> Self {
        ActivationFunc::QuadLu {
            alpha: QUADLU_DEFAULT_ALPHA,
        }
    }

    /// QuadLU with a custom `alpha`.
    pub fn quadlu_with_alpha(alpha: f64) -> Result<Self> {
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(LincertError::InvalidInput(format!(
                "QuadLU alpha must be positive and finite (got {alpha})"
            )));
        }
        Ok(ActivationFunc::QuadLu { alpha })
    }

    pub fn custom(name: &'static str, func: fn(f64) -> f64, deriv: fn(f64) -> f64) -> Self {
        ActivationFunc::Custom(CustomActivation { name, func, deriv })
    }

    pub fn name(&self) -> &str {
        match self {
            ActivationFunc::Identity => "identity",
            ActivationFunc::Sigmoid => "sigmoid",
            ActivationFunc::Tanh => "tanh",
            ActivationFunc::QuadLu { .. } => "quadlu",
            ActivationFunc::Custom(custom) => custom.name,
        }
    }

    /// Evaluate the activation at a point.
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            ActivationFunc::Identity => x,
            ActivationFunc::Sigmoid => sigmoid(x),
            ActivationFunc::Tanh => x.tanh(),
            ActivationFunc::QuadLu { alpha } => quadlu(x, *alpha),
            ActivationFunc::Custom(custom) => (custom.func)(x),
        }
    }

    /// Evaluate the first derivative at a point.
    #[inline]
    pub fn deriv(&self, x: f64) -> f64 {
        match self {
            ActivationFunc::Identity => 1.0,
            ActivationFunc::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            ActivationFunc::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunc::QuadLu { alpha } => quadlu_prime(x, *alpha),
            ActivationFunc::Custom(custom) => (custom.deriv)(x),
        }
    }

    /// Element-wise activation of a vector.
    pub fn apply(&self, xs: &Array1<f64>) -> Array1<f64> {
        xs.mapv(|x| self.eval(x))
    }

    /// Element-wise derivative of a vector.
    pub fn apply_deriv(&self, xs: &Array1<f64>) -> Array1<f64> {
        xs.mapv(|x| self.deriv(x))
    }

    /// Image of an interval, `[f(lo), f(hi)]`.
    ///
    /// Exact for monotone non-decreasing activations. For anything else the
    /// endpoints are ordered so the result stays a valid interval, but it may
    /// miss interior values.
    pub fn interval_image(&self, z: &Interval) -> Interval {
        let a = self.eval(z.lo);
        let b = self.eval(z.hi);
        if a <= b {
            Interval::new(a, b)
        } else {
            Interval::new(b, a)
        }
    }

    /// Sample `samples + 1` evenly spaced points of `z` and check that the
    /// activation never decreases between consecutive samples.
    pub fn check_monotone_on(&self, z: &Interval, samples: usize) -> bool {
        if z.is_point() || samples == 0 {
            return true;
        }
        let step = z.width() / samples as f64;
        let mut prev = self.eval(z.lo);
        for i in 1..=samples {
            let x = if i == samples {
                z.hi
            } else {
                z.lo + step * i as f64
            };
            let y = self.eval(x);
            if y < prev {
                return false;
            }
            prev = y;
        }
        true
    }
}

impl PartialEq for ActivationFunc {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ActivationFunc::Identity, ActivationFunc::Identity)
            | (ActivationFunc::Sigmoid, ActivationFunc::Sigmoid)
            | (ActivationFunc::Tanh, ActivationFunc::Tanh) => true,
            (ActivationFunc::QuadLu { alpha: a }, ActivationFunc::QuadLu { alpha: b }) => a == b,
            (ActivationFunc::Custom(a), ActivationFunc::Custom(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for ActivationFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationFunc::QuadLu { alpha } => write!(f, "quadlu:{alpha}"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for ActivationFunc {
    type Err = LincertError;

    /// Parses `identity`, `sigmoid`, `tanh`, `quadlu` or `quadlu:<alpha>`.
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.split_once(':') {
            Some(("quadlu", alpha)) => {
                let alpha: f64 = alpha.parse().map_err(|_| {
                    LincertError::InvalidInput(format!("invalid QuadLU alpha '{alpha}'"))
                })?;
                ActivationFunc::quadlu_with_alpha(alpha)
            }
            Some(_) => Err(LincertError::InvalidInput(format!(
                "unknown activation '{s}'"
            ))),
            None => match lowered.as_str() {
                "identity" | "id" | "linear" => Ok(ActivationFunc::Identity),
                "sigmoid" => Ok(ActivationFunc::Sigmoid),
                "tanh" => Ok(ActivationFunc::Tanh),
                "quadlu" => Ok(ActivationFunc::quadlu()),
                _ => Err(LincertError::InvalidInput(format!(
                    "unknown activation '{s}'"
                ))),
            },
        }
    }
}

/// Logistic sigmoid, evaluated without overflow for large `|x|`.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[inline]
pub fn quadlu(x: f64, alpha: f64) -> f64 {
    if x <= -alpha {
        0.0
    } else if x >= alpha {
        4.0 * alpha * x
    } else {
        (x + alpha) * (x + alpha)
    }
}

#[inline]
pub fn quadlu_prime(x: f64, alpha: f64) -> f64 {
    if x <= -alpha {
        0.0
    } else if x >= alpha {
        4.0 * alpha
    } else {
        2.0 * (x + alpha)
    }
}

//! Core types for linear-inclusion robustness certification.
//!
//! This crate provides the interval arithmetic every bound computation is
//! built on, together with the error taxonomy shared by propagation and
//! model building.

pub mod interval;

pub use interval::Interval;

use thiserror::Error;

/// Macro to create a ShapeMismatch error with debug assertion.
#[macro_export]
macro_rules! shape_mismatch_err {
    ($expected:expr, $got:expr) => {{
        let exp: Vec<usize> = $expected;
        let got: Vec<usize> = $got;
        debug_assert!(
            exp != got,
            "BUG: ShapeMismatch with identical shapes {:?} at {}:{}:{}",
            exp,
            file!(),
            line!(),
            column!()
        );
        $crate::LincertError::ShapeMismatch { expected: exp, got }
    }};
}

/// Error types for certification operations.
#[derive(Debug, Error)]
pub enum LincertError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid network parameters: {0}")]
    InvalidParams(String),

    #[error("Layer {layer_index} failed: {source}")]
    LayerError {
        layer_index: usize,
        #[source]
        source: Box<LincertError>,
    },

    #[error("Invalid model state: {0}")]
    InvalidState(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LincertError {
    /// Create a ShapeMismatch error, panicking if shapes are identical (bug indicator).
    #[track_caller]
    pub fn shape_mismatch(expected: Vec<usize>, got: Vec<usize>) -> Self {
        if expected == got {
            let loc = std::panic::Location::caller();
            panic!(
                "BUG at {}:{}:{}: ShapeMismatch created with identical shapes: {:?}.",
                loc.file(),
                loc.line(),
                loc.column(),
                expected
            );
        }
        LincertError::ShapeMismatch { expected, got }
    }

    /// Attach the index of the layer in which this error occurred.
    pub fn in_layer(self, layer_index: usize) -> Self {
        LincertError::LayerError {
            layer_index,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, LincertError>;

//! Exact forward pass and the ground-truth label oracle.

use crate::activation::ActivationFunc;
use crate::params::NNParams;
use crate::uncertain::UncertainInput;
use lincert_core::{LincertError, Result};
use ndarray::{Array1, ArrayView1};
use tracing::trace;

/// Evaluate the network on a concrete input: `a_i = f(W_i a_{i-1} + b_i)`.
pub fn forward_pass(
    input: ArrayView1<'_, f64>,
    activation: &ActivationFunc,
    params: &NNParams,
) -> Result<Array1<f64>> {
    if input.len() != params.input_dim() {
        return Err(LincertError::shape_mismatch(
            vec![params.input_dim()],
            vec![input.len()],
        ));
    }
    let mut current = input.to_owned();
    for (i, layer) in params.iter().enumerate() {
        let z = layer.weight().dot(&current) + layer.bias();
        current = activation.apply(&z);
        trace!(layer = i, ?current, "forward");
    }
    Ok(current)
}

/// Index of the largest entry; ties resolve to the lowest index.
///
/// NaN entries never win against a number.
pub fn argmax(values: ArrayView1<'_, f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (k, &v) in values.iter().enumerate() {
        match best {
            None => best = Some((k, v)),
            Some((_, b)) if v > b || (b.is_nan() && !v.is_nan()) => best = Some((k, v)),
            _ => {}
        }
    }
    best.map(|(k, _)| k)
}

/// The class the network assigns to the nominal input (not the box).
pub fn compute_label(
    input: &UncertainInput,
    activation: &ActivationFunc,
    params: &NNParams,
) -> Result<usize> {
    let output = forward_pass(input.values().view(), activation, params)?;
    argmax(output.view()).ok_or_else(|| {
        LincertError::InvalidParams("network has no outputs to label".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_default_label_is_zero() {
        let label = compute_label(
            &UncertainInput::default(),
            &ActivationFunc::Identity,
            &NNParams::default(),
        )
        .unwrap();
        assert_eq!(label, 0);
    }

    #[test]
    fn test_label_picks_largest_output() {
        let params = NNParams::new(
            vec![arr1(&[0.0, 0.0])],
            vec![arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])],
        )
        .unwrap();
        let input = UncertainInput::from_vecs(vec![6.0, 3.0, 0.0], vec![1.0; 3]).unwrap();
        assert_eq!(compute_label(&input, &ActivationFunc::Identity, &params).unwrap(), 0);

        let input = UncertainInput::from_vecs(vec![1.0, 3.0, 0.0], vec![1.0; 3]).unwrap();
        assert_eq!(compute_label(&input, &ActivationFunc::Identity, &params).unwrap(), 1);
    }

    #[test]
    fn test_forward_two_layers() {
        let params = NNParams::new(
            vec![arr1(&[1.0, -1.0]), arr1(&[0.5])],
            vec![arr2(&[[1.0, 2.0], [3.0, 4.0]]), arr2(&[[1.0, -1.0]])],
        )
        .unwrap();
        // layer 1: [1+2+1, 3+4-1] = [4, 6]; layer 2: 4 - 6 + 0.5
        let out = forward_pass(arr1(&[1.0, 1.0]).view(), &ActivationFunc::Identity, &params).unwrap();
        assert_eq!(out, arr1(&[-1.5]));
    }

    #[test]
    fn test_forward_applies_activation() {
        let out = forward_pass(
            arr1(&[0.0, 0.0]).view(),
            &ActivationFunc::Sigmoid,
            &NNParams::default(),
        )
        .unwrap();
        assert_eq!(out, arr1(&[0.5, 0.5]));
    }

    #[test]
    fn test_forward_dimension_mismatch() {
        let err = forward_pass(arr1(&[1.0, 2.0, 3.0]).view(), &ActivationFunc::Identity, &NNParams::default())
            .unwrap_err();
        assert!(matches!(err, LincertError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_argmax_ties_and_nan() {
        assert_eq!(argmax(arr1(&[1.0, 3.0, 3.0]).view()), Some(1));
        assert_eq!(argmax(arr1(&[2.0, 2.0]).view()), Some(0));
        assert_eq!(argmax(arr1(&[f64::NAN, 1.0]).view()), Some(1));
        assert_eq!(argmax(arr1(&[1.0, f64::NAN]).view()), Some(0));
        assert_eq!(argmax(Array1::<f64>::zeros(0).view()), None);
    }
}

//! Property-based soundness tests for linear-inclusion propagation.
//!
//! For any concrete point inside the input box, the exact forward values must
//! lie inside the propagated boxes, and the linearization error at every
//! point of a pre-activation interval must lie inside its residual interval.
//! A small tolerance absorbs floating-point rounding, since the interval
//! arithmetic does not round outward.

use crate::*;
use ndarray::{Array1, Array2};
use proptest::prelude::*;

const FP_TOLERANCE: f64 = 1e-9;

fn valid_interval(range: f64) -> impl Strategy<Value = Interval> {
    (-range..range, -range..range).prop_map(|(a, b)| Interval::new(a.min(b), a.max(b)))
}

fn sample_points(iv: &Interval, num_samples: usize) -> Vec<f64> {
    if iv.is_point() {
        return vec![iv.lo];
    }
    (0..=num_samples)
        .map(|i| {
            let t = i as f64 / num_samples as f64;
            (iv.lo + iv.width() * t).clamp(iv.lo, iv.hi)
        })
        .collect()
}

fn builtin_activation() -> impl Strategy<Value = ActivationFunc> {
    prop_oneof![
        Just(ActivationFunc::Identity),
        Just(ActivationFunc::Sigmoid),
        Just(ActivationFunc::Tanh),
        (0.05f64..2.0).prop_map(|alpha| ActivationFunc::QuadLu { alpha }),
    ]
}

/// A small dense network with its input box.
fn network_and_box() -> impl Strategy<Value = (NNParams, Vec<f64>, Vec<f64>)> {
    (1usize..4, 1usize..4, 1usize..3).prop_flat_map(|(n_in, hidden, depth)| {
        let mut widths = vec![n_in];
        widths.extend(std::iter::repeat(hidden).take(depth));
        widths.push(2);
        let layer_strats: Vec<_> = widths
            .windows(2)
            .map(|w| {
                let (fan_in, fan_out) = (w[0], w[1]);
                (
                    prop::collection::vec(-2.0f64..2.0, fan_in * fan_out),
                    prop::collection::vec(-1.0f64..1.0, fan_out),
                )
                    .prop_map(move |(ws, bs)| {
                        let weight = Array2::from_shape_vec((fan_out, fan_in), ws)
                            .expect("shape matches generated length");
                        DenseLayer::new(weight, Array1::from(bs)).expect("finite layer")
                    })
            })
            .collect();
        (
            layer_strats,
            prop::collection::vec(-2.0f64..2.0, n_in),
            prop::collection::vec(0.0f64..0.5, n_in),
        )
            .prop_map(|(layers, values, radii)| {
                (
                    NNParams::from_layers(layers).expect("chained widths"),
                    values,
                    radii,
                )
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Affine extension: W p + b lies in z for every p in the box.
    #[test]
    fn soundness_affine_extension(
        (params, values, radii) in network_and_box(),
        ts in prop::collection::vec(0.0f64..=1.0, 3),
    ) {
        let input = UncertainInput::from_vecs(values, radii).unwrap();
        let layer = &params.layers()[0];
        let z = affine_interval_extension(layer, input.theta_0()).unwrap();

        let p: Array1<f64> = input
            .theta_0()
            .iter()
            .enumerate()
            .map(|(j, iv)| iv.lo + iv.width() * ts[j % ts.len()])
            .collect();
        let exact = layer.weight().dot(&p) + layer.bias();
        for (k, zk) in z.iter().enumerate() {
            prop_assert!(
                exact[k] >= zk.lo - FP_TOLERANCE && exact[k] <= zk.hi + FP_TOLERANCE,
                "neuron {}: {} not in {}", k, exact[k], zk
            );
        }
    }

    /// Monotone activation image equals [f(lo), f(hi)] and contains f(x).
    #[test]
    fn soundness_monotone_image(act in builtin_activation(), z in valid_interval(10.0)) {
        let theta = act.interval_image(&z);
        prop_assert!((theta.lo - act.eval(z.lo)).abs() <= FP_TOLERANCE);
        prop_assert!((theta.hi - act.eval(z.hi)).abs() <= FP_TOLERANCE);
        for x in sample_points(&z, 32) {
            let y = act.eval(x);
            prop_assert!(y >= theta.lo - FP_TOLERANCE && y <= theta.hi + FP_TOLERANCE);
        }
    }

    /// Residual sandwich: f(x) - f(xi) - f'(xi)(x - xi) lies in r for all x in z.
    #[test]
    fn soundness_residual_sandwich(
        act in builtin_activation(),
        z in valid_interval(6.0),
        pre in any::<bool>(),
    ) {
        let theta = act.interval_image(&z);
        let linearization = if pre {
            LinearizationPoint::PreActivationMidpoint
        } else {
            LinearizationPoint::PostActivationMidpoint
        };
        let xi = linearization.select(&z, &theta);
        let r = taylor_residual(&act, xi, &z, &theta);
        let (fxi, dxi) = (act.eval(xi), act.deriv(xi));
        for x in sample_points(&z, 64) {
            let err = act.eval(x) - fxi - dxi * (x - xi);
            prop_assert!(
                err >= r.lo - FP_TOLERANCE && err <= r.hi + FP_TOLERANCE,
                "error {} at x = {} not in {}", err, x, r
            );
        }
    }

    /// End to end: the exact forward trajectory of any point in the box stays
    /// inside every layer's z and theta.
    #[test]
    fn soundness_forward_trajectory(
        act in builtin_activation(),
        (params, values, radii) in network_and_box(),
        t in 0.0f64..=1.0,
    ) {
        let input = UncertainInput::from_vecs(values, radii).unwrap();
        let li = LinearInclusion::new(input.clone(), act, params.clone()).unwrap();

        let mut a: Array1<f64> = input.theta_0().iter().map(|iv| iv.lo + iv.width() * t).collect();
        for (idx, layer) in params.iter().enumerate() {
            let z = layer.weight().dot(&a) + layer.bias();
            a = act.apply(&z);
            let bounds = li.layer(idx + 1).unwrap();
            for k in 0..z.len() {
                let slack = FP_TOLERANCE * (1.0 + z[k].abs());
                prop_assert!(z[k] >= bounds.z[k].lo - slack && z[k] <= bounds.z[k].hi + slack);
                prop_assert!(a[k] >= bounds.theta[k].lo - slack && a[k] <= bounds.theta[k].hi + slack);
            }
        }
    }

    /// Label is a pure function of the nominal input.
    #[test]
    fn label_is_deterministic(
        act in builtin_activation(),
        (params, values, radii) in network_and_box(),
    ) {
        let input = UncertainInput::from_vecs(values, radii).unwrap();
        let first = compute_label(&input, &act, &params).unwrap();
        let second = compute_label(&input, &act, &params).unwrap();
        prop_assert_eq!(first, second);

        let out = forward_pass(input.values().view(), &act, &params).unwrap();
        prop_assert_eq!(out.len(), 2);
        let expected = if out[1] > out[0] { 1 } else { 0 };
        prop_assert_eq!(first, expected);
    }

    /// Every per-layer vector has the layer's output width.
    #[test]
    fn layer_vectors_match_widths((params, values, radii) in network_and_box()) {
        let input = UncertainInput::from_vecs(values, radii).unwrap();
        let li = LinearInclusion::new(input, ActivationFunc::Sigmoid, params.clone()).unwrap();
        prop_assert_eq!(li.layer_count(), params.layer_count());
        for (layer, inc) in params.iter().zip(li.layers()) {
            prop_assert_eq!(inc.z.len(), layer.out_features());
            prop_assert_eq!(inc.theta.len(), layer.out_features());
            prop_assert_eq!(inc.xi.len(), layer.out_features());
            prop_assert_eq!(inc.r.len(), layer.out_features());
        }
    }
}

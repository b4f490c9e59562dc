//! Property tests for the relaxed robustness margin.
//!
//! The relaxation contains the exact trajectory of every admissible input, so
//! the certified margin can never exceed the margin of the nominal input.
//! All formulations describe the same feasible set and must agree.

use lincert_lp::{Formulation, RobustnessVerification, SolveStatus};
use lincert_propagate::{
    forward_pass, ActivationFunc, DenseLayer, LinearInclusion, NNParams, UncertainInput,
};
use ndarray::{Array1, Array2};
use proptest::prelude::*;

const TOL: f64 = 1e-6;

fn activation() -> impl Strategy<Value = ActivationFunc> {
    prop_oneof![
        Just(ActivationFunc::Identity),
        Just(ActivationFunc::Sigmoid),
        Just(ActivationFunc::Tanh),
        Just(ActivationFunc::quadlu()),
    ]
}

/// One hidden layer, three outputs.
fn instance() -> impl Strategy<Value = (NNParams, UncertainInput)> {
    (1usize..4, 1usize..4).prop_flat_map(|(n_in, hidden)| {
        let layer = |fan_in: usize, fan_out: usize| {
            (
                prop::collection::vec(-1.5f64..1.5, fan_in * fan_out),
                prop::collection::vec(-0.5f64..0.5, fan_out),
            )
                .prop_map(move |(ws, bs)| {
                    let weight = Array2::from_shape_vec((fan_out, fan_in), ws)
                        .expect("shape matches generated length");
                    DenseLayer::new(weight, Array1::from(bs)).expect("finite layer")
                })
        };
        (
            layer(n_in, hidden),
            layer(hidden, 3),
            prop::collection::vec(-1.0f64..1.0, n_in),
            prop::collection::vec(0.0f64..0.3, n_in),
        )
            .prop_map(|(first, second, values, radii)| {
                (
                    NNParams::from_layers(vec![first, second]).expect("chained widths"),
                    UncertainInput::from_vecs(values, radii).expect("valid input"),
                )
            })
    })
}

fn margin(li: &LinearInclusion, formulation: Formulation) -> f64 {
    let mut v = RobustnessVerification::new(li, formulation).expect("model builds");
    match v.solve().expect("first solve") {
        SolveStatus::Optimal { value } => *value,
        other => panic!("{formulation}: {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// The certified margin is a lower bound on the nominal margin.
    #[test]
    fn prop_margin_bounded_by_nominal((params, input) in instance(), act in activation()) {
        let nominal = forward_pass(input.values().view(), &act, &params).unwrap();
        let li = LinearInclusion::new(input, act, params).unwrap();
        let label = li.label().unwrap();
        let runner_up = nominal
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != label)
            .map(|(_, &v)| v)
            .fold(f64::NEG_INFINITY, f64::max);

        let value = margin(&li, Formulation::default());
        prop_assert!(value <= nominal[label] - runner_up + TOL,
            "certified {} above nominal {}", value, nominal[label] - runner_up);
    }

    /// Per-competitor and auxiliary formulations reach the same optimum.
    #[test]
    fn prop_formulations_agree((params, input) in instance(), act in activation()) {
        let li = LinearInclusion::new(input, act, params).unwrap();
        let direct = margin(&li, Formulation::DirectMarginPerCompetitor);
        let auxiliary = margin(&li, Formulation::AuxiliaryMaxMarginVariable);
        let baked = margin(&li, Formulation::ResidualBakedIntoConstraint);
        let scale = direct.abs().max(1.0);
        prop_assert!((direct - auxiliary).abs() <= TOL * scale, "{} vs {}", direct, auxiliary);
        prop_assert!((direct - baked).abs() <= TOL * scale, "{} vs {}", direct, baked);
    }
}

//! Encoding of a [`LinearInclusion`] as linear programs.
//!
//! Every formulation shares the same variables and affine ties:
//!
//! - `x[i,k]` for `i = 0..=L`, bounded by `theta[i][k]`,
//! - `z[i,k]` for `i = 1..=L`, free, with `z[i,k] = W[i] x[i-1] + b[i]`,
//!
//! and the same relaxation sandwich per neuron
//! `r.lo <= x[i,k] - f(xi) - f'(xi) (z[i,k] - xi) <= r.hi`.
//! Formulations differ only in how the residual is exposed and in the
//! margin objective.
//!
//! The auxiliary formulation asks for the largest `t` such that
//! `x[L,label] - x[L,k] >= t` holds for *every* admissible point, not just
//! for one. That robust constraint is linear once each competitor's inner
//! minimum is replaced by its LP dual: any dual-feasible point bounds the
//! minimum from below, and at the optimum the bound is tight. The program
//! therefore carries one block of dual variables per competitor and its
//! optimum equals the smallest margin over all competitors.

use crate::model::{ConstraintSense, LinearExpr, LinearProgram, ObjectiveSense, VarId};
use lincert_core::{LincertError, Result};
use lincert_propagate::LinearInclusion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Objective and residual wiring of the robustness model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formulation {
    /// One program per competitor `k`, each minimizing `x[L,label] - x[L,k]`.
    /// Residuals are bounded decision variables.
    DirectMarginPerCompetitor,
    /// One program: maximize a free `t` with `x[L,label] - x[L,k] >= t` for
    /// every competitor and every admissible point, certified by duality.
    /// Residuals are bounded decision variables of the witness programs.
    #[default]
    AuxiliaryMaxMarginVariable,
    /// Like the direct formulation, but residual bounds are constants of two
    /// inequalities per neuron.
    ResidualBakedIntoConstraint,
}

impl Formulation {
    pub const ALL: [Formulation; 3] = [
        Formulation::DirectMarginPerCompetitor,
        Formulation::AuxiliaryMaxMarginVariable,
        Formulation::ResidualBakedIntoConstraint,
    ];

    /// Whether residuals are decision variables with readable values.
    pub fn exposes_residuals(self) -> bool {
        !matches!(self, Formulation::ResidualBakedIntoConstraint)
    }

    /// Whether one program is solved per competitor.
    pub fn per_competitor(self) -> bool {
        !matches!(self, Formulation::AuxiliaryMaxMarginVariable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Formulation::DirectMarginPerCompetitor => "direct",
            Formulation::AuxiliaryMaxMarginVariable => "auxiliary",
            Formulation::ResidualBakedIntoConstraint => "baked",
        }
    }
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Formulation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "direct" | "baseline" | "direct_margin_per_competitor" => {
                Ok(Formulation::DirectMarginPerCompetitor)
            }
            "auxiliary" | "adapted" | "auxiliary_max_margin_variable" => {
                Ok(Formulation::AuxiliaryMaxMarginVariable)
            }
            "baked" | "original" | "residual_baked_into_constraint" => {
                Ok(Formulation::ResidualBakedIntoConstraint)
            }
            other => Err(format!("unknown formulation '{other}'")),
        }
    }
}

/// Variable handles of the primal programs of one model.
///
/// Primal programs are built from one shared base, so a handle refers to the
/// same variable in each of them: the entries of
/// [`RobustnessModel::programs`] for per-competitor formulations, the entries
/// of [`RobustnessModel::witnesses`] for the auxiliary one.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLayout {
    /// `x[i][k]`, `i = 0..=L`.
    pub x: Vec<Vec<VarId>>,
    /// `z[i-1][k]` for layer `i = 1..=L`.
    pub z: Vec<Vec<VarId>>,
    /// `r[i-1][k]` for layer `i = 1..=L`, when residuals are variables.
    pub r: Option<Vec<Vec<VarId>>>,
    /// Margin variable; indexes the auxiliary program, not the witnesses.
    pub t: Option<VarId>,
}

impl ModelLayout {
    pub fn x(&self, i: usize, k: usize) -> Option<VarId> {
        self.x.get(i).and_then(|layer| layer.get(k)).copied()
    }

    pub fn z(&self, i: usize, k: usize) -> Option<VarId> {
        i.checked_sub(1)
            .and_then(|idx| self.z.get(idx))
            .and_then(|layer| layer.get(k))
            .copied()
    }

    pub fn r(&self, i: usize, k: usize) -> Option<VarId> {
        let r = self.r.as_ref()?;
        i.checked_sub(1)
            .and_then(|idx| r.get(idx))
            .and_then(|layer| layer.get(k))
            .copied()
    }
}

/// One program of a model; `competitor` is set for per-competitor programs.
#[derive(Debug, Clone)]
pub struct MarginProgram {
    pub competitor: Option<usize>,
    pub program: LinearProgram,
}

/// Lower bound on one competitor's margin, as an expression over the dual
/// variables of the auxiliary program.
#[derive(Debug, Clone)]
pub struct DualCertificate {
    pub competitor: usize,
    pub bound: LinearExpr,
}

/// All programs that together decide the robustness margin.
#[derive(Debug, Clone)]
pub struct RobustnessModel {
    pub formulation: Formulation,
    pub label: usize,
    pub layout: ModelLayout,
    pub programs: Vec<MarginProgram>,
    /// Per-competitor primal programs used to recover an optimal point for
    /// the auxiliary formulation; empty otherwise.
    pub witnesses: Vec<MarginProgram>,
    /// Dual bound per competitor of the auxiliary program; empty otherwise.
    pub certificates: Vec<DualCertificate>,
}

impl RobustnessModel {
    pub fn num_vars(&self) -> usize {
        self.programs.first().map_or(0, |p| p.program.num_vars())
    }

    pub fn num_constraints(&self) -> usize {
        self.programs.first().map_or(0, |p| p.program.num_constraints())
    }
}

/// Build the robustness model of `inclusion` for `label`.
pub fn build_model(
    inclusion: &LinearInclusion,
    label: usize,
    formulation: Formulation,
) -> Result<RobustnessModel> {
    let out_dim = inclusion.params().output_dim();
    if label >= out_dim {
        return Err(LincertError::InvalidInput(format!(
            "label {label} out of range for {out_dim} outputs"
        )));
    }
    if out_dim < 2 {
        return Err(LincertError::InvalidParams(
            "robustness margin needs at least two output neurons".to_string(),
        ));
    }

    let (base, mut layout) = build_shared(inclusion, formulation)?;
    let last = layout.x.len() - 1;
    let x_label = layout.x[last][label];
    let competitors: Vec<usize> = (0..out_dim).filter(|&k| k != label).collect();
    let mut witnesses = Vec::new();
    let mut certificates = Vec::new();

    let programs = match formulation {
        Formulation::DirectMarginPerCompetitor | Formulation::ResidualBakedIntoConstraint => {
            competitors
                .iter()
                .map(|&k| {
                    let mut program = base.clone();
                    program.set_objective(
                        ObjectiveSense::Minimize,
                        LinearExpr::var(x_label).term(layout.x[last][k], -1.0),
                    );
                    MarginProgram {
                        competitor: Some(k),
                        program,
                    }
                })
                .collect()
        }
        Formulation::AuxiliaryMaxMarginVariable => {
            let mut robust = LinearProgram::new(format!("robustness_{formulation}"));
            let t = robust.add_free_var("t");
            for &k in &competitors {
                let margin = LinearExpr::var(x_label).term(layout.x[last][k], -1.0);
                let bound = add_dual_bound(&mut robust, &base, &margin, k)?;
                // t <= dual bound on min (x[L,label] - x[L,k])
                let mut expr = LinearExpr::var(t);
                for &(var, coef) in &bound.terms {
                    expr.add_term(var, -coef);
                }
                robust.add_constraint(
                    format!("margin_{k}"),
                    expr,
                    ConstraintSense::Le,
                    bound.constant,
                )?;
                let mut witness = base.clone();
                witness.set_objective(ObjectiveSense::Minimize, margin);
                witnesses.push(MarginProgram {
                    competitor: Some(k),
                    program: witness,
                });
                certificates.push(DualCertificate {
                    competitor: k,
                    bound,
                });
            }
            robust.set_objective(ObjectiveSense::Maximize, LinearExpr::var(t));
            layout.t = Some(t);
            vec![MarginProgram {
                competitor: None,
                program: robust,
            }]
        }
    };

    let model = RobustnessModel {
        formulation,
        label,
        layout,
        programs,
        witnesses,
        certificates,
    };
    debug!(
        %formulation,
        label,
        programs = model.programs.len(),
        vars = model.num_vars(),
        constraints = model.num_constraints(),
        "Built robustness model"
    );
    Ok(model)
}

/// Add to `robust` the dual of `min objective` over `base` and return the
/// dual objective.
///
/// For rows `a_i v (sense) b_i` and bounds `l <= v <= u`, the dual has one
/// multiplier per row (free for `=`, `>= 0` for `>=`, `<= 0` for `<=`) and
/// one non-negative multiplier per finite bound, tied by
/// `sum_i a_ij y_i + alpha_j - gamma_j = c_j` for every primal column `j`.
/// Every feasible assignment gives `b y + l alpha - u gamma <= min objective`.
fn add_dual_bound(
    robust: &mut LinearProgram,
    base: &LinearProgram,
    objective: &LinearExpr,
    competitor: usize,
) -> Result<LinearExpr> {
    let mut bound = LinearExpr::constant(objective.constant);
    let mut columns = vec![LinearExpr::new(); base.num_vars()];

    for c in base.constraints() {
        let (lower, upper) = match c.sense {
            ConstraintSense::Eq => (f64::NEG_INFINITY, f64::INFINITY),
            ConstraintSense::Ge => (0.0, f64::INFINITY),
            ConstraintSense::Le => (f64::NEG_INFINITY, 0.0),
        };
        let y = robust.add_var(format!("y_{competitor}_{}", c.name), lower, upper)?;
        bound.add_term(y, c.rhs - c.expr.constant);
        for &(var, coef) in &c.expr.terms {
            columns[var.index()].add_term(y, coef);
        }
    }

    let mut cost = vec![0.0; base.num_vars()];
    for &(var, coef) in &objective.terms {
        cost[var.index()] += coef;
    }

    for (j, (v, mut column)) in base.variables().iter().zip(columns).enumerate() {
        if v.lower.is_finite() {
            let alpha = robust.add_var(format!("lo_{competitor}_{}", v.name), 0.0, f64::INFINITY)?;
            column.add_term(alpha, 1.0);
            bound.add_term(alpha, v.lower);
        }
        if v.upper.is_finite() {
            let gamma = robust.add_var(format!("up_{competitor}_{}", v.name), 0.0, f64::INFINITY)?;
            column.add_term(gamma, -1.0);
            bound.add_term(gamma, -v.upper);
        }
        robust.add_constraint(
            format!("dual_{competitor}_{}", v.name),
            column,
            ConstraintSense::Eq,
            cost[j],
        )?;
    }
    Ok(bound)
}

/// Variables, affine ties and relaxation sandwich common to all formulations.
fn build_shared(
    inclusion: &LinearInclusion,
    formulation: Formulation,
) -> Result<(LinearProgram, ModelLayout)> {
    let mut lp = LinearProgram::new(format!("robustness_{formulation}"));
    let activation = inclusion.activation();
    let mut x: Vec<Vec<VarId>> = Vec::with_capacity(inclusion.layer_count() + 1);
    let mut z: Vec<Vec<VarId>> = Vec::with_capacity(inclusion.layer_count());
    let mut r: Vec<Vec<VarId>> = Vec::new();

    let input_vars = inclusion
        .input()
        .theta_0()
        .iter()
        .enumerate()
        .map(|(k, iv)| lp.add_var(format!("x_0_{k}"), iv.lo, iv.hi))
        .collect::<Result<Vec<_>>>()?;
    x.push(input_vars);

    for (idx, (layer, bounds)) in inclusion.params().iter().zip(inclusion.layers()).enumerate() {
        let i = idx + 1;
        let mut x_i = Vec::with_capacity(bounds.width());
        let mut z_i = Vec::with_capacity(bounds.width());
        let mut r_i = Vec::new();

        for k in 0..bounds.width() {
            let theta = bounds.theta[k];
            x_i.push(
                lp.add_var(format!("x_{i}_{k}"), theta.lo, theta.hi)
                    .map_err(|e| e.in_layer(idx))?,
            );
            z_i.push(lp.add_free_var(format!("z_{i}_{k}")));
        }

        // z[i,k] - W[i] x[i-1] = b[i]
        for (k, (row, &b)) in layer.weight().outer_iter().zip(layer.bias().iter()).enumerate() {
            let mut expr = LinearExpr::var(z_i[k]);
            for (j, &w) in row.iter().enumerate() {
                expr.add_term(x[idx][j], -w);
            }
            lp.add_constraint(format!("affine_{i}_{k}"), expr, ConstraintSense::Eq, b)?;
        }

        // x - f'(xi) z  (+ the constant f'(xi) xi - f(xi) moved to the rhs)
        for k in 0..bounds.width() {
            let xi = bounds.xi[k];
            let slope = activation.deriv(xi);
            let offset = activation.eval(xi) - slope * xi;
            let residual = bounds.r[k];
            let linearized = LinearExpr::var(x_i[k]).term(z_i[k], -slope);

            if formulation.exposes_residuals() {
                let r_var = lp
                    .add_var(format!("r_{i}_{k}"), residual.lo, residual.hi)
                    .map_err(|e| e.in_layer(idx))?;
                r_i.push(r_var);
                lp.add_constraint(
                    format!("taylor_{i}_{k}"),
                    linearized.term(r_var, -1.0),
                    ConstraintSense::Eq,
                    offset,
                )?;
            } else {
                lp.add_constraint(
                    format!("taylor_lo_{i}_{k}"),
                    linearized.clone(),
                    ConstraintSense::Ge,
                    offset + residual.lo,
                )?;
                lp.add_constraint(
                    format!("taylor_hi_{i}_{k}"),
                    linearized,
                    ConstraintSense::Le,
                    offset + residual.hi,
                )?;
            }
        }

        x.push(x_i);
        z.push(z_i);
        if formulation.exposes_residuals() {
            r.push(r_i);
        }
    }

    let layout = ModelLayout {
        x,
        z,
        r: formulation.exposes_residuals().then_some(r),
        t: None,
    };
    Ok((lp, layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lincert_propagate::{ActivationFunc, NNParams, UncertainInput};
    use ndarray::{arr1, arr2};

    fn custom_inclusion() -> LinearInclusion {
        LinearInclusion::new(
            UncertainInput::from_vecs(vec![6.0, 3.0, 0.0], vec![1.0, 1.0, 1.0]).unwrap(),
            ActivationFunc::Identity,
            NNParams::new(
                vec![arr1(&[0.0, 0.0])],
                vec![arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])],
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_formulation_default_and_parse() {
        assert_eq!(Formulation::default(), Formulation::AuxiliaryMaxMarginVariable);
        for f in Formulation::ALL {
            assert_eq!(f.to_string().parse::<Formulation>().unwrap(), f);
        }
        assert_eq!(
            "baseline".parse::<Formulation>().unwrap(),
            Formulation::DirectMarginPerCompetitor
        );
        assert_eq!(
            "original".parse::<Formulation>().unwrap(),
            Formulation::ResidualBakedIntoConstraint
        );
        assert!("quadratic".parse::<Formulation>().is_err());
    }

    #[test]
    fn test_variable_bounds_follow_theta() {
        let li = custom_inclusion();
        let model = build_model(&li, 0, Formulation::DirectMarginPerCompetitor).unwrap();
        let lp = &model.programs[0].program;
        let x00 = lp.variable(model.layout.x(0, 0).unwrap()).unwrap();
        assert_eq!((x00.name.as_str(), x00.lower, x00.upper), ("x_0_0", 5.0, 7.0));
        let x11 = lp.variable(model.layout.x(1, 1).unwrap()).unwrap();
        assert_eq!((x11.lower, x11.upper), (2.0, 4.0));
        assert!(lp.variable(model.layout.z(1, 0).unwrap()).unwrap().is_free());
    }

    #[test]
    fn test_auxiliary_counts() {
        // t, then per competitor: 4 row multipliers + 7 lower + 7 upper bound multipliers;
        // 9 column equalities + 1 margin row
        let model =
            build_model(&custom_inclusion(), 0, Formulation::AuxiliaryMaxMarginVariable).unwrap();
        assert_eq!(model.programs.len(), 1);
        assert_eq!(model.num_vars(), 19);
        assert_eq!(model.num_constraints(), 10);
        let robust = &model.programs[0].program;
        assert_eq!(robust.objective().sense, ObjectiveSense::Maximize);
        let t = robust.variable(model.layout.t.unwrap()).unwrap();
        assert!(t.is_free());
        assert_eq!(t.name, "t");
    }

    #[test]
    fn test_auxiliary_keeps_witness_per_competitor() {
        let model =
            build_model(&custom_inclusion(), 0, Formulation::AuxiliaryMaxMarginVariable).unwrap();
        assert_eq!(model.witnesses.len(), 1);
        assert_eq!(model.certificates.len(), 1);
        assert_eq!(model.certificates[0].competitor, 1);
        let witness = &model.witnesses[0].program;
        // 3 inputs + 2 x + 2 z + 2 r; 2 affine + 2 taylor
        assert_eq!(witness.num_vars(), 9);
        assert_eq!(witness.num_constraints(), 4);
        assert_eq!(witness.variable(model.layout.r(1, 0).unwrap()).unwrap().name, "r_1_0");
        // dual multipliers live only in the auxiliary program
        let (last_dual, _) = *model.certificates[0].bound.terms.last().unwrap();
        assert!(last_dual.index() >= witness.num_vars());
        assert!(model.programs[0].program.variable(last_dual).is_some());
        assert!(witness.variable(last_dual).is_none());
    }

    #[test]
    fn test_dual_bound_is_lower_bound_at_feasible_dual_point() {
        // min x  s.t.  x - y = 1,  x in [0, 5],  y in [2, 3]  has optimum 3
        let mut base = LinearProgram::new("base");
        let x = base.add_var("x", 0.0, 5.0).unwrap();
        let y = base.add_var("y", 2.0, 3.0).unwrap();
        base.add_constraint("tie", LinearExpr::var(x).term(y, -1.0), ConstraintSense::Eq, 1.0)
            .unwrap();
        let mut robust = LinearProgram::new("robust");
        let bound = add_dual_bound(&mut robust, &base, &LinearExpr::var(x), 0).unwrap();
        // multipliers: y_tie, lo_x, up_x, lo_y, up_y
        assert_eq!(robust.num_vars(), 5);
        assert_eq!(robust.num_constraints(), 2);
        // y_tie = 1, lo_y = 1 is dual feasible with value 1 * 1 + 2 * 1 = 3
        let point = [1.0, 0.0, 0.0, 1.0, 0.0];
        assert!(robust.is_feasible(&point, 1e-12));
        assert!((bound.eval(&point) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_direct_has_one_program_per_competitor() {
        let li = LinearInclusion::new(
            UncertainInput::from_vecs(vec![0.1, 0.2], vec![0.1, 0.1]).unwrap(),
            ActivationFunc::Sigmoid,
            NNParams::new(
                vec![arr1(&[0.0, 0.1, -0.1])],
                vec![arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]])],
            )
            .unwrap(),
        )
        .unwrap();
        let model = build_model(&li, 2, Formulation::DirectMarginPerCompetitor).unwrap();
        let competitors: Vec<_> = model.programs.iter().map(|p| p.competitor).collect();
        assert_eq!(competitors, vec![Some(0), Some(1)]);
        assert!(model.layout.t.is_none());
        assert!(model.layout.r(1, 2).is_some());
        for p in &model.programs {
            assert_eq!(p.program.objective().sense, ObjectiveSense::Minimize);
        }
    }

    #[test]
    fn test_baked_has_no_residual_variables() {
        let model =
            build_model(&custom_inclusion(), 0, Formulation::ResidualBakedIntoConstraint).unwrap();
        assert!(model.layout.r.is_none());
        // 3 inputs + 2 x + 2 z; 2 affine + 4 taylor bounds
        assert_eq!(model.num_vars(), 7);
        assert_eq!(model.num_constraints(), 6);
        assert!(model.programs[0]
            .program
            .variables()
            .iter()
            .all(|v| !v.name.starts_with("r_")));
    }

    #[test]
    fn test_single_output_rejected() {
        let li = LinearInclusion::new(
            UncertainInput::default(),
            ActivationFunc::Identity,
            NNParams::new(vec![arr1(&[0.0])], vec![arr2(&[[1.0, 1.0]])]).unwrap(),
        )
        .unwrap();
        let err = build_model(&li, 0, Formulation::default()).unwrap_err();
        assert!(matches!(err, LincertError::InvalidParams(_)));
    }

    #[test]
    fn test_label_out_of_range_rejected() {
        let err = build_model(&custom_inclusion(), 2, Formulation::default()).unwrap_err();
        assert!(matches!(err, LincertError::InvalidInput(_)));
    }

    #[test]
    fn test_layout_lookup_out_of_range() {
        let model = build_model(&custom_inclusion(), 0, Formulation::default()).unwrap();
        assert!(model.layout.x(2, 0).is_none());
        assert!(model.layout.z(0, 0).is_none());
        assert!(model.layout.r(1, 5).is_none());
    }
}

//! Solver backends.
//!
//! [`LpBackend`] is the seam between model building and an external LP
//! solver. [`MicroLpBackend`] drives the pure-Rust `microlp` simplex solver
//! through `good_lp`.

use crate::model::{ConstraintSense, LinearExpr, LinearProgram, ObjectiveSense};
use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel,
};
use lincert_core::{LincertError, Result};
use std::time::Instant;
use tracing::{debug, trace};

/// Primal solution of an optimal LP.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    /// Assignment indexed by [`crate::VarId::index`].
    pub values: Vec<f64>,
    /// Objective value at `values`.
    pub objective: f64,
}

/// Terminal outcome reported by a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    Optimal(LpSolution),
    Infeasible,
    Unbounded,
}

/// A linear-programming solver.
///
/// Solver-internal failures are reported as `Err(LincertError::Solver)`.
pub trait LpBackend: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, program: &LinearProgram) -> Result<LpOutcome>;
}

/// `good_lp` with the `microlp` solver. No time limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLpBackend;

impl LpBackend for MicroLpBackend {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(&self, program: &LinearProgram) -> Result<LpOutcome> {
        let start = Instant::now();
        let mut vars = ProblemVariables::new();
        let handles: Vec<good_lp::Variable> = program
            .variables()
            .iter()
            .map(|v| {
                let mut def = variable().name(v.name.clone());
                if v.lower.is_finite() {
                    def = def.min(v.lower);
                }
                if v.upper.is_finite() {
                    def = def.max(v.upper);
                }
                vars.add(def)
            })
            .collect();

        let to_expression = |expr: &LinearExpr| -> Expression {
            let mut e = Expression::with_capacity(expr.terms.len());
            for (var, coef) in &expr.terms {
                e.add_mul(*coef, handles[var.index()]);
            }
            e += expr.constant;
            e
        };

        let objective = to_expression(&program.objective().expr);
        let unsolved = match program.objective().sense {
            ObjectiveSense::Minimize => vars.minimise(objective),
            ObjectiveSense::Maximize => vars.maximise(objective),
        };
        let mut model = unsolved.using(microlp);
        for c in program.constraints() {
            let lhs = to_expression(&c.expr);
            let built = match c.sense {
                ConstraintSense::Le => constraint::leq(lhs, c.rhs),
                ConstraintSense::Ge => constraint::geq(lhs, c.rhs),
                ConstraintSense::Eq => constraint::eq(lhs, c.rhs),
            };
            model = model.with(built);
        }
        trace!(
            vars = program.num_vars(),
            constraints = program.num_constraints(),
            "microlp model assembled"
        );

        let outcome = match model.solve() {
            Ok(solution) => {
                let values: Vec<f64> = handles.iter().map(|&h| solution.value(h)).collect();
                let objective = program.objective().expr.eval(&values);
                LpOutcome::Optimal(LpSolution { values, objective })
            }
            Err(ResolutionError::Infeasible) => LpOutcome::Infeasible,
            Err(ResolutionError::Unbounded) => LpOutcome::Unbounded,
            Err(other) => return Err(LincertError::Solver(other.to_string())),
        };
        debug!(
            program = program.name(),
            outcome = outcome_label(&outcome),
            elapsed_us = start.elapsed().as_micros() as u64,
            "microlp finished"
        );
        Ok(outcome)
    }
}

fn outcome_label(outcome: &LpOutcome) -> &'static str {
    match outcome {
        LpOutcome::Optimal(_) => "optimal",
        LpOutcome::Infeasible => "infeasible",
        LpOutcome::Unbounded => "unbounded",
    }
}

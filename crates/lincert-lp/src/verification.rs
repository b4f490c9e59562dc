//! Robustness verification: build, solve once, read back.

use crate::backend::{LpBackend, LpOutcome, MicroLpBackend};
use crate::builder::{build_model, Formulation, RobustnessModel};
use crate::model::{LinearProgram, VarId};
use lincert_core::{LincertError, Result};
use lincert_propagate::{LinearInclusion, PropagationConfig};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for robustness verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Objective and residual wiring.
    pub formulation: Formulation,
    /// Propagation settings used when the verifier builds the inclusion itself.
    pub propagation: PropagationConfig,
}

/// Terminal status of a solved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal { value: f64 },
    Infeasible,
    SolverError { message: String },
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal { .. })
    }
}

/// What the solved model says about robustness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Non-negative margin: the label dominates under every admissible input.
    Robust { margin: f64 },
    /// Negative margin. The relaxation over-approximates, so this is not a
    /// proof of non-robustness.
    Inconclusive { margin: f64 },
    Infeasible,
    SolverError { message: String },
}

impl Verdict {
    pub fn from_status(status: &SolveStatus) -> Self {
        match status {
            SolveStatus::Optimal { value } if *value >= 0.0 => Verdict::Robust { margin: *value },
            SolveStatus::Optimal { value } => Verdict::Inconclusive { margin: *value },
            SolveStatus::Infeasible => Verdict::Infeasible,
            SolveStatus::SolverError { message } => Verdict::SolverError {
                message: message.clone(),
            },
        }
    }

    pub fn is_robust(&self) -> bool {
        matches!(self, Verdict::Robust { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Robust { margin } => write!(f, "robust (margin {margin})"),
            Verdict::Inconclusive { margin } => write!(f, "inconclusive (margin {margin})"),
            Verdict::Infeasible => f.write_str("infeasible"),
            Verdict::SolverError { message } => write!(f, "solver error: {message}"),
        }
    }
}

/// Lifecycle of a verification model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    Built,
    Solved(SolveStatus),
}

/// Relative tolerance for a witness to count as attaining the margin.
const WITNESS_TOL: f64 = 1e-6;

#[derive(Debug, Clone)]
struct OptimalSolution {
    values: Vec<f64>,
    objective: f64,
    competitor: Option<usize>,
}

/// Robustness query for one linear inclusion.
///
/// The model is built on construction and may be solved exactly once.
/// Read-back is only valid after an optimal solve.
#[derive(Debug)]
pub struct RobustnessVerification<'a> {
    inclusion: &'a LinearInclusion,
    model: RobustnessModel,
    state: ModelState,
    solution: Option<OptimalSolution>,
}

impl<'a> RobustnessVerification<'a> {
    /// Build with the label of the nominal input.
    pub fn new(inclusion: &'a LinearInclusion, formulation: Formulation) -> Result<Self> {
        let label = inclusion.label()?;
        Self::with_label(inclusion, label, formulation)
    }

    pub fn with_label(
        inclusion: &'a LinearInclusion,
        label: usize,
        formulation: Formulation,
    ) -> Result<Self> {
        let start = Instant::now();
        let model = build_model(inclusion, label, formulation)?;
        info!(
            %formulation,
            label,
            programs = model.programs.len(),
            vars = model.num_vars(),
            constraints = model.num_constraints(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Robustness model built"
        );
        Ok(Self {
            inclusion,
            model,
            state: ModelState::Built,
            solution: None,
        })
    }

    pub fn inclusion(&self) -> &LinearInclusion {
        self.inclusion
    }

    pub fn label(&self) -> usize {
        self.model.label
    }

    pub fn formulation(&self) -> Formulation {
        self.model.formulation
    }

    pub fn model(&self) -> &RobustnessModel {
        &self.model
    }

    pub fn programs(&self) -> impl Iterator<Item = &LinearProgram> {
        self.model.programs.iter().map(|p| &p.program)
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Status once solved.
    pub fn status(&self) -> Option<&SolveStatus> {
        match &self.state {
            ModelState::Built => None,
            ModelState::Solved(status) => Some(status),
        }
    }

    /// Solve with the default `microlp` backend.
    pub fn solve(&mut self) -> Result<&SolveStatus> {
        self.solve_with(&MicroLpBackend)
    }

    /// Solve the model with `backend`.
    ///
    /// Per-competitor formulations solve every program and keep the
    /// smallest margin. The auxiliary formulation solves its single program
    /// for the margin, then the witness program of a binding competitor for
    /// the point that read-back reports.
    ///
    /// Infeasibility and solver failures end up in the returned status; only
    /// solving a model twice is an error.
    pub fn solve_with(&mut self, backend: &dyn LpBackend) -> Result<&SolveStatus> {
        if self.state != ModelState::Built {
            return Err(LincertError::InvalidState(
                "model has already been solved".to_string(),
            ));
        }

        let start = Instant::now();
        let (best, status) = if self.formulation().per_competitor() {
            solve_per_competitor(&self.model, backend)
        } else {
            solve_auxiliary(&self.model, backend)
        };

        match &status {
            SolveStatus::Optimal { value } => info!(
                backend = backend.name(),
                objective = value,
                elapsed_us = start.elapsed().as_micros() as u64,
                "Robustness model solved"
            ),
            other => warn!(
                backend = backend.name(),
                status = ?other,
                elapsed_us = start.elapsed().as_micros() as u64,
                "Robustness model has no optimal solution"
            ),
        }

        self.solution = best;
        self.state = ModelState::Solved(status);
        match &self.state {
            ModelState::Solved(status) => Ok(status),
            ModelState::Built => Err(LincertError::InvalidState(
                "model state was not updated".to_string(),
            )),
        }
    }

    fn optimal(&self) -> Result<&OptimalSolution> {
        match (&self.state, &self.solution) {
            (ModelState::Solved(SolveStatus::Optimal { .. }), Some(sol)) => Ok(sol),
            (ModelState::Built, _) => Err(LincertError::InvalidState(
                "model has not been solved".to_string(),
            )),
            (ModelState::Solved(status), _) => Err(LincertError::InvalidState(format!(
                "no optimal solution available ({status:?})"
            ))),
        }
    }

    fn value_of(&self, var: Option<VarId>, what: &str) -> Result<f64> {
        let sol = self.optimal()?;
        var.and_then(|v| sol.values.get(v.index()).copied())
            .ok_or_else(|| LincertError::InvalidInput(format!("no variable {what}")))
    }

    /// Optimal margin: the minimum over competitors for per-competitor
    /// formulations, the optimal `t` otherwise.
    pub fn objective_value(&self) -> Result<f64> {
        Ok(self.optimal()?.objective)
    }

    /// Value of `x[i,k]`, `i = 0..=L`.
    pub fn x_value(&self, i: usize, k: usize) -> Result<f64> {
        self.value_of(self.model.layout.x(i, k), &format!("x_{i}_{k}"))
    }

    /// Value of `z[i,k]`, `i = 1..=L`.
    pub fn z_value(&self, i: usize, k: usize) -> Result<f64> {
        self.value_of(self.model.layout.z(i, k), &format!("z_{i}_{k}"))
    }

    /// Value of the residual variable `r[i,k]`; only for formulations that
    /// expose residuals.
    pub fn residual_value(&self, i: usize, k: usize) -> Result<f64> {
        if !self.formulation().exposes_residuals() {
            return Err(LincertError::InvalidState(format!(
                "the {} formulation has no residual variables",
                self.formulation()
            )));
        }
        self.value_of(self.model.layout.r(i, k), &format!("r_{i}_{k}"))
    }

    /// Competitor attaining the minimum margin.
    pub fn worst_competitor(&self) -> Result<Option<usize>> {
        Ok(self.optimal()?.competitor)
    }

    /// Verdict of the solved model.
    pub fn verdict(&self) -> Result<Verdict> {
        self.status()
            .map(Verdict::from_status)
            .ok_or_else(|| LincertError::InvalidState("model has not been solved".to_string()))
    }

    /// Text listing of every `x` assignment, then every residual's bounds
    /// (and value when residuals are variables).
    pub fn visualize_solution(&self) -> Result<String> {
        let sol = self.optimal()?;
        let layout = &self.model.layout;
        let value = |var: &VarId| sol.values.get(var.index()).copied().unwrap_or(f64::NAN);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "objective: {} (label {}, {} formulation)",
            sol.objective,
            self.label(),
            self.formulation()
        );
        if let Some(k) = sol.competitor {
            let _ = writeln!(out, "worst competitor: {k}");
        }
        for (i, layer) in layout.x.iter().enumerate() {
            for (k, var) in layer.iter().enumerate() {
                let _ = writeln!(out, "x_{i}_{k} = {}", value(var));
            }
        }
        for (idx, bounds) in self.inclusion.layers().iter().enumerate() {
            let i = idx + 1;
            for (k, r) in bounds.r.iter().enumerate() {
                match layout.r(i, k) {
                    Some(var) => {
                        let _ = writeln!(
                            out,
                            "r_{i}_{k}: lower = {}, upper = {}, value = {}",
                            r.lo,
                            r.hi,
                            value(&var)
                        );
                    }
                    None => {
                        let _ = writeln!(out, "r_{i}_{k}: lower = {}, upper = {}", r.lo, r.hi);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Render every program in LP format.
    pub fn to_lp_format(&self) -> Vec<(Option<usize>, String)> {
        self.model
            .programs
            .iter()
            .map(|p| (p.competitor, p.program.to_lp_format()))
            .collect()
    }

    /// Write the model as LP files. A single program goes to `path`;
    /// per-competitor programs go to `<stem>_vs_<k>.<ext>` next to it.
    pub fn write_lp_files(&self, path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let path = path.as_ref();
        let mut written = Vec::with_capacity(self.model.programs.len());
        if let [single] = self.model.programs.as_slice() {
            single.program.write_lp_file(path)?;
            written.push(path.to_path_buf());
            return Ok(written);
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lp".to_string());
        for p in &self.model.programs {
            let suffix = p.competitor.map_or_else(String::new, |k| format!("_vs_{k}"));
            let target = path.with_file_name(format!("{stem}{suffix}.{ext}"));
            p.program.write_lp_file(&target)?;
            written.push(target);
        }
        Ok(written)
    }
}

/// Failure of one backend call, folded into a terminal status.
fn failure_status(outcome: Result<LpOutcome>, backend: &dyn LpBackend) -> SolveStatus {
    match outcome {
        Ok(LpOutcome::Infeasible) => SolveStatus::Infeasible,
        Ok(LpOutcome::Unbounded) => SolveStatus::SolverError {
            message: format!("{} reported an unbounded objective", backend.name()),
        },
        Ok(LpOutcome::Optimal(_)) => SolveStatus::SolverError {
            message: "unexpected optimal outcome".to_string(),
        },
        Err(e) => SolveStatus::SolverError {
            message: e.to_string(),
        },
    }
}

fn finish(best: Option<OptimalSolution>) -> (Option<OptimalSolution>, SolveStatus) {
    match best {
        Some(sol) => {
            let status = SolveStatus::Optimal {
                value: sol.objective,
            };
            (Some(sol), status)
        }
        None => (
            None,
            SolveStatus::SolverError {
                message: "model has no programs".to_string(),
            },
        ),
    }
}

/// Minimum over the per-competitor programs; the first failure stops.
fn solve_per_competitor(
    model: &RobustnessModel,
    backend: &dyn LpBackend,
) -> (Option<OptimalSolution>, SolveStatus) {
    let mut best: Option<OptimalSolution> = None;
    for margin_program in &model.programs {
        match backend.solve(&margin_program.program) {
            Ok(LpOutcome::Optimal(sol)) => {
                debug!(
                    competitor = ?margin_program.competitor,
                    objective = sol.objective,
                    "Program solved"
                );
                if best.as_ref().map_or(true, |b| sol.objective < b.objective) {
                    best = Some(OptimalSolution {
                        values: sol.values,
                        objective: sol.objective,
                        competitor: margin_program.competitor,
                    });
                }
            }
            other => return (None, failure_status(other, backend)),
        }
    }
    finish(best)
}

/// Solve the auxiliary program, then recover an optimal point from the
/// witness program of a binding competitor.
fn solve_auxiliary(
    model: &RobustnessModel,
    backend: &dyn LpBackend,
) -> (Option<OptimalSolution>, SolveStatus) {
    let Some(robust) = model.programs.first() else {
        return finish(None);
    };
    let margin = match backend.solve(&robust.program) {
        Ok(LpOutcome::Optimal(sol)) => sol,
        // a dual without finite optimum means the relaxation admits no point
        Ok(LpOutcome::Unbounded) | Ok(LpOutcome::Infeasible) => {
            return (None, SolveStatus::Infeasible)
        }
        other => return (None, failure_status(other, backend)),
    };
    debug!(objective = margin.objective, "Auxiliary program solved");

    // Competitors whose dual bound sits at `t` are binding candidates.
    let mut order: Vec<(f64, usize)> = model
        .certificates
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.bound.eval(&margin.values), idx))
        .collect();
    order.sort_by(|a, b| a.0.total_cmp(&b.0));

    let tol = WITNESS_TOL * margin.objective.abs().max(1.0);
    let mut best: Option<OptimalSolution> = None;
    for (_, idx) in order {
        let Some(witness) = model.witnesses.get(idx) else {
            continue;
        };
        match backend.solve(&witness.program) {
            Ok(LpOutcome::Optimal(sol)) => {
                let attained = sol.objective <= margin.objective + tol;
                if best.as_ref().map_or(true, |b| sol.objective < b.objective) {
                    best = Some(OptimalSolution {
                        values: sol.values,
                        objective: sol.objective,
                        competitor: witness.competitor,
                    });
                }
                if attained {
                    break;
                }
            }
            other => return (None, failure_status(other, backend)),
        }
    }

    match best {
        Some(mut sol) => {
            if (sol.objective - margin.objective).abs() > tol {
                warn!(
                    margin = margin.objective,
                    witness = sol.objective,
                    "Witness does not attain the certified margin"
                );
            }
            sol.objective = margin.objective;
            finish(Some(sol))
        }
        None => finish(None),
    }
}

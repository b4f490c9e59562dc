//! Solver-agnostic linear program.
//!
//! The builder emits a [`LinearProgram`] of named, bounded continuous
//! variables, linear constraints and one objective. A backend translates it
//! into a concrete solver's model; [`LinearProgram::to_lp_format`] renders it
//! as CPLEX LP text for inspection or for external solvers.

use lincert_core::{LincertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Handle to a variable of one [`LinearProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A continuous decision variable; infinite bounds mean unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

impl Variable {
    pub fn is_free(&self) -> bool {
        self.lower == f64::NEG_INFINITY && self.upper == f64::INFINITY
    }
}

/// `sum(coef * var) + constant`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn var(var: VarId) -> Self {
        Self::new().term(var, 1.0)
    }

    /// Builder-style term addition.
    #[must_use]
    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.add_term(var, coef);
        self
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Evaluate at a full assignment indexed by [`VarId::index`].
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values[v.index()])
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintSense {
    Le,
    Ge,
    Eq,
}

impl ConstraintSense {
    fn lp_symbol(self) -> &'static str {
        match self {
            ConstraintSense::Le => "<=",
            ConstraintSense::Ge => ">=",
            ConstraintSense::Eq => "=",
        }
    }
}

/// `expr (<=|>=|=) rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub sense: ConstraintSense,
    pub rhs: f64,
}

impl Constraint {
    /// Whether an assignment satisfies the constraint up to `tol`.
    pub fn is_satisfied(&self, values: &[f64], tol: f64) -> bool {
        let lhs = self.expr.eval(values);
        match self.sense {
            ConstraintSense::Le => lhs <= self.rhs + tol,
            ConstraintSense::Ge => lhs >= self.rhs - tol,
            ConstraintSense::Eq => (lhs - self.rhs).abs() <= tol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveSense {
    #[default]
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub sense: ObjectiveSense,
    pub expr: LinearExpr,
}

/// A linear program over continuous variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearProgram {
    name: String,
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: Objective,
}

impl LinearProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a variable with bounds `[lower, upper]`.
    pub fn add_var(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> Result<VarId> {
        let name = name.into();
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(LincertError::InvalidInput(format!(
                "variable {name} has invalid bounds [{lower}, {upper}]"
            )));
        }
        self.variables.push(Variable { name, lower, upper });
        Ok(VarId(self.variables.len() - 1))
    }

    pub fn add_free_var(&mut self, name: impl Into<String>) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        sense: ConstraintSense,
        rhs: f64,
    ) -> Result<()> {
        let name = name.into();
        if let Some((v, _)) = expr.terms.iter().find(|(v, _)| v.index() >= self.variables.len()) {
            return Err(LincertError::InvalidInput(format!(
                "constraint {name} references unknown variable {}",
                v.index()
            )));
        }
        if !rhs.is_finite() || !expr.constant.is_finite() {
            return Err(LincertError::InvalidInput(format!(
                "constraint {name} has a non-finite right-hand side"
            )));
        }
        self.constraints.push(Constraint {
            name,
            expr,
            sense,
            rhs,
        });
        Ok(())
    }

    pub fn set_objective(&mut self, sense: ObjectiveSense, expr: LinearExpr) {
        self.objective = Objective { sense, expr };
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// `None` if `id` does not belong to this program.
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Check bounds and constraints of an assignment.
    pub fn is_feasible(&self, values: &[f64], tol: f64) -> bool {
        values.len() == self.variables.len()
            && self
                .variables
                .iter()
                .zip(values)
                .all(|(v, &x)| x >= v.lower - tol && x <= v.upper + tol)
            && self.constraints.iter().all(|c| c.is_satisfied(values, tol))
    }

    /// Render in CPLEX LP format.
    pub fn to_lp_format(&self) -> String {
        let mut out = String::new();
        if !self.name.is_empty() {
            let _ = writeln!(out, "\\ {}", self.name);
        }
        out.push_str(match self.objective.sense {
            ObjectiveSense::Minimize => "Minimize\n",
            ObjectiveSense::Maximize => "Maximize\n",
        });
        let _ = writeln!(
            out,
            " obj: {}",
            self.render_terms(&self.objective.expr, true)
        );

        out.push_str("Subject To\n");
        for c in &self.constraints {
            let rhs = c.rhs - c.expr.constant;
            let _ = writeln!(
                out,
                " {}: {} {} {}",
                c.name,
                self.render_terms(&c.expr, false),
                c.sense.lp_symbol(),
                fmt_num(rhs)
            );
        }

        out.push_str("Bounds\n");
        for v in &self.variables {
            let line = match (v.lower.is_finite(), v.upper.is_finite()) {
                (false, false) => format!(" {} free", v.name),
                (true, true) if v.lower == v.upper => format!(" {} = {}", v.name, fmt_num(v.lower)),
                (true, true) => format!(
                    " {} <= {} <= {}",
                    fmt_num(v.lower),
                    v.name,
                    fmt_num(v.upper)
                ),
                (true, false) => format!(" {} >= {}", v.name, fmt_num(v.lower)),
                (false, true) => format!(" -inf <= {} <= {}", v.name, fmt_num(v.upper)),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str("End\n");
        out
    }

    pub fn write_lp_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_lp_format())?;
        Ok(())
    }

    fn render_terms(&self, expr: &LinearExpr, with_constant: bool) -> String {
        let mut out = String::new();
        for (i, (var, coef)) in expr.terms.iter().enumerate() {
            let name = &self.variables[var.index()].name;
            let sign = if *coef < 0.0 { "-" } else { "+" };
            if i == 0 && sign == "+" {
                let _ = write!(out, "{} {}", fmt_num(*coef), name);
            } else {
                let sep = if i == 0 { "" } else { " " };
                let _ = write!(out, "{sep}{sign} {} {}", fmt_num(coef.abs()), name);
            }
        }
        if with_constant && expr.constant != 0.0 {
            let sign = if expr.constant < 0.0 { "-" } else { "+" };
            let _ = write!(out, " {sign} {}", fmt_num(expr.constant.abs()));
        }
        if out.is_empty() {
            out.push('0');
        }
        out
    }
}

/// Shortest representation that parses back to the same `f64`.
fn fmt_num(x: f64) -> String {
    format!("{x:?}")
}

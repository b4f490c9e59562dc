//! Linear-program encoding of linear inclusions.
//!
//! A [`RobustnessVerification`] turns a [`lincert_propagate::LinearInclusion`]
//! and its label into one or more linear programs whose optimum is the
//! robustness margin under the relaxation, solves them through an
//! [`LpBackend`], and exposes the solution.
//!
//! Three [`Formulation`]s are available:
//! - `DirectMarginPerCompetitor`: one program per competing output,
//! - `AuxiliaryMaxMarginVariable`: a single program maximizing a margin variable
//!   that every admissible point must respect, certified through LP duality,
//! - `ResidualBakedIntoConstraint`: residual bounds as constants rather than variables.

pub mod backend;
pub mod builder;
pub mod model;
pub mod sweep;
pub mod verification;

pub use backend::{LpBackend, LpOutcome, LpSolution, MicroLpBackend};
pub use builder::{
    build_model, DualCertificate, Formulation, MarginProgram, ModelLayout, RobustnessModel,
};
pub use model::{
    Constraint, ConstraintSense, LinearExpr, LinearProgram, Objective, ObjectiveSense, VarId,
    Variable,
};
pub use sweep::{
    find_solvable_instance, verify_instances_parallel, InstanceOutcome, SolvableInstance,
    SweepConfig, VerificationInstance,
};
pub use verification::{ModelState, RobustnessVerification, SolveStatus, Verdict, VerifierConfig};

pub use lincert_core::{LincertError, Result};

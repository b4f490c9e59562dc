//! Independent verification queries run in parallel.
//!
//! Each query owns its inclusion and its model, so queries share nothing
//! but the (stateless) backend.

use crate::backend::LpBackend;
use crate::verification::{RobustnessVerification, SolveStatus, Verdict, VerifierConfig};
use lincert_core::{LincertError, Result};
use lincert_propagate::{
    construct_out_features_counts, generate_weights_and_biases, suggested_out_features,
    ActivationFunc, LinearInclusion, NNParams, UncertainInput,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info, warn};

/// One self-contained verification query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationInstance {
    pub input: UncertainInput,
    #[serde(default)]
    pub activation: ActivationFunc,
    pub params: NNParams,
}

/// Result of verifying one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOutcome {
    pub label: usize,
    pub status: SolveStatus,
    pub verdict: Verdict,
    /// Competitor attaining the minimum margin.
    pub worst_competitor: Option<usize>,
}

impl VerificationInstance {
    pub fn new(input: UncertainInput, activation: ActivationFunc, params: NNParams) -> Self {
        Self {
            input,
            activation,
            params,
        }
    }

    pub fn inclusion(&self, config: &VerifierConfig) -> Result<LinearInclusion> {
        LinearInclusion::with_config(
            self.input.clone(),
            self.activation,
            self.params.clone(),
            config.propagation,
        )
    }

    /// Propagate, build, solve.
    pub fn verify(&self, config: &VerifierConfig, backend: &dyn LpBackend) -> Result<InstanceOutcome> {
        let inclusion = self.inclusion(config)?;
        let mut verification = RobustnessVerification::new(&inclusion, config.formulation)?;
        let status = verification.solve_with(backend)?.clone();
        let worst_competitor = if status.is_optimal() {
            verification.worst_competitor()?
        } else {
            None
        };
        Ok(InstanceOutcome {
            label: verification.label(),
            verdict: Verdict::from_status(&status),
            status,
            worst_competitor,
        })
    }
}

/// Verify every instance on the rayon pool; results keep input order.
pub fn verify_instances_parallel(
    instances: &[VerificationInstance],
    config: &VerifierConfig,
    backend: &dyn LpBackend,
) -> Vec<Result<InstanceOutcome>> {
    info!(
        instances = instances.len(),
        threads = rayon::current_num_threads(),
        "Verifying instances in parallel"
    );
    instances
        .par_iter()
        .map(|instance| instance.verify(config, backend))
        .collect()
}

/// Search space of [`find_solvable_instance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Number of dense layers of the generated networks.
    pub depth: usize,
    /// Output width; `None` picks [`suggested_out_features`].
    pub out_features: Option<usize>,
    /// Seeds tried per sample, lowest first.
    pub seeds: Range<u64>,
    pub activation: ActivationFunc,
    pub verifier: VerifierConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            out_features: None,
            seeds: 0..100,
            activation: ActivationFunc::Sigmoid,
            verifier: VerifierConfig::default(),
        }
    }
}

/// First `(sample, seed)` pair whose model solves to optimality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvableInstance {
    pub sample_index: usize,
    pub seed: u64,
    pub margin: f64,
}

/// Walk `samples` in order; for each, try all seeds in parallel and return
/// the lowest seed whose generated network yields an optimal model.
pub fn find_solvable_instance(
    samples: &[UncertainInput],
    config: &SweepConfig,
    backend: &dyn LpBackend,
) -> Result<Option<SolvableInstance>> {
    for (sample_index, input) in samples.iter().enumerate() {
        let in_features = input.len();
        let out_features = config
            .out_features
            .unwrap_or_else(|| suggested_out_features(in_features, config.depth));
        if out_features < 2 {
            return Err(LincertError::InvalidParams(format!(
                "sweep needs at least two outputs, got {out_features}"
            )));
        }
        let widths = construct_out_features_counts(in_features, out_features, config.depth)?;
        debug!(sample_index, ?widths, "Sweeping seeds");

        let found = config.seeds.clone().into_par_iter().find_map_first(|seed| {
            match try_seed(input, &widths, seed, config, backend) {
                Ok(Some(margin)) => Some((seed, margin)),
                Ok(None) => None,
                Err(e) => {
                    warn!(sample_index, seed, error = %e, "Seed failed");
                    None
                }
            }
        });

        if let Some((seed, margin)) = found {
            info!(sample_index, seed, margin, "Found solvable instance");
            return Ok(Some(SolvableInstance {
                sample_index,
                seed,
                margin,
            }));
        }
    }
    Ok(None)
}

fn try_seed(
    input: &UncertainInput,
    widths: &[usize],
    seed: u64,
    config: &SweepConfig,
    backend: &dyn LpBackend,
) -> Result<Option<f64>> {
    let params = generate_weights_and_biases(input.len(), widths, Some(seed))?;
    let instance = VerificationInstance::new(input.clone(), config.activation, params);
    let outcome = instance.verify(&config.verifier, backend)?;
    Ok(match outcome.status {
        SolveStatus::Optimal { value } => Some(value),
        _ => None,
    })
}

//! JSON instance files.
//!
//! An instance names the uncertain input, the activation and the network,
//! either as literal layers or as a generator recipe:
//!
//! ```json
//! {
//!   "values": [1.0, 0.5],
//!   "uncertainties": [0.2, 0.1],
//!   "activation": { "kind": "sigmoid" },
//!   "params": { "biases": [[0.0, 0.0]], "weights": [[[1.0, 0.0], [0.0, 1.0]]] }
//! }
//! ```
//!
//! `"generator": { "depth": 2, "out_features": 3, "seed": 7 }` replaces `params`.

use anyhow::{bail, Context};
use lincert_lp::VerificationInstance;
use lincert_propagate::{
    construct_out_features_counts, generate_weights_and_biases, ActivationFunc, NNParams,
    UncertainInput,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Seeded network recipe; the input width comes from `values`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorRecipe {
    pub depth: usize,
    pub out_features: usize,
    pub seed: u64,
}

impl GeneratorRecipe {
    pub fn generate(&self, in_features: usize) -> anyhow::Result<NNParams> {
        let widths = construct_out_features_counts(in_features, self.out_features, self.depth)
            .with_context(|| {
                format!(
                    "cannot step {in_features} inputs down to {} outputs in {} layers",
                    self.out_features, self.depth
                )
            })?;
        Ok(generate_weights_and_biases(in_features, &widths, Some(self.seed))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceFile {
    pub values: Vec<f64>,
    pub uncertainties: Vec<f64>,
    #[serde(default)]
    pub activation: ActivationFunc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<NNParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorRecipe>,
}

impl InstanceFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read instance {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse instance {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text + "\n")
            .with_context(|| format!("failed to write instance {}", path.display()))
    }

    /// Resolve literal or generated parameters into a verification query.
    pub fn to_instance(&self) -> anyhow::Result<VerificationInstance> {
        let input = UncertainInput::from_vecs(self.values.clone(), self.uncertainties.clone())
            .context("invalid uncertain input")?;
        let params = match (&self.params, &self.generator) {
            (Some(params), None) => params.clone(),
            (None, Some(recipe)) => recipe.generate(input.len())?,
            (Some(_), Some(_)) => bail!("instance sets both `params` and `generator`"),
            (None, None) => bail!("instance needs either `params` or `generator`"),
        };
        Ok(VerificationInstance::new(input, self.activation, params))
    }
}

/// Samples of a sweep: a JSON array of `{values, uncertainties}`.
pub fn load_samples(path: &Path) -> anyhow::Result<Vec<UncertainInput>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read samples {}", path.display()))?;
    let samples: Vec<UncertainInput> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse samples {}", path.display()))?;
    if samples.is_empty() {
        bail!("{} contains no samples", path.display());
    }
    Ok(samples)
}

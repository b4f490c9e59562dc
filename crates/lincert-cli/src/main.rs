//! lincert CLI
//!
//! Certified robustness of dense networks under interval input uncertainty.
//!
//! # Commands
//!
//! - `lincert verify <instance.json>` - Propagate, build the margin LP, solve
//! - `lincert generate` - Write an instance with seeded random parameters
//! - `lincert sweep <samples.json>` - Search samples and seeds for a solvable instance
//!
//! Exit codes: 0 when the model solved (any verdict), 1 on input or IO
//! errors, 2 when the solver reports infeasibility or an internal failure.

mod instance;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use instance::{load_samples, GeneratorRecipe, InstanceFile};
use lincert_lp::{
    find_solvable_instance, Formulation, MicroLpBackend, RobustnessVerification, SolveStatus,
    SweepConfig, Verdict, VerifierConfig,
};
use lincert_propagate::{ActivationFunc, LinearizationPoint, PropagationConfig};
use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lincert")]
#[command(about = "Certify robustness of dense networks under input uncertainty")]
#[command(version)]
struct Cli {
    /// Debug logging and detailed output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify one instance file
    Verify {
        /// Instance file (JSON)
        instance: PathBuf,
        /// Margin formulation: direct, auxiliary or baked
        #[arg(short, long, default_value_t = Formulation::default())]
        formulation: Formulation,
        /// Linearization point: post or pre (activation midpoint)
        #[arg(short, long, default_value = "post")]
        linearization: LinearizationPoint,
        /// Write the model in LP format
        #[arg(long)]
        emit_lp: Option<PathBuf>,
        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write an instance with generated parameters
    Generate {
        /// Number of inputs
        #[arg(long)]
        inputs: usize,
        /// Number of dense layers
        #[arg(long, default_value = "1")]
        depth: usize,
        /// Number of outputs
        #[arg(long, default_value = "2")]
        out_features: usize,
        /// Seed of the parameter generator
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Nominal input values, comma separated (default: all zero)
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        values: Option<Vec<f64>>,
        /// Uncertainty radius applied to every input
        #[arg(long, default_value = "0.1")]
        uncertainty: f64,
        /// identity, sigmoid, tanh, quadlu or quadlu:<alpha>
        #[arg(short, long, default_value = "sigmoid")]
        activation: ActivationFunc,
        /// Keep the generator recipe instead of writing literal layers
        #[arg(long)]
        recipe: bool,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Find the first sample and seed whose generated network solves to optimality
    Sweep {
        /// Samples file: JSON array of {values, uncertainties}
        samples: PathBuf,
        /// Number of dense layers
        #[arg(long, default_value = "1")]
        depth: usize,
        /// Seed range, `<from>..<to>`
        #[arg(long, default_value = "0..100", value_parser = parse_seed_range)]
        seeds: Range<u64>,
        /// Number of outputs (default: derived from the input width and depth)
        #[arg(long)]
        out_features: Option<usize>,
        #[arg(short, long, default_value = "sigmoid")]
        activation: ActivationFunc,
        #[arg(short, long, default_value_t = Formulation::default())]
        formulation: Formulation,
        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },
}

fn parse_seed_range(s: &str) -> Result<Range<u64>, String> {
    let (from, to) = s
        .split_once("..")
        .ok_or_else(|| format!("expected <from>..<to>, got '{s}'"))?;
    let from: u64 = from
        .trim()
        .parse()
        .map_err(|e| format!("invalid seed '{from}': {e}"))?;
    let to: u64 = to
        .trim()
        .parse()
        .map_err(|e| format!("invalid seed '{to}': {e}"))?;
    if from >= to {
        return Err(format!("empty seed range {from}..{to}"));
    }
    Ok(from..to)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Serialize)]
struct VerifyReport {
    instance: PathBuf,
    label: usize,
    formulation: Formulation,
    linearization: LinearizationPoint,
    status: SolveStatus,
    verdict: Verdict,
    worst_competitor: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    lp_files: Vec<PathBuf>,
    elapsed_ms: f64,
}

const EXIT_SOLVED: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_UNSOLVED: u8 = 2;

fn exit_code_for(status: &SolveStatus) -> u8 {
    if status.is_optimal() {
        EXIT_SOLVED
    } else {
        EXIT_UNSOLVED
    }
}

fn verify_file(
    path: &Path,
    formulation: Formulation,
    linearization: LinearizationPoint,
    emit_lp: Option<&Path>,
    json: bool,
    verbose: bool,
) -> anyhow::Result<u8> {
    let start = Instant::now();
    info!(instance = %path.display(), %formulation, "verifying");
    let instance = InstanceFile::load(path)?.to_instance()?;
    let config = VerifierConfig {
        formulation,
        propagation: PropagationConfig { linearization },
    };
    let inclusion = instance
        .inclusion(&config)
        .context("failed to propagate the input box")?;
    let mut verification = RobustnessVerification::new(&inclusion, formulation)
        .context("failed to build the robustness model")?;

    let lp_files = match emit_lp {
        Some(target) => verification
            .write_lp_files(target)
            .with_context(|| format!("failed to write {}", target.display()))?,
        None => Vec::new(),
    };

    let status = verification.solve()?.clone();
    let worst_competitor = if status.is_optimal() {
        verification.worst_competitor()?
    } else {
        None
    };
    let verdict = Verdict::from_status(&status);
    if !status.is_optimal() {
        warn!(?status, "model did not solve to optimality");
    }

    if json {
        let report = VerifyReport {
            instance: path.to_path_buf(),
            label: verification.label(),
            formulation,
            linearization,
            status: status.clone(),
            verdict,
            worst_competitor,
            lp_files,
            elapsed_ms: start.elapsed().as_secs_f64() * 1e3,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("label: {}", verification.label());
        if let SolveStatus::Optimal { value } = &status {
            println!("objective: {value}");
        }
        println!("verdict: {verdict}");
        for file in &lp_files {
            println!("wrote {}", file.display());
        }
        if verbose && status.is_optimal() {
            print!("{}", verification.visualize_solution()?);
        }
    }
    Ok(exit_code_for(&status))
}

#[allow(clippy::too_many_arguments)]
fn generate_instance(
    inputs: usize,
    depth: usize,
    out_features: usize,
    seed: u64,
    values: Option<Vec<f64>>,
    uncertainty: f64,
    activation: ActivationFunc,
    recipe: bool,
    output: Option<&Path>,
) -> anyhow::Result<u8> {
    if inputs == 0 {
        bail!("--inputs must be positive");
    }
    let values = values.unwrap_or_else(|| vec![0.0; inputs]);
    if values.len() != inputs {
        bail!("--values has {} entries, expected {inputs}", values.len());
    }
    let generator = GeneratorRecipe {
        depth,
        out_features,
        seed,
    };
    let (params, generator) = if recipe {
        generator.generate(inputs)?;
        (None, Some(generator))
    } else {
        (Some(generator.generate(inputs)?), None)
    };
    let file = InstanceFile {
        values,
        uncertainties: vec![uncertainty; inputs],
        activation,
        params,
        generator,
    };
    file.to_instance()?;

    match output {
        Some(path) => {
            file.save(path)?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&file)?),
    }
    Ok(EXIT_SOLVED)
}

fn sweep_samples(path: &Path, config: &SweepConfig, json: bool) -> anyhow::Result<u8> {
    let samples = load_samples(path)?;
    info!(
        samples = samples.len(),
        seeds = ?config.seeds,
        depth = config.depth,
        "sweeping"
    );
    let found = find_solvable_instance(&samples, config, &MicroLpBackend)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        match &found {
            Some(hit) => println!(
                "sample {} seed {}: margin {}",
                hit.sample_index, hit.seed, hit.margin
            ),
            None => println!(
                "no solvable instance among {} samples and seeds {}..{}",
                samples.len(),
                config.seeds.start,
                config.seeds.end
            ),
        }
    }
    Ok(if found.is_some() {
        EXIT_SOLVED
    } else {
        EXIT_UNSOLVED
    })
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Verify {
            instance,
            formulation,
            linearization,
            emit_lp,
            json,
        } => verify_file(
            &instance,
            formulation,
            linearization,
            emit_lp.as_deref(),
            json,
            cli.verbose,
        ),
        Commands::Generate {
            inputs,
            depth,
            out_features,
            seed,
            values,
            uncertainty,
            activation,
            recipe,
            output,
        } => generate_instance(
            inputs,
            depth,
            out_features,
            seed,
            values,
            uncertainty,
            activation,
            recipe,
            output.as_deref(),
        ),
        Commands::Sweep {
            samples,
            depth,
            seeds,
            out_features,
            activation,
            formulation,
            json,
        } => {
            let config = SweepConfig {
                depth,
                out_features,
                seeds,
                activation,
                verifier: VerifierConfig {
                    formulation,
                    ..VerifierConfig::default()
                },
            };
            sweep_samples(&samples, &config, json)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

//! Aircast trainer CLI
//!
//! Trains the PM2.5 random forest from raw air-quality and weather documents
//! and publishes it to the model directory, or evaluates the active version
//! against fresh data.

use aircast_core::ingest::load_raw;
use aircast_core::logging::init_logging;
use aircast_core::serialization::canonical_json_bytes;
use aircast_core::{AircastConfig, AirObservation, ArtifactStore, WeatherObservation};
use aircast_trainer::{evaluate, train_and_publish};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "aircast-train")]
#[command(author = "Aircast Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reproducible random forest trainer for PM2.5 forecasts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Inputs shared by both subcommands
#[derive(Args, Debug)]
struct Inputs {
    /// Hourly air-quality JSON document
    #[arg(long)]
    air: PathBuf,

    /// Hourly weather JSON document
    #[arg(long)]
    weather: PathBuf,

    /// Model directory, overrides configuration
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Configuration file (defaults to ./aircast.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a new model and make it the active version
    Train {
        #[command(flatten)]
        inputs: Inputs,

        /// Number of trees
        #[arg(long)]
        trees: Option<usize>,

        /// Maximum tree depth (unlimited when unset)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Seed for the split, folds and bootstrap samples
        #[arg(long)]
        seed: Option<u64>,

        /// Held-out fraction in (0, 1)
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Cross-validation folds
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Skip cross-validation
        #[arg(long, conflicts_with = "cv_folds")]
        no_cv: bool,
    },
    /// Score the active model and merge eval metrics into its metrics.json
    Evaluate {
        #[command(flatten)]
        inputs: Inputs,
    },
}

fn setup(inputs: &Inputs) -> Result<AircastConfig> {
    let mut config =
        AircastConfig::load(inputs.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &inputs.model_dir {
        config.model_dir = dir.clone();
    }
    init_logging(&config.logging, inputs.verbose)?;
    info!("Aircast trainer v{}", aircast_trainer::VERSION);
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let bytes = canonical_json_bytes(value).context("Failed to serialize output")?;
    std::io::stdout()
        .write_all(&bytes)
        .context("Failed to write output")?;
    Ok(())
}

fn load_inputs(air: &Path, weather: &Path) -> Result<(Vec<AirObservation>, Vec<WeatherObservation>)> {
    info!("Loading air quality from {}", air.display());
    info!("Loading weather from {}", weather.display());
    load_raw(air, weather).context("Failed to load raw observations")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            inputs,
            trees,
            max_depth,
            seed,
            test_fraction,
            cv_folds,
            no_cv,
        } => {
            let config = setup(&inputs)?;
            let mut params = config.training.clone();
            if let Some(trees) = trees {
                params.n_estimators = trees;
            }
            if max_depth.is_some() {
                params.max_depth = max_depth;
            }
            if let Some(seed) = seed {
                params.seed = seed;
            }
            if let Some(fraction) = test_fraction {
                params.test_fraction = fraction;
            }
            if let Some(folds) = cv_folds {
                params.cv_folds = folds;
            }
            if no_cv {
                params.cv_folds = 0;
            }

            info!("Training configuration:");
            info!("  Trees: {}", params.n_estimators);
            info!("  Max depth: {:?}", params.max_depth);
            info!(
                "  Min samples split/leaf: {}/{}",
                params.min_samples_split, params.min_samples_leaf
            );
            info!("  Test fraction: {}", params.test_fraction);
            info!("  CV folds: {}", params.cv_folds);
            info!("  Seed: {}", params.seed);

            let (air, weather) = load_inputs(&inputs.air, &inputs.weather)?;
            let store = ArtifactStore::new(&config.model_dir);
            let report = train_and_publish(&store, &air, &weather, &config.location, &params)
                .context("Training failed")?;

            info!(
                "Model {} written to {}",
                report.version,
                store.version_dir(&report.version).display()
            );
            print_json(&report)?;
        }
        Command::Evaluate { inputs } => {
            let config = setup(&inputs)?;
            let (air, weather) = load_inputs(&inputs.air, &inputs.weather)?;
            let store = ArtifactStore::new(&config.model_dir);
            let report =
                evaluate(&store, &air, &weather, &config.location).context("Evaluation failed")?;
            print_json(&report.metrics)?;
        }
    }

    Ok(())
}

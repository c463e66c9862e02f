//! Aircast trainer - reproducible random forest training for PM2.5
//!
//! Fuses raw observation series, fits the preprocessing pipeline and a seeded
//! random forest, and publishes the bundle with its metrics and metadata to a
//! versioned artifact store. Identical inputs and seed produce identical
//! bundles and metrics on every run.

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod forest;
pub mod metrics;
pub mod trainer;

use aircast_core::{
    build_dataset, AirObservation, ArtifactStore, LocationContext, ModelBundle, ModelMetadata,
    PublishedVersion, TrainingMetrics, TrainingParams, WeatherObservation,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

pub use cart::{CartBuilder, TreeConfig};
pub use dataset::{kfold, train_test_split, Dataset, FeatureStats, Samples};
pub use deterministic::{derive_seed, permutation, seeded_rng};
pub use errors::TrainerError;
pub use forest::{ForestConfig, ForestTrainer};
pub use metrics::RegressionScores;
pub use trainer::ModelTrainer;

/// Outcome of a published training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub version: String,
    pub reused: bool,
    pub metrics: TrainingMetrics,
}

/// Outcome of scoring the active bundle against fresh data
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub version: String,
    pub n_samples: usize,
    pub scores: RegressionScores,
    /// `metrics.json` after the merge.
    pub metrics: Value,
}

/// Fuse the raw series and train, without publishing anything.
pub fn train_from_observations(
    air: &[AirObservation],
    weather: &[WeatherObservation],
    location: &LocationContext,
    params: &TrainingParams,
) -> Result<(ModelBundle, TrainingMetrics), TrainerError> {
    let trainer = ModelTrainer::new(params.clone())?;
    let records = build_dataset(air, weather, location)?;
    trainer.train(&records)
}

/// Train and publish a new active version. Nothing is written unless training
/// succeeds.
pub fn train_and_publish(
    store: &ArtifactStore,
    air: &[AirObservation],
    weather: &[WeatherObservation],
    location: &LocationContext,
    params: &TrainingParams,
) -> Result<TrainingReport, TrainerError> {
    let (bundle, metrics) = train_from_observations(air, weather, location, params)?;
    let metadata = ModelMetadata::for_bundle(&bundle, params, &metrics);
    let PublishedVersion { id, reused, .. } = store.publish(&bundle, &metrics, &metadata)?;

    info!("Model version {} is active", id);
    Ok(TrainingReport {
        version: id,
        reused,
        metrics,
    })
}

/// Score the active bundle on a freshly fused table and merge `eval_*` keys
/// into its `metrics.json`. Row-level failures are returned, not degraded.
pub fn evaluate(
    store: &ArtifactStore,
    air: &[AirObservation],
    weather: &[WeatherObservation],
    location: &LocationContext,
) -> Result<EvaluationReport, TrainerError> {
    let active = store.load_active()?;
    let records = build_dataset(air, weather, location)?;
    let samples = Samples::from_records(&records);

    let predictions = trainer::predict_all(&samples, |row| active.bundle.score(row))?;
    let scores = RegressionScores::compute(&samples.targets, &predictions);
    info!(
        "Evaluated {} on {} rows: mae={:.4}, rmse={:.4}, r2={:.4}",
        active.version,
        samples.len(),
        scores.mae,
        scores.rmse,
        scores.r2
    );

    let extra = json!({
        "eval_mae": scores.mae,
        "eval_rmse": scores.rmse,
        "eval_r2": scores.r2,
        "n_samples": samples.len(),
    });
    let metrics = store.merge_metrics(&active.version, &extra)?;

    Ok(EvaluationReport {
        version: active.version,
        n_samples: samples.len(),
        scores,
        metrics,
    })
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

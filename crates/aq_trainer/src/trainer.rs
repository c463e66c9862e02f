//! Random forest pipeline trainer
//!
//! Fits the column preprocessor and the forest on a seeded train split, scores
//! the held-out rows and, when enabled, runs k-fold cross-validation over the
//! whole table with a fresh pipeline per fold.

use aircast_core::{
    ColumnTransformer, FeatureRecord, FeatureRow, ForecastError, ModelBundle, Pipeline,
    TrainingMetrics, TrainingParams,
};
use tracing::{debug, info};

use crate::cart::TreeConfig;
use crate::dataset::{kfold, train_test_split, Dataset, Samples};
use crate::errors::TrainerError;
use crate::forest::{ForestConfig, ForestTrainer};
use crate::metrics::RegressionScores;

pub struct ModelTrainer {
    params: TrainingParams,
}

impl ModelTrainer {
    pub fn new(params: TrainingParams) -> Result<Self, TrainerError> {
        params.validate().map_err(TrainerError::InvalidParams)?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_estimators: self.params.n_estimators,
            tree: TreeConfig {
                max_depth: self.params.max_depth,
                min_samples_split: self.params.min_samples_split,
                min_samples_leaf: self.params.min_samples_leaf,
            },
            bootstrap: true,
            seed: self.params.seed,
        }
    }

    /// Fit preprocessor and forest on `samples` only.
    pub fn fit_pipeline(&self, samples: &Samples) -> Result<Pipeline, TrainerError> {
        let preprocessor = ColumnTransformer::fit(&samples.rows)?;
        let dataset = Dataset::encode(samples, &preprocessor)?;

        for (name, stats) in dataset.feature_names.iter().zip(dataset.feature_stats()) {
            debug!(
                "  {}: min={:.3}, max={:.3}, mean={:.3}",
                name, stats.min, stats.max, stats.mean
            );
        }

        let forest = ForestTrainer::new(self.forest_config()).fit(&dataset)?;
        Ok(Pipeline::new(preprocessor, forest))
    }

    /// Train on a fused feature table and score the held-out split.
    pub fn train(
        &self,
        records: &[FeatureRecord],
    ) -> Result<(ModelBundle, TrainingMetrics), TrainerError> {
        if records.is_empty() {
            return Err(ForecastError::DataUnavailable("feature table is empty".to_string()).into());
        }

        let samples = Samples::from_records(records);
        let (train_idx, test_idx) =
            train_test_split(samples.len(), self.params.test_fraction, self.params.seed)?;
        let train = samples.select(&train_idx);
        let test = samples.select(&test_idx);

        info!(
            "Training on {} rows, testing on {} ({} trees, max_depth={:?}, seed={})",
            train.len(),
            test.len(),
            self.params.n_estimators,
            self.params.max_depth,
            self.params.seed
        );

        let bundle = ModelBundle::new(self.fit_pipeline(&train)?);
        let predictions = predict_all(&test, |row| bundle.score(row))?;
        let scores = RegressionScores::compute(&test.targets, &predictions);
        info!(
            "Held-out scores: mae={:.4}, rmse={:.4}, r2={:.4}",
            scores.mae, scores.rmse, scores.r2
        );

        let mut metrics = TrainingMetrics {
            mae: scores.mae,
            rmse: scores.rmse,
            r2: scores.r2,
            n_train: train.len(),
            n_test: test.len(),
            cv_folds: None,
            cv_mae_mean: None,
            cv_rmse_mean: None,
            cv_r2_mean: None,
        };

        if let Some((folds, cv)) = self.cross_validate(&samples)? {
            metrics.cv_folds = Some(folds);
            metrics.cv_mae_mean = Some(cv.mae);
            metrics.cv_rmse_mean = Some(cv.rmse);
            metrics.cv_r2_mean = Some(cv.r2);
        }

        Ok((bundle, metrics))
    }

    /// Mean fold scores, or `None` when cross-validation is disabled.
    pub fn cross_validate(
        &self,
        samples: &Samples,
    ) -> Result<Option<(usize, RegressionScores)>, TrainerError> {
        if !self.params.cross_validation_enabled() {
            debug!("Cross-validation disabled (cv_folds={})", self.params.cv_folds);
            return Ok(None);
        }

        let folds = kfold(samples.len(), self.params.cv_folds, self.params.seed)?;
        let mut fold_scores = Vec::with_capacity(folds.len());
        for (i, (train_idx, validation_idx)) in folds.iter().enumerate() {
            let train = samples.select(train_idx);
            let validation = samples.select(validation_idx);

            let pipeline = self.fit_pipeline(&train)?;
            let predictions = predict_all(&validation, |row| pipeline.predict(row))?;
            let scores = RegressionScores::compute(&validation.targets, &predictions);
            debug!(
                "Fold {}/{}: mae={:.4}, rmse={:.4}, r2={:.4}",
                i + 1,
                folds.len(),
                scores.mae,
                scores.rmse,
                scores.r2
            );
            fold_scores.push(scores);
        }

        let mean = RegressionScores::mean(&fold_scores)
            .ok_or_else(|| TrainerError::Training("cross-validation produced no folds".to_string()))?;
        info!(
            "{}-fold CV: mae={:.4}, rmse={:.4}, r2={:.4}",
            fold_scores.len(),
            mean.mae,
            mean.rmse,
            mean.r2
        );
        Ok(Some((fold_scores.len(), mean)))
    }
}

/// Score every row, failing on the first error.
pub(crate) fn predict_all(
    samples: &Samples,
    score: impl Fn(&FeatureRow) -> aircast_core::Result<f64>,
) -> Result<Vec<f64>, TrainerError> {
    samples
        .rows
        .iter()
        .map(|row| score(row).map_err(TrainerError::from))
        .collect()
}

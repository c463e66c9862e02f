//! Degradable prediction service
//!
//! `PredictionService::predict` never fails: when the configured backend cannot
//! score a row it answers with a synthetic prediction tagged
//! `model_version = "stub"` and `status = degraded`, logs the reason at `warn`,
//! and counts it.

use crate::aqi::aqi_category;
use crate::config::{AircastConfig, BackendKind};
use crate::errors::Result;
use crate::pipeline::ModelBundle;
use crate::store::ArtifactStore;
use crate::types::{
    FeatureRow, LocationContext, Prediction, PredictionStatus, WeatherSnapshot,
    STUB_MODEL_VERSION,
};
use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Something that can turn a feature row into a prediction
pub trait PredictionBackend: Send + Sync {
    fn predict(&self, row: &FeatureRow) -> Result<Prediction>;

    /// Version tag reported for this backend's predictions.
    fn model_version(&self) -> &str;

    fn name(&self) -> &'static str;
}

/// Scores rows with a loaded bundle
#[derive(Debug, Clone)]
pub struct TrainedModelBackend {
    bundle: Arc<ModelBundle>,
    version: String,
}

impl TrainedModelBackend {
    pub fn new(bundle: Arc<ModelBundle>, version: impl Into<String>) -> Self {
        Self {
            bundle,
            version: version.into(),
        }
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }
}

impl PredictionBackend for TrainedModelBackend {
    fn predict(&self, row: &FeatureRow) -> Result<Prediction> {
        self.bundle.predict(row, &self.version)
    }

    fn model_version(&self) -> &str {
        &self.version
    }

    fn name(&self) -> &'static str {
        "trained"
    }
}

/// Random estimates in a plausible band; every answer is degraded
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    reason: String,
}

impl SyntheticBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl PredictionBackend for SyntheticBackend {
    fn predict(&self, _row: &FeatureRow) -> Result<Prediction> {
        Ok(synthetic_prediction(&self.reason))
    }

    fn model_version(&self) -> &str {
        STUB_MODEL_VERSION
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

/// A synthetic prediction: AQI in [50, 250], PM2.5 in [30, 140), confidence in [0.6, 0.9].
pub fn synthetic_prediction(reason: &str) -> Prediction {
    let mut rng = rand::thread_rng();
    let aqi: u32 = rng.gen_range(50..=250);
    Prediction {
        pm25: rng.gen_range(30.0..140.0),
        aqi,
        category: aqi_category(aqi),
        confidence: rng.gen_range(0.6..=0.9),
        model_version: STUB_MODEL_VERSION.to_string(),
        status: PredictionStatus::Degraded {
            reason: reason.to_string(),
        },
    }
}

#[derive(Debug, Default)]
pub struct ServiceStats {
    served: AtomicU64,
    degraded: AtomicU64,
}

/// Point-in-time copy of [`ServiceStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub served: u64,
    pub degraded: u64,
}

impl StatsSnapshot {
    pub fn degradation_rate(&self) -> f64 {
        if self.served == 0 {
            0.0
        } else {
            self.degraded as f64 / self.served as f64
        }
    }
}

impl ServiceStats {
    fn record(&self, degraded: bool) {
        self.served.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            served: self.served.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

/// Prediction entry point shared across request handlers
pub struct PredictionService {
    backend: Box<dyn PredictionBackend>,
    stats: ServiceStats,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("backend", &self.backend.name())
            .field("model_version", &self.backend.model_version())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl PredictionService {
    pub fn with_backend(backend: Box<dyn PredictionBackend>) -> Self {
        Self {
            backend,
            stats: ServiceStats::default(),
        }
    }

    pub fn with_bundle(bundle: Arc<ModelBundle>, version: impl Into<String>) -> Self {
        Self::with_backend(Box::new(TrainedModelBackend::new(bundle, version)))
    }

    pub fn synthetic(reason: impl Into<String>) -> Self {
        Self::with_backend(Box::new(SyntheticBackend::new(reason)))
    }

    /// Build the configured backend. A trained backend that fails to load
    /// becomes a synthetic one carrying the load error as its reason.
    pub fn from_config(config: &AircastConfig) -> Self {
        match config.serving.backend {
            BackendKind::Synthetic => {
                info!("Serving with the synthetic backend (configured)");
                Self::synthetic("synthetic backend configured")
            }
            BackendKind::Trained => match ArtifactStore::new(&config.model_dir).load_active() {
                Ok(loaded) => {
                    info!("Serving model version {}", loaded.version);
                    Self::with_bundle(Arc::new(loaded.bundle), loaded.version)
                }
                Err(e) => {
                    warn!(error = %e, "Model unavailable, serving synthetic predictions");
                    Self::synthetic(e.to_string())
                }
            },
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn model_version(&self) -> &str {
        self.backend.model_version()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Score a row. Never fails; see the module docs.
    #[instrument(level = "debug", skip_all, fields(backend = self.backend.name()))]
    pub fn predict(&self, row: &FeatureRow) -> Prediction {
        let prediction = match self.backend.predict(row) {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!(error = %e, "Prediction degraded to synthetic output");
                synthetic_prediction(&e.to_string())
            }
        };
        self.stats.record(prediction.is_degraded());
        prediction
    }

    /// Counted synthetic answer for callers that could not reach `predict`.
    pub fn degraded(&self, reason: &str) -> Prediction {
        warn!(reason, "Prediction degraded to synthetic output");
        let prediction = synthetic_prediction(reason);
        self.stats.record(true);
        prediction
    }

    /// Serving row for a coordinate at a given hour.
    pub fn feature_row(
        lat: f64,
        lon: f64,
        at: NaiveDateTime,
        weather: &WeatherSnapshot,
        location: &LocationContext,
    ) -> FeatureRow {
        FeatureRow::for_point(lat, lon, at, weather, location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::pm25_to_aqi;
    use crate::forest::{Forest, Node, Tree};
    use crate::pipeline::{ColumnTransformer, Pipeline, MODEL_CONFIDENCE};
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, 5)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn row() -> FeatureRow {
        PredictionService::feature_row(
            28.61,
            77.21,
            at(9),
            &WeatherSnapshot::default(),
            &LocationContext::default(),
        )
    }

    fn constant_bundle(pm25: f64) -> Arc<ModelBundle> {
        let transformer = ColumnTransformer::fit(&[row()]).unwrap();
        let width = transformer.output_width();
        let tree = Tree::new(vec![Node::leaf(0, pm25)]);
        Arc::new(ModelBundle::new(Pipeline::new(
            transformer,
            Forest::new(width, vec![tree]),
        )))
    }

    fn assert_synthetic_ranges(p: &Prediction) {
        assert!((50..=250).contains(&p.aqi));
        assert!(p.pm25 >= 30.0 && p.pm25 < 140.0);
        assert!(p.confidence >= 0.6 && p.confidence <= 0.9);
        assert_eq!(p.category, aqi_category(p.aqi));
        assert_eq!(p.model_version, STUB_MODEL_VERSION);
    }

    #[test]
    fn synthetic_predictions_stay_in_band() {
        for _ in 0..200 {
            let p = synthetic_prediction("test");
            assert_synthetic_ranges(&p);
            assert!(p.is_degraded());
        }
    }

    #[test]
    fn no_model_directory_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let config = AircastConfig {
            model_dir: dir.path().join("missing"),
            ..AircastConfig::default()
        };
        let service = PredictionService::from_config(&config);
        assert_eq!(service.backend_name(), "synthetic");
        assert_eq!(service.model_version(), STUB_MODEL_VERSION);

        let p = service.predict(&row());
        assert_synthetic_ranges(&p);
        match &p.status {
            PredictionStatus::Degraded { reason } => assert!(reason.contains("Model not trained")),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(service.stats(), StatsSnapshot { served: 1, degraded: 1 });
    }

    #[test]
    fn configured_synthetic_backend() {
        let config = AircastConfig {
            serving: crate::config::ServingConfig {
                backend: BackendKind::Synthetic,
                ..Default::default()
            },
            ..AircastConfig::default()
        };
        let service = PredictionService::from_config(&config);
        assert_eq!(service.backend_name(), "synthetic");
        assert!(service.predict(&row()).is_degraded());
    }

    #[test]
    fn trained_backend_serves_model_predictions() {
        let service = PredictionService::with_bundle(constant_bundle(75.0), "rf_pm25_0123456789ab");
        let p = service.predict(&row());
        assert_eq!(p.status, PredictionStatus::Model);
        assert_eq!(p.pm25, 75.0);
        assert_eq!(p.aqi, pm25_to_aqi(75.0));
        assert_eq!(p.confidence, MODEL_CONFIDENCE);
        assert_eq!(p.model_version, "rf_pm25_0123456789ab");
        assert_eq!(service.stats(), StatsSnapshot { served: 1, degraded: 0 });
    }

    #[test]
    fn scoring_failure_degrades_and_is_counted() {
        let service = PredictionService::with_bundle(constant_bundle(75.0), "v1");

        let mut incomplete = row();
        incomplete.remove("pressure");
        let p = service.predict(&incomplete);
        assert!(p.is_degraded());
        assert_synthetic_ranges(&p);

        service.predict(&row());
        let stats = service.stats();
        assert_eq!(stats, StatsSnapshot { served: 2, degraded: 1 });
        assert_eq!(stats.degradation_rate(), 0.5);
    }

    #[test]
    fn service_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PredictionService>();
    }
}

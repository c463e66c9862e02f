//! Configuration assembled from an optional TOML file and the environment.
//!
//! Environment variables use the `AIRCAST_` prefix with `__` between nested
//! keys, e.g. `AIRCAST_SERVING__BACKEND=synthetic` or
//! `AIRCAST_TRAINING__N_ESTIMATORS=100`. `ML_MODEL_DIR` is honoured as a
//! fallback for `model_dir` when `AIRCAST_MODEL_DIR` is not set.

use crate::errors::{ForecastError, Result};
use crate::spatial::DEFAULT_MAX_PARALLEL;
use crate::types::{LocationContext, WeatherSnapshot};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "aircast.toml";
pub const ENV_PREFIX: &str = "AIRCAST";
/// Legacy model directory variable.
pub const LEGACY_MODEL_DIR_ENV: &str = "ML_MODEL_DIR";

/// Random forest and evaluation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub test_fraction: f64,
    /// Values below 2 disable cross-validation.
    pub cv_folds: usize,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            test_fraction: 0.2,
            cv_folds: 5,
            seed: 42,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_estimators == 0 {
            return Err("n_estimators must be at least 1".to_string());
        }
        if self.max_depth == Some(0) {
            return Err("max_depth must be at least 1 when set".to_string());
        }
        if self.min_samples_split < 2 {
            return Err("min_samples_split must be at least 2".to_string());
        }
        if self.min_samples_leaf == 0 {
            return Err("min_samples_leaf must be at least 1".to_string());
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            ));
        }
        Ok(())
    }

    pub fn cross_validation_enabled(&self) -> bool {
        self.cv_folds >= 2
    }
}

/// Which prediction backend the service is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Trained,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    pub backend: BackendKind,
    pub max_parallel_predictions: usize,
    /// Weather used for serving rows until a live feed is wired in.
    pub weather: WeatherSnapshot,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Trained,
            max_parallel_predictions: DEFAULT_MAX_PARALLEL,
            weather: WeatherSnapshot::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `compact`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AircastConfig {
    pub model_dir: PathBuf,
    pub training: TrainingParams,
    pub serving: ServingConfig,
    pub location: LocationContext,
    pub logging: LoggingConfig,
}

impl Default for AircastConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./models"),
            training: TrainingParams::default(),
            serving: ServingConfig::default(),
            location: LocationContext::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AircastConfig {
    /// Load from `path` (or `aircast.toml` if present) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: config::Map<String, String> = std::env::vars().collect();
        Self::load_with_env(path, env)
    }

    /// Load with an explicit environment map instead of the process environment.
    pub fn load_with_env(path: Option<&Path>, env: config::Map<String, String>) -> Result<Self> {
        let resolved = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ForecastError::Config(format!(
                        "configuration file {} not found",
                        path.display()
                    )));
                }
                Some(path.to_path_buf())
            }
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        let legacy_model_dir = env.get(LEGACY_MODEL_DIR_ENV).cloned();
        let has_model_dir = env.contains_key(&format!("{ENV_PREFIX}_MODEL_DIR"));

        let mut builder = Config::builder();
        if let Some(path) = &resolved {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(File::from(path.as_path()));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env)),
        );

        let mut config: AircastConfig = builder.build()?.try_deserialize()?;
        if let (Some(dir), false) = (legacy_model_dir, has_model_dir) {
            config.model_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate().map_err(ForecastError::Config)?;
        if self.serving.max_parallel_predictions == 0 {
            return Err(ForecastError::Config(
                "serving.max_parallel_predictions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

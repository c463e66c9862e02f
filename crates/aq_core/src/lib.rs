//! Aircast core: spatiotemporal PM2.5 prediction
//!
//! Turns hourly air-quality and weather series into training rows, loads the
//! published random forest bundle, and serves point, hourly and grid forecasts
//! that degrade to tagged synthetic estimates instead of failing.
//!
//! Modules:
//! - `aqi`: PM2.5 concentration to AQI index and category
//! - `ingest`: Open-Meteo style hourly documents into observation series
//! - `fusion`: nearest-hour join of air and weather series into feature rows
//! - `forest`: random forest inference structures
//! - `pipeline`: column preprocessing, fitted pipeline and model bundle
//! - `store`: versioned artifact directory with atomic publish
//! - `service`: degradable prediction service and its backends
//! - `forecast`: per-point hourly forecasts
//! - `spatial`: grid generation and bounded hyperlocal fan-out
//! - `config`: file + environment configuration
//! - `logging`: tracing subscriber setup

pub mod aqi;
pub mod config;
pub mod errors;
pub mod forecast;
pub mod forest;
pub mod fusion;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod serialization;
pub mod service;
pub mod spatial;
pub mod store;
pub mod types;

pub use aqi::{aqi_category, pm25_to_aqi, AqiCategory, AQI_BREAKPOINTS_PM25, AQI_MAX};
pub use config::{AircastConfig, BackendKind, LoggingConfig, ServingConfig, TrainingParams};
pub use errors::{ForecastError, Result};
pub use forecast::{forecast_times, hourly_forecast, HourlyPoint, MAX_FORECAST_HOURS};
pub use forest::{Forest, Node, Tree};
pub use fusion::build_dataset;
pub use pipeline::{ColumnSpec, ColumnTransformer, ModelBundle, Pipeline, MODEL_CONFIDENCE};
pub use service::{
    PredictionBackend, PredictionService, StatsSnapshot, SyntheticBackend, TrainedModelBackend,
};
pub use spatial::{
    generate_grid, hyperlocal_forecast, CellForecast, HourSlice, HyperlocalForecast,
    HyperlocalRequest,
};
pub use store::{ArtifactStore, LoadedBundle, ModelMetadata, PublishedVersion, TrainingMetrics};
pub use types::{
    feature_columns, AirObservation, FeatureRecord, FeatureRow, FeatureValue, GridPoint,
    LocationContext, Prediction, PredictionStatus, WeatherObservation, WeatherSnapshot,
    STUB_MODEL_VERSION,
};

/// Crate version string for metadata and CLI output
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

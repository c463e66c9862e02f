//! Error types for the Aircast core

use thiserror::Error;

/// Errors that can occur while fusing data, loading artifacts or scoring
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Input series missing or empty
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// A required column or variable is absent or malformed in an input series
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A serving-time feature row does not match the bundle's feature columns
    #[error("Feature mismatch on column '{column}': {reason}")]
    FeatureMismatch { column: String, reason: String },

    /// No usable bundle at load time
    #[error("Model not trained: {0}")]
    ModelNotTrained(String),

    /// Scoring through the fitted pipeline failed
    #[error("Prediction failed: {0}")]
    PredictionFailure(String),

    /// Grid parameters out of range
    #[error("Invalid grid request: {0}")]
    InvalidGrid(String),

    /// Configuration could not be assembled
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary bundle encoding error
    #[error("Bundle encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

impl ForecastError {
    pub(crate) fn feature_mismatch(column: &str, reason: impl Into<String>) -> Self {
        ForecastError::FeatureMismatch {
            column: column.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for ForecastError {
    fn from(err: config::ConfigError) -> Self {
        ForecastError::Config(err.to_string())
    }
}

/// Result type for Aircast core operations
pub type Result<T> = std::result::Result<T, ForecastError>;

use aircast_core::ForecastError;
use thiserror::Error;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("invalid training parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

//! Integration tests for the trainer
//!
//! Covers reproducibility, publish and evaluate through the artifact store, and
//! the guarantee that a failed run leaves the active version untouched.

use aircast_core::store::{version_id, ACTIVE_FILE, VERSIONS_DIR};
use aircast_core::{
    AirObservation, ArtifactStore, ForecastError, LocationContext, TrainingParams,
    WeatherObservation,
};
use aircast_trainer::{evaluate, train_and_publish, train_from_observations, TrainerError};
use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// `n` hourly observations where PM2.5 falls with temperature and wind and
/// rises with humidity, plus seeded noise.
fn synthetic_series(n: usize, seed: u64) -> (Vec<AirObservation>, Vec<WeatherObservation>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut air = Vec::with_capacity(n);
    let mut weather = Vec::with_capacity(n);

    for i in 0..n {
        let timestamp = start() + Duration::hours(i as i64);
        let temperature: f64 = rng.gen_range(5.0..40.0);
        let humidity: f64 = rng.gen_range(20.0..95.0);
        let wind_speed: f64 = rng.gen_range(0.0..12.0);
        let wind_direction: f64 = rng.gen_range(0.0..360.0);
        let pressure: f64 = rng.gen_range(995.0..1025.0);
        let noise: f64 = rng.gen_range(-5.0..5.0);

        let pm25 =
            (180.0 - 3.0 * temperature + 0.8 * humidity - 6.0 * wind_speed + noise).max(1.0);

        air.push(AirObservation::pm25_only(timestamp, pm25));
        weather.push(WeatherObservation {
            timestamp,
            temperature: Some(temperature),
            humidity: Some(humidity),
            wind_speed: Some(wind_speed),
            wind_direction: Some(wind_direction),
            pressure: Some(pressure),
        });
    }
    (air, weather)
}

fn params(seed: u64) -> TrainingParams {
    TrainingParams {
        n_estimators: 20,
        max_depth: Some(10),
        cv_folds: 3,
        seed,
        ..TrainingParams::default()
    }
}

#[test]
fn test_deterministic_training() -> Result<()> {
    let (air, weather) = synthetic_series(1000, 1);
    let location = LocationContext::default();

    let (bundle1, metrics1) = train_from_observations(&air, &weather, &location, &params(42))?;
    let (bundle2, metrics2) = train_from_observations(&air, &weather, &location, &params(42))?;

    assert_eq!(metrics1.mae.to_bits(), metrics2.mae.to_bits(), "MAE should be identical");
    assert_eq!(metrics1.rmse.to_bits(), metrics2.rmse.to_bits(), "RMSE should be identical");
    assert_eq!(metrics1.r2.to_bits(), metrics2.r2.to_bits(), "R2 should be identical");
    assert_eq!(metrics1, metrics2);
    assert_eq!(bundle1, bundle2, "Bundles should be identical");
    assert_eq!(
        version_id(&bincode::serialize(&bundle1)?),
        version_id(&bincode::serialize(&bundle2)?)
    );

    assert_eq!(metrics1.n_test, 200);
    assert_eq!(metrics1.n_train, 800);
    assert_eq!(metrics1.cv_folds, Some(3));
    assert!(metrics1.r2 > 0.5, "model should explain the signal, r2={}", metrics1.r2);

    Ok(())
}

#[test]
fn test_different_seed_gives_different_model() -> Result<()> {
    let (air, weather) = synthetic_series(300, 1);
    let location = LocationContext::default();
    let no_cv = |seed| TrainingParams {
        cv_folds: 0,
        ..params(seed)
    };

    let (a, _) = train_from_observations(&air, &weather, &location, &no_cv(42))?;
    let (b, _) = train_from_observations(&air, &weather, &location, &no_cv(43))?;
    assert_ne!(a, b);
    Ok(())
}

#[test]
fn test_publish_then_evaluate_merges_metrics() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = ArtifactStore::new(dir.path());
    let (air, weather) = synthetic_series(400, 2);
    let location = LocationContext::default();

    let report = train_and_publish(&store, &air, &weather, &location, &params(42))?;
    assert!(!report.reused);
    assert_eq!(store.active_version()?, Some(report.version.clone()));

    let metadata = store.read_metadata(&report.version)?;
    assert_eq!(metadata.model_version, report.version);
    assert_eq!(metadata.n_rows, 400);
    assert_eq!(metadata.params.n_estimators, 20);
    assert_eq!(metadata.params.seed, 42);

    let (eval_air, eval_weather) = synthetic_series(100, 3);
    let evaluation = evaluate(&store, &eval_air, &eval_weather, &location)?;
    assert_eq!(evaluation.version, report.version);
    assert_eq!(evaluation.n_samples, 100);

    let metrics = store.read_metrics(&report.version)?;
    let close = |key: &str, expected: f64| {
        metrics[key]
            .as_f64()
            .map_or(false, |v| (v - expected).abs() < 1e-9)
    };
    assert!(close("mae", report.metrics.mae));
    assert_eq!(metrics["cv_folds"].as_u64(), Some(3));
    assert_eq!(metrics["n_samples"].as_u64(), Some(100));
    assert!(close("eval_mae", evaluation.scores.mae));
    assert!(metrics["eval_rmse"].is_number());
    assert!(metrics["eval_r2"].is_number());

    // Same data and seed republish the same content.
    let again = train_and_publish(&store, &air, &weather, &location, &params(42))?;
    assert!(again.reused);
    assert_eq!(again.version, report.version);
    assert_eq!(store.list_versions()?, vec![report.version]);

    Ok(())
}

#[test]
fn test_failed_publish_keeps_active_version() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = ArtifactStore::new(dir.path());
    let (air, weather) = synthetic_series(200, 4);
    let location = LocationContext::default();
    let quick = |seed| TrainingParams {
        cv_folds: 0,
        ..params(seed)
    };

    let first = train_and_publish(&store, &air, &weather, &location, &quick(42))?;

    // Block the next version's directory with a plain file.
    let (next, _) = train_from_observations(&air, &weather, &location, &quick(7))?;
    let next_id = version_id(&bincode::serialize(&next)?);
    assert_ne!(next_id, first.version);
    fs::write(dir.path().join(VERSIONS_DIR).join(&next_id), b"not a directory")?;

    let result = train_and_publish(&store, &air, &weather, &location, &quick(7));
    assert!(result.is_err());

    let active = fs::read_to_string(dir.path().join(ACTIVE_FILE))?;
    assert_eq!(active.trim(), first.version);
    let loaded = store.load_active()?;
    assert_eq!(loaded.version, first.version);

    Ok(())
}

#[test]
fn test_failed_training_writes_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = ArtifactStore::new(dir.path());
    let (air, weather) = synthetic_series(200, 5);
    let location = LocationContext::default();
    let quick = TrainingParams {
        cv_folds: 0,
        ..params(42)
    };

    let first = train_and_publish(&store, &air, &weather, &location, &quick)?;

    let err = train_and_publish(&store, &air, &[], &location, &quick).unwrap_err();
    assert!(matches!(
        err,
        TrainerError::Forecast(ForecastError::DataUnavailable(_))
    ));
    assert_eq!(store.active_version()?, Some(first.version.clone()));
    assert_eq!(store.list_versions()?, vec![first.version]);

    Ok(())
}

#[test]
fn test_evaluate_without_model() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = ArtifactStore::new(dir.path());
    let (air, weather) = synthetic_series(50, 6);

    let err = evaluate(&store, &air, &weather, &LocationContext::default()).unwrap_err();
    assert!(matches!(
        err,
        TrainerError::Forecast(ForecastError::ModelNotTrained(_))
    ));
    Ok(())
}

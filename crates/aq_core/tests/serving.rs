use aircast_core::{
    generate_grid, hyperlocal_forecast, AircastConfig, ArtifactStore, ColumnTransformer,
    FeatureRow, ForecastError, Forest, GridPoint, HyperlocalRequest, LocationContext, ModelBundle,
    ModelMetadata, Node, Pipeline, Prediction, PredictionBackend, PredictionService,
    PredictionStatus, TrainingMetrics, TrainingParams, Tree, WeatherSnapshot,
    MAX_FORECAST_HOURS, STUB_MODEL_VERSION,
};
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 5)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap()
}

fn request(hours: u32) -> HyperlocalRequest {
    HyperlocalRequest {
        center: GridPoint::new(28.61, 77.21),
        radius_km: 5.0,
        resolution_km: 1.0,
        start: start(),
        hours,
        weather: WeatherSnapshot::default(),
        location: LocationContext::default(),
    }
}

/// Predicts 55 at or south of the centre latitude and 95 north of it.
fn latitude_bundle() -> ModelBundle {
    let row = PredictionService::feature_row(
        28.61,
        77.21,
        start(),
        &WeatherSnapshot::default(),
        &LocationContext::default(),
    );
    let transformer = ColumnTransformer::fit(&[row]).unwrap();
    let width = transformer.output_width();
    let tree = Tree::new(vec![
        Node::internal(0, 0, 28.61, 1, 2),
        Node::leaf(1, 55.0),
        Node::leaf(2, 95.0),
    ]);
    ModelBundle::new(Pipeline::new(transformer, Forest::new(width, vec![tree])))
}

#[test]
fn no_bundle_returns_stub_and_never_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = AircastConfig {
        model_dir: dir.path().to_path_buf(),
        ..AircastConfig::default()
    };
    let service = PredictionService::from_config(&config);

    let prediction = service.predict(&FeatureRow::new());
    assert_eq!(prediction.model_version, STUB_MODEL_VERSION);
    assert!(prediction.is_degraded());
    assert_eq!(service.stats().degraded, 1);
}

#[test]
fn published_bundle_is_served() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = ArtifactStore::new(dir.path());
    let bundle = latitude_bundle();
    let metrics = TrainingMetrics {
        mae: 0.0,
        rmse: 0.0,
        r2: 1.0,
        n_train: 1,
        n_test: 1,
        cv_folds: None,
        cv_mae_mean: None,
        cv_rmse_mean: None,
        cv_r2_mean: None,
    };
    let metadata = ModelMetadata::for_bundle(&bundle, &TrainingParams::default(), &metrics);
    let published = store.publish(&bundle, &metrics, &metadata)?;

    let config = AircastConfig {
        model_dir: dir.path().to_path_buf(),
        ..AircastConfig::default()
    };
    let service = PredictionService::from_config(&config);
    assert_eq!(service.backend_name(), "trained");
    assert_eq!(service.model_version(), published.id);

    let row = PredictionService::feature_row(
        28.70,
        77.21,
        start(),
        &config.serving.weather,
        &config.location,
    );
    let prediction = service.predict(&row);
    assert_eq!(prediction.status, PredictionStatus::Model);
    assert_eq!(prediction.pm25, 95.0);
    Ok(())
}

#[test]
fn grid_for_delhi_is_eleven_square() {
    let center = GridPoint::new(28.61, 77.21);
    let grid = generate_grid(center, 5.0, 1.0).unwrap();
    assert_eq!(grid.len(), 11);
    assert!(grid.iter().all(|row| row.len() == 11));
    assert!((grid[5][5].lat - 28.61).abs() < 1e-9);
    assert!((grid[5][5].lon - 77.21).abs() < 1e-9);
}

#[tokio::test]
async fn hyperlocal_fan_out_shape() -> Result<()> {
    let service = Arc::new(PredictionService::with_bundle(
        Arc::new(latitude_bundle()),
        "rf_pm25_fixture",
    ));
    let forecast = hyperlocal_forecast(service.clone(), &request(3), 4).await?;

    assert_eq!(forecast.grid.len(), 11);
    assert_eq!(forecast.hours.len(), 3);
    for (h, slice) in forecast.hours.iter().enumerate() {
        assert_eq!(slice.time, start() + chrono::Duration::hours(h as i64));
        assert_eq!(slice.cells.len(), 11);
        for (r, row) in slice.cells.iter().enumerate() {
            assert_eq!(row.len(), 11);
            for (c, cell) in row.iter().enumerate() {
                assert_eq!(cell.point, forecast.grid[r][c]);
                assert_eq!(cell.prediction.model_version, "rf_pm25_fixture");
                let expected = if cell.point.lat <= 28.61 { 55.0 } else { 95.0 };
                assert_eq!(cell.prediction.pm25, expected);
            }
        }
    }
    assert_eq!(forecast.degraded_cells(), 0);
    assert_eq!(service.stats().served, 3 * 121);
    Ok(())
}

#[tokio::test]
async fn synthetic_cells_are_tagged() -> Result<()> {
    let service = Arc::new(PredictionService::synthetic("no model"));
    let forecast = hyperlocal_forecast(service, &request(1), 8).await?;
    assert_eq!(forecast.degraded_cells(), 121);
    let cell = &forecast.hours[0].cells[0][0];
    assert_eq!(cell.prediction.model_version, STUB_MODEL_VERSION);
    Ok(())
}

/// Panics for cells north of the centre.
struct NorthPanics;

impl PredictionBackend for NorthPanics {
    fn predict(&self, row: &FeatureRow) -> aircast_core::Result<Prediction> {
        match row.get("lat") {
            Some(aircast_core::FeatureValue::Number(lat)) if *lat > 28.611 => {
                panic!("backend exploded at {lat}")
            }
            _ => latitude_bundle().predict(row, "rf_pm25_fixture"),
        }
    }

    fn model_version(&self) -> &str {
        "rf_pm25_fixture"
    }

    fn name(&self) -> &'static str {
        "north-panics"
    }
}

#[tokio::test]
async fn panicking_task_degrades_only_its_cell() -> Result<()> {
    let service = Arc::new(PredictionService::with_backend(Box::new(NorthPanics)));
    let forecast = hyperlocal_forecast(service.clone(), &request(1), 2).await?;

    let cells = &forecast.hours[0].cells;
    for (r, row) in cells.iter().enumerate() {
        for cell in row {
            if r > 5 {
                assert!(cell.prediction.is_degraded());
                assert_eq!(cell.prediction.model_version, STUB_MODEL_VERSION);
            } else {
                assert!(!cell.prediction.is_degraded());
            }
        }
    }
    assert_eq!(forecast.degraded_cells(), 5 * 11);
    assert_eq!(service.stats().degraded, 5 * 11);
    Ok(())
}

#[tokio::test]
async fn invalid_grid_is_rejected() {
    let service = Arc::new(PredictionService::synthetic("no model"));
    let mut bad = request(1);
    bad.resolution_km = 0.0;
    assert!(hyperlocal_forecast(service, &bad, 8).await.is_err());
}

#[tokio::test]
async fn oversized_horizon_is_rejected_before_any_prediction() {
    let service = Arc::new(PredictionService::synthetic("no model"));
    for hours in [MAX_FORECAST_HOURS + 1, u32::MAX] {
        let err = hyperlocal_forecast(service.clone(), &request(hours), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidGrid(_)));
    }
    assert_eq!(service.stats().served, 0);
}

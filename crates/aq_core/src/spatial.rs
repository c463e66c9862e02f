//! Spatial grid generation and hyperlocal forecast fan-out
//!
//! The grid uses an equirectangular approximation: one degree of latitude and
//! one degree of longitude are both taken as 111 km. That only holds near the
//! equator and drifts with latitude; it is kept as-is.

use crate::errors::{ForecastError, Result};
use crate::forecast::forecast_times;
use crate::service::PredictionService;
use crate::types::{GridPoint, LocationContext, Prediction, WeatherSnapshot};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Kilometres per degree used for both axes.
pub const KM_PER_DEGREE: f64 = 111.0;
/// Upper bound on points per grid side.
pub const MAX_GRID_STEPS: usize = 1001;
pub const DEFAULT_MAX_PARALLEL: usize = 8;

/// Build a `steps x steps` grid centred on `center`.
///
/// `steps = floor(2 * radius_km / resolution_km) + 1`. Rows vary latitude and
/// columns vary longitude, both ascending.
pub fn generate_grid(
    center: GridPoint,
    radius_km: f64,
    resolution_km: f64,
) -> Result<Vec<Vec<GridPoint>>> {
    if !(radius_km.is_finite() && radius_km > 0.0) {
        return Err(ForecastError::InvalidGrid(format!(
            "radius_km must be finite and positive, got {radius_km}"
        )));
    }
    if !(resolution_km.is_finite() && resolution_km > 0.0) {
        return Err(ForecastError::InvalidGrid(format!(
            "resolution_km must be finite and positive, got {resolution_km}"
        )));
    }
    if !(center.lat.is_finite() && center.lon.is_finite()) {
        return Err(ForecastError::InvalidGrid(
            "center coordinate must be finite".to_string(),
        ));
    }

    let span = (2.0 * radius_km / resolution_km).floor();
    if span >= MAX_GRID_STEPS as f64 {
        return Err(ForecastError::InvalidGrid(format!(
            "{} points per side exceeds the limit of {MAX_GRID_STEPS}",
            span + 1.0
        )));
    }
    let steps = span as usize + 1;

    let delta = resolution_km / KM_PER_DEGREE;
    let half = (steps - 1) as f64 / 2.0;
    let lat0 = center.lat - half * delta;
    let lon0 = center.lon - half * delta;

    let grid = (0..steps)
        .map(|r| {
            let lat = lat0 + r as f64 * delta;
            (0..steps)
                .map(|c| GridPoint::new(lat, lon0 + c as f64 * delta))
                .collect()
        })
        .collect();

    debug!(steps, delta, "generated grid");
    Ok(grid)
}

/// Parameters of a hyperlocal forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperlocalRequest {
    pub center: GridPoint,
    pub radius_km: f64,
    pub resolution_km: f64,
    pub start: NaiveDateTime,
    pub hours: u32,
    #[serde(default)]
    pub weather: WeatherSnapshot,
    #[serde(default)]
    pub location: LocationContext,
}

/// Prediction for one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellForecast {
    pub point: GridPoint,
    pub prediction: Prediction,
}

/// All cells for one forecast hour, laid out like the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourSlice {
    pub time: NaiveDateTime,
    pub cells: Vec<Vec<CellForecast>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperlocalForecast {
    pub grid: Vec<Vec<GridPoint>>,
    pub hours: Vec<HourSlice>,
}

impl HyperlocalForecast {
    pub fn degraded_cells(&self) -> usize {
        self.hours
            .iter()
            .flat_map(|h| h.cells.iter().flatten())
            .filter(|c| c.prediction.is_degraded())
            .count()
    }
}

type CellResult = (usize, usize, usize, Prediction);

/// Predict every (hour, cell) pair with at most `max_parallel` predictions in flight.
///
/// A task that panics only degrades its own cell.
pub async fn hyperlocal_forecast(
    service: Arc<PredictionService>,
    request: &HyperlocalRequest,
    max_parallel: usize,
) -> Result<HyperlocalForecast> {
    let grid = generate_grid(request.center, request.radius_km, request.resolution_km)?;
    let steps = grid.len();
    let hours = request.hours as usize;
    let max_parallel = max_parallel.max(1);

    let times = forecast_times(request.start, request.hours)?;
    let mut slots: Vec<Vec<Vec<Option<Prediction>>>> = vec![vec![vec![None; steps]; steps]; hours];

    let permits = Arc::new(Semaphore::new(max_parallel));
    let mut in_flight: JoinSet<CellResult> = JoinSet::new();
    let mut failed_tasks = 0usize;

    fn store(
        slots: &mut [Vec<Vec<Option<Prediction>>>],
        joined: std::result::Result<CellResult, tokio::task::JoinError>,
        failed: &mut usize,
    ) {
        match joined {
            Ok((h, r, c, prediction)) => slots[h][r][c] = Some(prediction),
            Err(e) => {
                warn!(error = %e, "grid prediction task failed");
                *failed += 1;
            }
        }
    }

    for (h, &time) in times.iter().enumerate() {
        for (r, row) in grid.iter().enumerate() {
            for (c, point) in row.iter().enumerate() {
                while in_flight.len() >= max_parallel.saturating_mul(2) {
                    if let Some(joined) = in_flight.join_next().await {
                        store(&mut slots, joined, &mut failed_tasks);
                    }
                }

                let permit = permits.clone().acquire_owned().await.map_err(|e| {
                    ForecastError::PredictionFailure(format!("prediction pool closed: {e}"))
                })?;
                let service = service.clone();
                let features = PredictionService::feature_row(
                    point.lat,
                    point.lon,
                    time,
                    &request.weather,
                    &request.location,
                );
                in_flight.spawn_blocking(move || {
                    let _permit = permit;
                    (h, r, c, service.predict(&features))
                });
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        store(&mut slots, joined, &mut failed_tasks);
    }

    let hour_slices: Vec<HourSlice> = slots
        .into_iter()
        .zip(times)
        .map(|(rows, time)| HourSlice {
            time,
            cells: rows
                .into_iter()
                .zip(&grid)
                .map(|(cells, points)| {
                    cells
                        .into_iter()
                        .zip(points)
                        .map(|(prediction, point)| CellForecast {
                            point: *point,
                            prediction: prediction.unwrap_or_else(|| {
                                service.degraded("prediction task did not complete")
                            }),
                        })
                        .collect()
                })
                .collect(),
        })
        .collect();

    let forecast = HyperlocalForecast {
        grid,
        hours: hour_slices,
    };
    info!(
        "Hyperlocal forecast: {}x{} grid, {} hours, {} degraded cells, {} failed tasks",
        steps,
        steps,
        hours,
        forecast.degraded_cells(),
        failed_tasks
    );
    Ok(forecast)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn eleven_by_eleven_for_five_km_at_one_km() {
        let center = GridPoint::new(28.61, 77.21);
        let grid = generate_grid(center, 5.0, 1.0).unwrap();
        assert_eq!(grid.len(), 11);
        assert!(grid.iter().all(|row| row.len() == 11));

        let middle = grid[5][5];
        assert!((middle.lat - center.lat).abs() < EPS);
        assert!((middle.lon - center.lon).abs() < EPS);

        let delta = 1.0 / KM_PER_DEGREE;
        assert!((grid[0][0].lat - (center.lat - 5.0 * delta)).abs() < EPS);
        assert!((grid[10][10].lon - (center.lon + 5.0 * delta)).abs() < EPS);
    }

    #[test]
    fn rows_vary_latitude_columns_vary_longitude() {
        let grid = generate_grid(GridPoint::new(10.0, 20.0), 2.0, 1.0).unwrap();
        assert_eq!(grid.len(), 5);
        for row in &grid {
            assert!(row.windows(2).all(|w| w[0].lat == w[1].lat && w[0].lon < w[1].lon));
        }
        for c in 0..5 {
            assert!(grid.windows(2).all(|w| w[0][c].lat < w[1][c].lat));
        }
    }

    #[test]
    fn fractional_ratio_floors_step_count() {
        // 2 * 1.3 / 0.5 = 5.2 -> 6 points, still symmetric about the centre
        let center = GridPoint::new(0.0, 0.0);
        let grid = generate_grid(center, 1.3, 0.5).unwrap();
        assert_eq!(grid.len(), 6);
        let first = grid[0][0].lat;
        let last = grid[5][0].lat;
        assert!((first + last).abs() < EPS);
    }

    #[test]
    fn radius_smaller_than_resolution_is_single_point() {
        let center = GridPoint::new(28.61, 77.21);
        let grid = generate_grid(center, 0.4, 1.0).unwrap();
        assert_eq!(grid, vec![vec![center]]);
    }

    #[test]
    fn invalid_parameters() {
        let center = GridPoint::new(28.61, 77.21);
        for (radius, resolution) in [
            (0.0, 1.0),
            (-1.0, 1.0),
            (5.0, 0.0),
            (f64::NAN, 1.0),
            (5.0, f64::INFINITY),
            (1.0e6, 1.0),
        ] {
            assert!(matches!(
                generate_grid(center, radius, resolution),
                Err(ForecastError::InvalidGrid(_))
            ));
        }
    }
}

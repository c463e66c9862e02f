//! Per-point multi-hour forecasts built from repeated service calls.

use crate::errors::{ForecastError, Result};
use crate::service::PredictionService;
use crate::types::{LocationContext, WeatherSnapshot};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Longest forecast horizon served, in hours.
pub const MAX_FORECAST_HOURS: u32 = 72;

/// PM10 is estimated from PM2.5 with a fixed ratio.
pub const PM10_RATIO: f64 = 1.4;
const LOWER_BAND: f64 = 0.8;
const UPPER_BAND: f64 = 1.2;

/// One forecast hour for a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    pub time: NaiveDateTime,
    pub aqi: u32,
    pub pm25: f64,
    pub pm10: f64,
    pub lower: u32,
    pub upper: u32,
    pub model_version: String,
    pub degraded: bool,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// `hours` consecutive hourly timestamps from `start`.
///
/// Horizons above [`MAX_FORECAST_HOURS`] or past the representable date range
/// are rejected as `InvalidGrid`.
pub fn forecast_times(start: NaiveDateTime, hours: u32) -> Result<Vec<NaiveDateTime>> {
    if hours > MAX_FORECAST_HOURS {
        return Err(ForecastError::InvalidGrid(format!(
            "forecast horizon of {hours} hours exceeds the limit of {MAX_FORECAST_HOURS}"
        )));
    }
    (0..hours)
        .map(|h| {
            start
                .checked_add_signed(Duration::hours(i64::from(h)))
                .ok_or_else(|| {
                    ForecastError::InvalidGrid(format!("{start} + {h}h is out of range"))
                })
        })
        .collect()
}

/// Forecast `hours` consecutive hours for a point, starting at `start`.
pub fn hourly_forecast(
    service: &PredictionService,
    lat: f64,
    lon: f64,
    start: NaiveDateTime,
    hours: u32,
    weather: &WeatherSnapshot,
    location: &LocationContext,
) -> Result<Vec<HourlyPoint>> {
    let points = forecast_times(start, hours)?
        .into_iter()
        .map(|time| {
            let row = PredictionService::feature_row(lat, lon, time, weather, location);
            let prediction = service.predict(&row);
            HourlyPoint {
                time,
                aqi: prediction.aqi,
                pm25: round1(prediction.pm25),
                pm10: round1(prediction.pm25 * PM10_RATIO),
                lower: (prediction.aqi as f64 * LOWER_BAND).floor() as u32,
                upper: (prediction.aqi as f64 * UPPER_BAND).floor() as u32,
                degraded: prediction.is_degraded(),
                model_version: prediction.model_version,
            }
        })
        .collect();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{Forest, Node, Tree};
    use crate::pipeline::{ColumnTransformer, ModelBundle, Pipeline};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(22, 0, 0)
            .unwrap()
    }

    /// Predicts 100 for hours <= 22 and 40 afterwards.
    fn hour_split_service() -> PredictionService {
        let row = PredictionService::feature_row(
            28.61,
            77.21,
            start(),
            &WeatherSnapshot::default(),
            &LocationContext::default(),
        );
        let transformer = ColumnTransformer::fit(&[row]).unwrap();
        let hour_idx = transformer
            .output_names()
            .iter()
            .position(|n| n == "hour")
            .unwrap() as i32;
        let tree = Tree::new(vec![
            Node::internal(0, hour_idx, 22.5, 1, 2),
            Node::leaf(1, 100.0),
            Node::leaf(2, 40.0),
        ]);
        let width = transformer.output_width();
        let bundle = ModelBundle::new(Pipeline::new(transformer, Forest::new(width, vec![tree])));
        PredictionService::with_bundle(Arc::new(bundle), "rf_pm25_test")
    }

    #[test]
    fn hours_advance_and_cross_midnight() {
        let service = hour_split_service();
        let points = hourly_forecast(
            &service,
            28.61,
            77.21,
            start(),
            3,
            &WeatherSnapshot::default(),
            &LocationContext::default(),
        )
        .unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].time, start());
        assert_eq!(points[2].time, start() + Duration::hours(2));

        // 22:00 -> 100 µg/m³, 23:00 and 00:00 -> 40 µg/m³
        assert_eq!(points[0].pm25, 100.0);
        assert_eq!(points[0].pm10, 140.0);
        assert_eq!(points[0].aqi, 234);
        assert_eq!(points[0].lower, 187);
        assert_eq!(points[0].upper, 280);
        assert_eq!(points[1].pm25, 40.0);
        assert_eq!(points[2].pm25, 40.0);
        assert!(points.iter().all(|p| !p.degraded && p.model_version == "rf_pm25_test"));
    }

    #[test]
    fn degraded_hours_are_flagged() {
        let service = PredictionService::synthetic("no model");
        let points = hourly_forecast(
            &service,
            28.61,
            77.21,
            start(),
            24,
            &WeatherSnapshot::default(),
            &LocationContext::default(),
        )
        .unwrap();
        assert_eq!(points.len(), 24);
        for p in &points {
            assert!(p.degraded);
            assert_eq!(p.model_version, "stub");
            assert!(p.lower <= p.aqi && p.aqi <= p.upper);
        }
        assert_eq!(service.stats().degraded, 24);
    }

    #[test]
    fn zero_hours_is_empty() {
        let service = PredictionService::synthetic("no model");
        let points = hourly_forecast(
            &service,
            0.0,
            0.0,
            start(),
            0,
            &WeatherSnapshot::default(),
            &LocationContext::default(),
        )
        .unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn horizon_is_capped() {
        let service = PredictionService::synthetic("no model");
        let forecast = |hours| {
            hourly_forecast(
                &service,
                28.61,
                77.21,
                start(),
                hours,
                &WeatherSnapshot::default(),
                &LocationContext::default(),
            )
        };

        assert_eq!(forecast(MAX_FORECAST_HOURS).unwrap().len(), 72);
        for hours in [MAX_FORECAST_HOURS + 1, u32::MAX] {
            assert!(matches!(forecast(hours), Err(ForecastError::InvalidGrid(_))));
        }
        assert_eq!(service.stats().served, 72);
    }

    #[test]
    fn times_past_the_calendar_end_are_rejected() {
        let err = forecast_times(NaiveDateTime::MAX, 2).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidGrid(_)));
        assert_eq!(forecast_times(start(), 1).unwrap(), vec![start()]);
    }
}

//! Common data structures for observations, feature rows and predictions

use crate::aqi::AqiCategory;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric feature columns, in bundle order.
pub const NUMERIC_FEATURES: [&str; 9] = [
    "lat",
    "lon",
    "temp",
    "humidity",
    "wind_speed",
    "wind_dir",
    "pressure",
    "hour",
    "month",
];

/// Categorical feature columns, in bundle order (after the numeric ones).
pub const CATEGORICAL_FEATURES: [&str; 4] = ["location", "city", "country", "unit"];

/// Regression target column.
pub const TARGET_COLUMN: &str = "pm25";

/// Full ordered feature-column list used at training time.
pub fn feature_columns() -> Vec<String> {
    NUMERIC_FEATURES
        .iter()
        .chain(CATEGORICAL_FEATURES.iter())
        .map(|c| c.to_string())
        .collect()
}

/// One hourly air-quality reading as produced by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirObservation {
    pub timestamp: NaiveDateTime,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub o3: Option<f64>,
    pub co: Option<f64>,
}

impl AirObservation {
    /// Observation carrying only a PM2.5 reading.
    pub fn pm25_only(timestamp: NaiveDateTime, pm25: f64) -> Self {
        Self {
            timestamp,
            pm25: Some(pm25),
            pm10: None,
            no2: None,
            so2: None,
            o3: None,
            co: None,
        }
    }
}

/// One hourly weather reading as produced by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub pressure: Option<f64>,
}

/// Weather values used to build serving rows when no live reading is wired in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub pressure: f64,
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            temperature: 25.0,
            humidity: 40.0,
            wind_speed: 2.5,
            wind_direction: 90.0,
            pressure: 1008.0,
        }
    }
}

/// Static context attached uniformly to every fused row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationContext {
    pub location_id: String,
    pub city: String,
    pub country: String,
    pub unit: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for LocationContext {
    fn default() -> Self {
        Self {
            location_id: "delhi_center".to_string(),
            city: "Delhi".to_string(),
            country: "IN".to_string(),
            unit: "µg/m³".to_string(),
            latitude: 28.6139,
            longitude: 77.2090,
        }
    }
}

/// One fused hourly training row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub timestamp: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
    pub temp: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_dir: f64,
    pub pressure: f64,
    pub hour: u32,
    pub month: u32,
    pub location: String,
    pub city: String,
    pub country: String,
    pub unit: String,
    pub pm25: f64,
}

impl FeatureRecord {
    /// Feature row (target and timestamp excluded) for the pipeline.
    pub fn to_row(&self) -> FeatureRow {
        let mut row = FeatureRow::new();
        row.set_number("lat", self.lat);
        row.set_number("lon", self.lon);
        row.set_number("temp", self.temp);
        row.set_number("humidity", self.humidity);
        row.set_number("wind_speed", self.wind_speed);
        row.set_number("wind_dir", self.wind_dir);
        row.set_number("pressure", self.pressure);
        row.set_number("hour", self.hour as f64);
        row.set_number("month", self.month as f64);
        row.set_text("location", &self.location);
        row.set_text("city", &self.city);
        row.set_text("country", &self.country);
        row.set_text("unit", &self.unit);
        row
    }
}

/// A single feature value supplied at serving time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

/// Named feature values for one prediction request; column order is irrelevant
/// here and is imposed by the bundle at scoring time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRow {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_number(&mut self, column: &str, value: f64) {
        self.values
            .insert(column.to_string(), FeatureValue::Number(value));
    }

    pub fn set_text(&mut self, column: &str, value: &str) {
        self.values
            .insert(column.to_string(), FeatureValue::Text(value.to_string()));
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.values.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<FeatureValue> {
        self.values.remove(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serving row for a coordinate at a given hour.
    pub fn for_point(
        lat: f64,
        lon: f64,
        at: NaiveDateTime,
        weather: &WeatherSnapshot,
        location: &LocationContext,
    ) -> Self {
        let mut row = FeatureRow::new();
        row.set_number("lat", lat);
        row.set_number("lon", lon);
        row.set_number("temp", weather.temperature);
        row.set_number("humidity", weather.humidity);
        row.set_number("wind_speed", weather.wind_speed);
        row.set_number("wind_dir", weather.wind_direction);
        row.set_number("pressure", weather.pressure);
        row.set_number("hour", at.hour() as f64);
        row.set_number("month", at.month() as f64);
        row.set_text("location", &location.location_id);
        row.set_text("city", &location.city);
        row.set_text("country", &location.country);
        row.set_text("unit", &location.unit);
        row
    }
}

/// Where a prediction came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionStatus {
    /// Scored by a trained bundle
    Model,
    /// Synthetic fallback; `reason` says why the model path was not used
    Degraded { reason: String },
}

/// Model version tag carried by every synthetic prediction.
pub const STUB_MODEL_VERSION: &str = "stub";

/// Point prediction returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub pm25: f64,
    pub aqi: u32,
    pub category: AqiCategory,
    pub confidence: f64,
    pub model_version: String,
    #[serde(flatten)]
    pub status: PredictionStatus,
}

impl Prediction {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, PredictionStatus::Degraded { .. })
    }
}

/// A coordinate on a spatial grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GridPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

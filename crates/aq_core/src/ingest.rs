//! Parsing of hourly air-quality and weather documents written by ingestion
//!
//! Ingestion collaborators persist Open-Meteo style responses:
//!
//! ```json
//! {"hourly": {"time": ["2024-10-01T00:00", ...], "pm2_5": [81.3, null, ...], ...}}
//! ```
//!
//! Every variable array must have the same length as `time`; `null` entries
//! become missing readings.

use crate::errors::{ForecastError, Result};
use crate::types::{AirObservation, WeatherObservation};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

pub const REQUIRED_AIR_KEYS: [&str; 6] = [
    "pm2_5",
    "pm10",
    "nitrogen_dioxide",
    "sulphur_dioxide",
    "ozone",
    "carbon_monoxide",
];

pub const REQUIRED_WEATHER_KEYS: [&str; 5] = [
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "wind_direction_10m",
    "surface_pressure",
];

/// Parse a timestamp in any of the formats emitted by the ingestors.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc()))
        .map_err(|_| ForecastError::SchemaMismatch(format!("unparseable timestamp '{raw}'")))
}

struct HourlyBlock<'a> {
    hourly: &'a serde_json::Map<String, Value>,
    times: Vec<NaiveDateTime>,
}

impl<'a> HourlyBlock<'a> {
    fn from_document(doc: &'a Value, source: &str) -> Result<Self> {
        let hourly = doc
            .get("hourly")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ForecastError::DataUnavailable(format!("{source}: no 'hourly' block"))
            })?;

        let times = hourly
            .get("time")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ForecastError::DataUnavailable(format!("{source}: no 'hourly.time' series"))
            })?
            .iter()
            .map(|v| {
                v.as_str()
                    .ok_or_else(|| {
                        ForecastError::SchemaMismatch(format!("{source}: non-string timestamp"))
                    })
                    .and_then(parse_timestamp)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { hourly, times })
    }

    fn column(&self, key: &str, source: &str) -> Result<Vec<Option<f64>>> {
        let values = self
            .hourly
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ForecastError::SchemaMismatch(format!("{source}: missing variable '{key}'"))
            })?;

        if values.len() != self.times.len() {
            return Err(ForecastError::SchemaMismatch(format!(
                "{source}: '{key}' has {} values for {} timestamps",
                values.len(),
                self.times.len()
            )));
        }

        values
            .iter()
            .map(|v| match v {
                Value::Null => Ok(None),
                other => other.as_f64().map(Some).ok_or_else(|| {
                    ForecastError::SchemaMismatch(format!("{source}: non-numeric '{key}' value"))
                }),
            })
            .collect()
    }
}

/// Parse an air-quality document into observations.
pub fn parse_air_quality(doc: &Value) -> Result<Vec<AirObservation>> {
    let block = HourlyBlock::from_document(doc, "air quality")?;
    let mut columns = Vec::with_capacity(REQUIRED_AIR_KEYS.len());
    for key in REQUIRED_AIR_KEYS {
        columns.push(block.column(key, "air quality")?);
    }

    let observations = block
        .times
        .iter()
        .enumerate()
        .map(|(i, &timestamp)| AirObservation {
            timestamp,
            pm25: columns[0][i],
            pm10: columns[1][i],
            no2: columns[2][i],
            so2: columns[3][i],
            o3: columns[4][i],
            co: columns[5][i],
        })
        .collect::<Vec<_>>();

    debug!("parsed {} air-quality observations", observations.len());
    Ok(observations)
}

/// Parse a weather document into observations.
pub fn parse_weather(doc: &Value) -> Result<Vec<WeatherObservation>> {
    let block = HourlyBlock::from_document(doc, "weather")?;
    let mut columns = Vec::with_capacity(REQUIRED_WEATHER_KEYS.len());
    for key in REQUIRED_WEATHER_KEYS {
        columns.push(block.column(key, "weather")?);
    }

    let observations = block
        .times
        .iter()
        .enumerate()
        .map(|(i, &timestamp)| WeatherObservation {
            timestamp,
            temperature: columns[0][i],
            humidity: columns[1][i],
            wind_speed: columns[2][i],
            wind_direction: columns[3][i],
            pressure: columns[4][i],
        })
        .collect::<Vec<_>>();

    debug!("parsed {} weather observations", observations.len());
    Ok(observations)
}

fn read_document(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(ForecastError::DataUnavailable(format!(
            "{} not found; run the ingestion pipeline first",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn load_air_quality(path: &Path) -> Result<Vec<AirObservation>> {
    parse_air_quality(&read_document(path)?)
}

pub fn load_weather(path: &Path) -> Result<Vec<WeatherObservation>> {
    parse_weather(&read_document(path)?)
}

/// Load both raw series.
pub fn load_raw(
    air_path: &Path,
    weather_path: &Path,
) -> Result<(Vec<AirObservation>, Vec<WeatherObservation>)> {
    Ok((load_air_quality(air_path)?, load_weather(weather_path)?))
}

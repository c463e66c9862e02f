//! Feature fusion: aligns an hourly air-quality series with an hourly weather
//! series into training rows.
//!
//! Both series are floored to the hour and sorted. Each air sample takes the
//! nearest weather sample within [`JOIN_TOLERANCE_HOURS`] (inclusive; an exact tie
//! goes to the earlier sample). Rows without a match, without a PM2.5 target or
//! missing any weather feature are dropped.

use crate::errors::{ForecastError, Result};
use crate::types::{AirObservation, FeatureRecord, LocationContext, WeatherObservation};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use tracing::{debug, info};

/// Maximum distance between an air sample and the weather sample joined to it.
pub const JOIN_TOLERANCE_HOURS: i64 = 1;

/// Truncate a timestamp to the start of its hour.
pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    NaiveTime::from_hms_opt(ts.hour(), 0, 0)
        .map(|t| ts.date().and_time(t))
        .unwrap_or(ts)
}

/// Floor, sort, and keep the last sample for each hour.
fn prepare_weather(weather: &[WeatherObservation]) -> Vec<WeatherObservation> {
    let mut sorted: Vec<WeatherObservation> = weather
        .iter()
        .cloned()
        .map(|mut w| {
            w.timestamp = floor_to_hour(w.timestamp);
            w
        })
        .collect();
    sorted.sort_by_key(|w| w.timestamp);

    let mut deduped: Vec<WeatherObservation> = Vec::with_capacity(sorted.len());
    for w in sorted {
        match deduped.last_mut() {
            Some(last) if last.timestamp == w.timestamp => *last = w,
            _ => deduped.push(w),
        }
    }
    deduped
}

/// Nearest weather sample to `ts` within tolerance.
fn nearest_weather(weather: &[WeatherObservation], ts: NaiveDateTime) -> Option<&WeatherObservation> {
    let tolerance = Duration::hours(JOIN_TOLERANCE_HOURS);
    let upper = weather.partition_point(|w| w.timestamp <= ts);

    let backward = upper.checked_sub(1).map(|i| &weather[i]);
    let forward = weather.get(upper);

    let candidate = match (backward, forward) {
        (Some(b), Some(f)) => {
            if ts - b.timestamp <= f.timestamp - ts {
                b
            } else {
                f
            }
        }
        (Some(b), None) => b,
        (None, Some(f)) => f,
        (None, None) => return None,
    };

    let distance = if candidate.timestamp >= ts {
        candidate.timestamp - ts
    } else {
        ts - candidate.timestamp
    };
    (distance <= tolerance).then_some(candidate)
}

/// Build the fused feature table.
pub fn build_dataset(
    air: &[AirObservation],
    weather: &[WeatherObservation],
    location: &LocationContext,
) -> Result<Vec<FeatureRecord>> {
    if air.is_empty() {
        return Err(ForecastError::DataUnavailable(
            "air-quality series is empty".to_string(),
        ));
    }
    if weather.is_empty() {
        return Err(ForecastError::DataUnavailable(
            "weather series is empty".to_string(),
        ));
    }

    let weather = prepare_weather(weather);

    let mut air: Vec<AirObservation> = air.to_vec();
    for a in &mut air {
        a.timestamp = floor_to_hour(a.timestamp);
    }
    air.sort_by_key(|a| a.timestamp);

    let mut unmatched = 0usize;
    let mut incomplete = 0usize;
    let mut records = Vec::with_capacity(air.len());

    for a in &air {
        let Some(w) = nearest_weather(&weather, a.timestamp) else {
            unmatched += 1;
            continue;
        };

        let fields = (
            a.pm25,
            w.temperature,
            w.humidity,
            w.wind_speed,
            w.wind_direction,
            w.pressure,
        );
        let (Some(pm25), Some(temp), Some(humidity), Some(wind_speed), Some(wind_dir), Some(pressure)) =
            fields
        else {
            incomplete += 1;
            continue;
        };

        records.push(FeatureRecord {
            timestamp: a.timestamp,
            lat: location.latitude,
            lon: location.longitude,
            temp,
            humidity,
            wind_speed,
            wind_dir,
            pressure,
            hour: a.timestamp.hour(),
            month: a.timestamp.month(),
            location: location.location_id.clone(),
            city: location.city.clone(),
            country: location.country.clone(),
            unit: location.unit.clone(),
            pm25,
        });
    }

    debug!(
        air = air.len(),
        weather = weather.len(),
        unmatched,
        incomplete,
        "fusion join finished"
    );

    if records.is_empty() {
        return Err(ForecastError::DataUnavailable(format!(
            "no complete rows after fusion ({unmatched} unmatched, {incomplete} incomplete)"
        )));
    }

    info!(
        "Fused {} rows ({} dropped: {} unmatched, {} incomplete)",
        records.len(),
        unmatched + incomplete,
        unmatched,
        incomplete
    );

    Ok(records)
}

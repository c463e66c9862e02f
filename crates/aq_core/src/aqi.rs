//! PM2.5 concentration to Air Quality Index conversion
//!
//! The breakpoint table below is authoritative. Bands are scanned in order with
//! inclusive bounds, so a concentration sitting exactly on a boundary resolves to
//! the lower band. Adjacent bands do not share an index at their boundary (50 → 51,
//! 100 → 101, ...); the table is reproduced as-is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `(low_concentration, high_concentration, low_index, high_index)`, µg/m³
pub const AQI_BREAKPOINTS_PM25: [(f64, f64, u32, u32); 6] = [
    (0.0, 30.0, 0, 50),
    (30.0, 60.0, 51, 100),
    (60.0, 90.0, 101, 200),
    (90.0, 120.0, 201, 300),
    (120.0, 250.0, 301, 400),
    (250.0, 500.0, 401, 500),
];

/// Index assigned to any concentration above the top band.
pub const AQI_MAX: u32 = 500;

/// Convert a PM2.5 concentration into an AQI value.
///
/// Negative concentrations are clamped to zero and NaN maps to 0; anything above
/// the top band clips to [`AQI_MAX`].
pub fn pm25_to_aqi(concentration: f64) -> u32 {
    if concentration.is_nan() {
        return 0;
    }
    let c = concentration.max(0.0);

    for &(low_c, high_c, low_i, high_i) in AQI_BREAKPOINTS_PM25.iter() {
        if low_c <= c && c <= high_c {
            let slope = (high_i - low_i) as f64 / (high_c - low_c);
            // Truncation toward zero, not rounding.
            return (slope * (c - low_c) + low_i as f64) as u32;
        }
    }

    AQI_MAX
}

/// The six fixed AQI categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AqiCategory {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Satisfactory")]
    Satisfactory,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Poor")]
    Poor,
    #[serde(rename = "Very Poor")]
    VeryPoor,
    #[serde(rename = "Severe")]
    Severe,
}

impl AqiCategory {
    pub const ALL: [AqiCategory; 6] = [
        AqiCategory::Good,
        AqiCategory::Satisfactory,
        AqiCategory::Moderate,
        AqiCategory::Poor,
        AqiCategory::VeryPoor,
        AqiCategory::Severe,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Satisfactory => "Satisfactory",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::Poor => "Poor",
            AqiCategory::VeryPoor => "Very Poor",
            AqiCategory::Severe => "Severe",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map an AQI value to its category.
pub fn aqi_category(aqi: u32) -> AqiCategory {
    match aqi {
        0..=50 => AqiCategory::Good,
        51..=100 => AqiCategory::Satisfactory,
        101..=200 => AqiCategory::Moderate,
        201..=300 => AqiCategory::Poor,
        301..=400 => AqiCategory::VeryPoor,
        _ => AqiCategory::Severe,
    }
}

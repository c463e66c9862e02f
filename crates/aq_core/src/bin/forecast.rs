//! Aircast forecast CLI
//!
//! Serves point, hourly and grid forecasts from the active model bundle and
//! prints them as JSON on stdout. Without a usable bundle every answer is a
//! degraded synthetic estimate.

use aircast_core::ingest::parse_timestamp;
use aircast_core::logging::init_logging;
use aircast_core::{
    hourly_forecast, hyperlocal_forecast, AircastConfig, GridPoint, HyperlocalRequest,
    PredictionService,
};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "aircast-forecast")]
#[command(author = "Aircast Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "PM2.5 point, hourly and hyperlocal grid forecasts", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./aircast.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Model directory, overrides configuration
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict PM2.5 and AQI for one coordinate
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Forecast time, e.g. 2024-10-01T13:00 (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Consecutive hourly forecasts for one coordinate
    Hourly {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value = "24")]
        hours: u32,
        /// First forecast hour (defaults to now)
        #[arg(long)]
        start: Option<String>,
    },
    /// Hyperlocal forecast over a square grid around a coordinate
    Grid {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value = "5.0")]
        radius_km: f64,
        #[arg(long, default_value = "1.0")]
        resolution_km: f64,
        #[arg(long, default_value = "1")]
        hours: u32,
        /// First forecast hour (defaults to now)
        #[arg(long)]
        start: Option<String>,
        /// Predictions in flight at once (defaults to configuration)
        #[arg(long)]
        max_parallel: Option<usize>,
    },
}

fn resolve_time(raw: Option<&str>) -> Result<NaiveDateTime> {
    match raw {
        Some(raw) => parse_timestamp(raw).with_context(|| format!("invalid time '{raw}'")),
        None => Ok(chrono::Local::now().naive_local()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        AircastConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    init_logging(&config.logging, cli.verbose)?;

    info!("Aircast forecast v{}", aircast_core::VERSION);
    let service = Arc::new(PredictionService::from_config(&config));
    info!(
        "Backend: {} (model version {})",
        service.backend_name(),
        service.model_version()
    );

    match cli.command {
        Command::Predict { lat, lon, at } => {
            let at = resolve_time(at.as_deref())?;
            let row = PredictionService::feature_row(
                lat,
                lon,
                at,
                &config.serving.weather,
                &config.location,
            );
            print_json(&service.predict(&row))?;
        }
        Command::Hourly {
            lat,
            lon,
            hours,
            start,
        } => {
            let start = resolve_time(start.as_deref())?;
            let points = hourly_forecast(
                &service,
                lat,
                lon,
                start,
                hours,
                &config.serving.weather,
                &config.location,
            )
            .context("Hourly forecast failed")?;
            print_json(&points)?;
        }
        Command::Grid {
            lat,
            lon,
            radius_km,
            resolution_km,
            hours,
            start,
            max_parallel,
        } => {
            let request = HyperlocalRequest {
                center: GridPoint::new(lat, lon),
                radius_km,
                resolution_km,
                start: resolve_time(start.as_deref())?,
                hours,
                weather: config.serving.weather.clone(),
                location: config.location.clone(),
            };
            let max_parallel = max_parallel
                .unwrap_or(config.serving.max_parallel_predictions)
                .max(1);
            let forecast = hyperlocal_forecast(service.clone(), &request, max_parallel)
                .await
                .context("Hyperlocal forecast failed")?;
            print_json(&forecast)?;
        }
    }

    let stats = service.stats();
    info!(
        "Served {} predictions, {} degraded ({:.1}%)",
        stats.served,
        stats.degraded,
        stats.degradation_rate() * 100.0
    );
    Ok(())
}

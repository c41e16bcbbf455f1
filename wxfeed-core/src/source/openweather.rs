use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use crate::{
    Config, Document,
    error::ForecastError,
    model::{
        CurrentPressure, DailyPoint, HourlyPoint, Location, PressureForecast, PressureTrend,
        Tendency,
    },
    source::get_text,
};

use super::Fetcher;

/// Hourly samples 0 and 23 bracket the 24-hour trend.
pub const TREND_SAMPLES: usize = 24;

#[derive(Debug, Clone)]
pub struct ForecastFetcher {
    api_key: String,
    http: Client,
    endpoint: String,
    source: String,
    location: Location,
    horizons: Horizons,
}

/// How much of the upstream series is kept, and what counts as steady.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizons {
    pub hourly: usize,
    pub daily: usize,
    pub steady_threshold_hpa: f64,
}

impl Default for Horizons {
    fn default() -> Self {
        Self { hourly: 48, daily: 8, steady_threshold_hpa: 1.0 }
    }
}

impl ForecastFetcher {
    pub fn new(http: Client, api_key: String, config: &Config) -> Self {
        let forecast = &config.forecast;
        Self {
            api_key,
            http,
            endpoint: forecast.endpoint.clone(),
            source: forecast.source.clone(),
            location: Location {
                lat: config.location.lat,
                lon: config.location.lon,
                name: config.location.name.clone(),
            },
            horizons: Horizons {
                hourly: forecast.hourly_horizon,
                daily: forecast.daily_horizon,
                steady_threshold_hpa: forecast.steady_threshold_hpa,
            },
        }
    }
}

#[async_trait]
impl Fetcher for ForecastFetcher {
    async fn fetch(&self) -> Result<Document> {
        info!(lat = self.location.lat, lon = self.location.lon, "fetching pressure forecast");

        let body = get_text(
            &self.http,
            "OpenWeather",
            &self.endpoint,
            &[
                ("lat", self.location.lat.to_string()),
                ("lon", self.location.lon.to_string()),
                ("exclude", "minutely".to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ],
        )
        .await?;

        let forecast = parse_forecast(
            &body,
            Utc::now(),
            self.source.clone(),
            self.location.clone(),
            self.horizons,
        )?;

        let trend = &forecast.pressure_trends;
        info!(
            current_hpa = forecast.current.pressure_hpa,
            trend = %trend.trend_24h,
            change_hpa = %format!("{:+.1}", trend.pressure_change_24h_hpa),
            hourly = forecast.hourly_forecast.len(),
            daily = forecast.daily_forecast.len(),
            "pressure forecast parsed"
        );

        Ok(Document::Forecast(forecast))
    }
}

/// Turn a One Call response into a [`PressureForecast`].
///
/// The trend needs at least 24 hourly samples; a shorter series is treated as
/// a malformed response rather than published without a trend.
pub fn parse_forecast(
    body: &str,
    timestamp: DateTime<Utc>,
    source: String,
    location: Location,
    horizons: Horizons,
) -> Result<PressureForecast, ForecastError> {
    let parsed: OwOneCallResponse = serde_json::from_str(body)?;

    let current = CurrentPressure {
        time: unix_to_utc(parsed.current.dt)?,
        pressure_hpa: parsed.current.pressure,
        temperature_c: parsed.current.temp,
        humidity_percent: parsed.current.humidity,
        wind_speed_ms: parsed.current.wind_speed,
        wind_deg: parsed.current.wind_deg,
    };

    let hourly_forecast = parsed
        .hourly
        .into_iter()
        .take(horizons.hourly)
        .map(|h| {
            Ok(HourlyPoint {
                time: unix_to_utc(h.dt)?,
                pressure_hpa: h.pressure,
                temperature_c: h.temp,
                humidity_percent: h.humidity,
                wind_speed_ms: h.wind_speed,
                description: description(&h.weather),
            })
        })
        .collect::<Result<Vec<_>, ForecastError>>()?;

    let daily_forecast = parsed
        .daily
        .into_iter()
        .take(horizons.daily)
        .map(|d| {
            Ok(DailyPoint {
                date: unix_to_utc(d.dt)?.date_naive(),
                pressure_hpa: d.pressure,
                temp_min_c: d.temp.min,
                temp_max_c: d.temp.max,
                humidity_percent: d.humidity,
                wind_speed_ms: d.wind_speed,
                description: description(&d.weather),
            })
        })
        .collect::<Result<Vec<_>, ForecastError>>()?;

    let pressure_trends = pressure_trend(&hourly_forecast, horizons.steady_threshold_hpa)?;

    Ok(PressureForecast {
        timestamp,
        source,
        location,
        current,
        pressure_trends,
        hourly_forecast,
        daily_forecast,
    })
}

/// Signed change between the first hourly sample and the one 23 hours later,
/// rounded to 0.1 hPa, and its classification.
pub fn pressure_trend(hourly: &[HourlyPoint], threshold: f64) -> Result<PressureTrend, ForecastError> {
    if hourly.len() < TREND_SAMPLES {
        return Err(ForecastError::TooFewHourly { got: hourly.len(), need: TREND_SAMPLES });
    }

    let current = hourly[0].pressure_hpa;
    let predicted = hourly[TREND_SAMPLES - 1].pressure_hpa;
    let change = ((predicted - current) * 10.0).round() / 10.0;

    Ok(PressureTrend {
        pressure_change_24h_hpa: change,
        trend_24h: Tendency::from_delta(change, threshold),
        current_pressure_hpa: current,
        predicted_pressure_24h_hpa: predicted,
    })
}

fn description(weather: &[OwWeather]) -> String {
    weather.first().map(|w| w.description.clone()).unwrap_or_default()
}

fn unix_to_utc(ts: i64) -> Result<DateTime<Utc>, ForecastError> {
    DateTime::from_timestamp(ts, 0).ok_or(ForecastError::BadTimestamp(ts))
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrent {
    dt: i64,
    pressure: f64,
    temp: f64,
    humidity: Option<u8>,
    wind_speed: Option<f64>,
    wind_deg: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct OwHourly {
    dt: i64,
    pressure: f64,
    temp: f64,
    humidity: Option<u8>,
    wind_speed: Option<f64>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    pressure: f64,
    temp: OwDailyTemp,
    humidity: Option<u8>,
    wind_speed: Option<f64>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwOneCallResponse {
    current: OwCurrent,
    hourly: Vec<OwHourly>,
    daily: Vec<OwDaily>,
}

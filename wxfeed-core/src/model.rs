use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Qualitative pressure change, as reported by the feed or derived from a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tendency {
    Rising,
    Falling,
    Steady,
}

impl Tendency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tendency::Rising => "rising",
            Tendency::Falling => "falling",
            Tendency::Steady => "steady",
        }
    }

    /// Classify a signed pressure change. Anything within `threshold` of zero
    /// (inclusive) is steady.
    pub fn from_delta(delta: f64, threshold: f64) -> Self {
        if delta > threshold {
            Tendency::Rising
        } else if delta < -threshold {
            Tendency::Falling
        } else {
            Tendency::Steady
        }
    }
}

impl fmt::Display for Tendency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tendency {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "rising" => Ok(Tendency::Rising),
            "falling" => Ok(Tendency::Falling),
            "steady" => Ok(Tendency::Steady),
            other => Err(anyhow::anyhow!("Unknown pressure tendency '{other}'")),
        }
    }
}

/// Snapshot written to `current_conditions.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub location: String,
    pub observation_time: String,
    pub conditions: Conditions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub temperature: f64,
    pub pressure_kpa: f64,
    pub pressure_tendency: Tendency,
    pub humidity_percent: u8,
    pub wind_direction: String,
    pub wind_speed_kmh: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_gust_kmh: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_chill: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidex: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dewpoint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_km: Option<f64>,
}

/// Document written to `pressure_forecast.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureForecast {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub location: Location,
    pub current: CurrentPressure,
    pub pressure_trends: PressureTrend,
    pub hourly_forecast: Vec<HourlyPoint>,
    pub daily_forecast: Vec<DailyPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPressure {
    pub time: DateTime<Utc>,
    pub pressure_hpa: f64,
    pub temperature_c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_deg: Option<u16>,
}

/// 24-hour pressure trend derived from the hourly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureTrend {
    pub pressure_change_24h_hpa: f64,
    pub trend_24h: Tendency,
    pub current_pressure_hpa: f64,
    pub predicted_pressure_24h_hpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    pub time: DateTime<Utc>,
    pub pressure_hpa: f64,
    pub temperature_c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub pressure_hpa: f64,
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
    pub description: String,
}

/// Document written to `forecast.json`: the feed's text forecast folded into days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlook {
    pub fetched_at: DateTime<Utc>,
    pub forecast: Vec<OutlookDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlookDay {
    pub day: String,
    pub condition: String,
    pub icon: String,
    pub high: Option<i32>,
    pub low: Option<i32>,
    pub offset: u32,
}

/// Anything a job can publish.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Conditions(CurrentConditions),
    Forecast(PressureForecast),
    Outlook(Outlook),
}

impl Document {
    /// File name under the output directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Document::Conditions(_) => "current_conditions.json",
            Document::Forecast(_) => "pressure_forecast.json",
            Document::Outlook(_) => "forecast.json",
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        match self {
            Document::Conditions(doc) => serde_json::to_string_pretty(doc),
            Document::Forecast(doc) => serde_json::to_string_pretty(doc),
            Document::Outlook(doc) => serde_json::to_string_pretty(doc),
        }
    }
}

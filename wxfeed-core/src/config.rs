use anyhow::{Context, Result, anyhow, ensure};
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::source::openweather::TREND_SAMPLES;

/// Top-level configuration stored on disk.
///
/// Every section has defaults, so an absent file (or an absent section)
/// yields the stock Crowsnest Pass setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the static host serves; documents are written here.
    pub output_dir: PathBuf,
    pub http: HttpConfig,
    pub location: LocationConfig,
    pub conditions: ConditionsConfig,
    pub forecast: ForecastConfig,
    pub outlook: OutlookConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Fixed offset used to decide "today" and day/night in the text forecast.
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionsConfig {
    pub feed_url: String,
    pub source: String,
}

/// Example TOML:
/// [forecast]
/// hourly_horizon = 48
/// steady_threshold_hpa = 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub endpoint: String,
    pub source: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub hourly_horizon: usize,
    pub daily_horizon: usize,
    pub steady_threshold_hpa: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlookConfig {
    pub feed_url: String,
    pub max_days: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            http: HttpConfig::default(),
            location: LocationConfig::default(),
            conditions: ConditionsConfig::default(),
            forecast: ForecastConfig::default(),
            outlook: OutlookConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: "Crowsnest Pass, AB".to_string(),
            lat: 49.63,
            lon: -114.69,
            utc_offset_hours: -7,
        }
    }
}

const EC_FEED_URL: &str = "https://weather.gc.ca/rss/weather/49.631_-114.693_e.xml";

impl Default for ConditionsConfig {
    fn default() -> Self {
        Self { feed_url: EC_FEED_URL.to_string(), source: "Environment Canada".to_string() }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openweathermap.org/data/3.0/onecall".to_string(),
            source: "OpenWeatherMap One Call API 3.0".to_string(),
            api_key_env: "OPENWEATHER_API_KEY".to_string(),
            hourly_horizon: 48,
            daily_horizon: 8,
            steady_threshold_hpa: 1.0,
        }
    }
}

impl Default for OutlookConfig {
    fn default() -> Self {
        Self { feed_url: EC_FEED_URL.to_string(), max_days: 7 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LocationConfig {
    /// The station's fixed offset from UTC. Offsets must stay within ±23 hours.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                anyhow!(
                    "location.utc_offset_hours = {} is out of range (expected -23..=23)",
                    self.utc_offset_hours
                )
            })
    }
}

impl ForecastConfig {
    /// Read the API key from the environment. Keys never live in the config file.
    pub fn api_key(&self) -> Result<String> {
        self.api_key_from(|name| std::env::var(name).ok())
    }

    fn api_key_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        match lookup(&self.api_key_env) {
            Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(anyhow!(
                "No API key found in environment variable {}.\n\
                 Hint: get a key at https://openweathermap.org/api and export it.",
                self.api_key_env
            )),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if the file doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Reject values that would make every run fail or misbehave.
    pub fn validate(&self) -> Result<()> {
        self.location.utc_offset()?;
        ensure!(
            self.forecast.hourly_horizon >= TREND_SAMPLES,
            "forecast.hourly_horizon = {} is too short; the 24h trend needs at least {} hourly samples",
            self.forecast.hourly_horizon,
            TREND_SAMPLES
        );
        Ok(())
    }

    /// Save config, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "wxfeed", "wxfeed")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();

        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.forecast.hourly_horizon, 48);
        assert_eq!(cfg.forecast.daily_horizon, 8);
        assert_eq!(cfg.output_dir, PathBuf::from("data"));
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
output_dir = "public/data"

[forecast]
hourly_horizon = 24
steady_threshold_hpa = 0.5
"#,
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();

        assert_eq!(cfg.output_dir, PathBuf::from("public/data"));
        assert_eq!(cfg.forecast.hourly_horizon, 24);
        assert_eq!(cfg.forecast.steady_threshold_hpa, 0.5);
        assert_eq!(cfg.forecast.daily_horizon, 8);
        assert_eq!(cfg.location.name, "Crowsnest Pass, AB");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "output_dir = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for offset in ["24", "-30", "2147483647"] {
            fs::write(&path, format!("[location]\nutc_offset_hours = {offset}\n")).unwrap();

            let err = Config::load_from(&path).unwrap_err();
            assert!(err.to_string().contains("Invalid config file"));
            assert!(format!("{err:#}").contains("utc_offset_hours"));
        }
    }

    #[test]
    fn utc_offset_in_range() {
        let mut location = LocationConfig::default();
        assert_eq!(location.utc_offset().unwrap(), FixedOffset::west_opt(7 * 3600).unwrap());

        location.utc_offset_hours = 23;
        assert!(location.utc_offset().is_ok());
    }

    #[test]
    fn short_hourly_horizon_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[forecast]\nhourly_horizon = 12\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("hourly_horizon = 12 is too short"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.location.utc_offset_hours = -6;
        cfg.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn api_key_comes_from_lookup() {
        let cfg = ForecastConfig::default();

        let key = cfg
            .api_key_from(|name| (name == "OPENWEATHER_API_KEY").then(|| " KEY ".to_string()))
            .unwrap();
        assert_eq!(key, "KEY");

        let err = cfg.api_key_from(|_| Some(String::new())).unwrap_err();
        assert!(err.to_string().contains("OPENWEATHER_API_KEY"));
    }
}

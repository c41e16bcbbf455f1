//! Environment Canada city-page Atom feed.
//!
//! The feed carries one `Current Conditions` entry whose HTML summary is a
//! list of `<b>Label:</b> value<br/>` lines, followed by one `Weather Forecasts`
//! entry per day and night period.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::{
    Config, Document,
    error::FeedError,
    model::{Conditions, CurrentConditions, Outlook, OutlookDay, Tendency},
    source::get_text,
};

use super::Fetcher;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const CURRENT_CONDITIONS: &str = "Current Conditions";
const WEATHER_FORECASTS: &str = "Weather Forecasts";
const SERVICE: &str = "Environment Canada feed";

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|\n").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());
static PRESSURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*kPa\s*([A-Za-z]+)?").unwrap());
static HUMIDITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*%").unwrap());
static VISIBILITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*km\b").unwrap());
static WIND_SPEED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*km/h").unwrap());
static WIND_DIR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([NSEW]{1,3})\b").unwrap());
static WIND_GUST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)gust(?:s|ing)?(?:\s+to)?\s+(\d+)").unwrap());
static PERIOD_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\b(?:high|low|pop)\b.*$").unwrap());
static HIGH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bhigh\s+(?:(minus|plus)\s+)?(\d+|zero)").unwrap());
static LOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blow\s+(?:(minus|plus)\s+)?(\d+|zero)").unwrap());

/// Fetches the feed and publishes `current_conditions.json`.
#[derive(Debug, Clone)]
pub struct ConditionsFetcher {
    http: Client,
    feed_url: String,
    source: String,
    location: String,
    utc_offset: FixedOffset,
}

impl ConditionsFetcher {
    pub fn new(http: Client, config: &Config) -> Result<Self> {
        Ok(Self {
            http,
            feed_url: config.conditions.feed_url.clone(),
            source: config.conditions.source.clone(),
            location: config.location.name.clone(),
            utc_offset: config.location.utc_offset()?,
        })
    }
}

#[async_trait]
impl Fetcher for ConditionsFetcher {
    async fn fetch(&self) -> Result<Document> {
        info!(url = %self.feed_url, "fetching current conditions");
        let body = get_text(&self.http, SERVICE, &self.feed_url, &[]).await?;

        let now = Utc::now();
        let snapshot = parse_current_conditions(&body, now.with_timezone(&self.utc_offset))?;

        let c = &snapshot.conditions;
        info!(
            condition = c.condition.as_deref().unwrap_or("n/a"),
            temperature = c.temperature,
            pressure_kpa = c.pressure_kpa,
            tendency = %c.pressure_tendency,
            wind = %format!("{} {} km/h", c.wind_direction, c.wind_speed_kmh),
            "current conditions parsed"
        );

        Ok(Document::Conditions(CurrentConditions {
            timestamp: now,
            source: self.source.clone(),
            location: self.location.clone(),
            observation_time: snapshot.observation_time,
            conditions: snapshot.conditions,
        }))
    }
}

/// Fetches the feed and publishes the day-by-day text forecast as `forecast.json`.
#[derive(Debug, Clone)]
pub struct OutlookFetcher {
    http: Client,
    feed_url: String,
    max_days: usize,
}

impl OutlookFetcher {
    pub fn new(http: Client, config: &Config) -> Self {
        Self { http, feed_url: config.outlook.feed_url.clone(), max_days: config.outlook.max_days }
    }
}

#[async_trait]
impl Fetcher for OutlookFetcher {
    async fn fetch(&self) -> Result<Document> {
        info!(url = %self.feed_url, "fetching text forecast");
        let body = get_text(&self.http, SERVICE, &self.feed_url, &[]).await?;

        let forecast = parse_outlook(&body, self.max_days)?;
        info!(days = forecast.len(), "text forecast parsed");

        Ok(Document::Outlook(Outlook { fetched_at: Utc::now(), forecast }))
    }
}

/// The parts of `CurrentConditions` that come from the feed itself.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub observation_time: String,
    pub conditions: Conditions,
}

#[derive(Debug, Clone, Default)]
struct Entry {
    title: String,
    summary: String,
    updated: Option<String>,
    category: Option<String>,
}

impl Entry {
    fn is_forecast(&self) -> bool {
        self.category.as_deref() == Some(WEATHER_FORECASTS)
    }

    fn is_night(&self) -> bool {
        self.title.to_lowercase().contains("night")
    }
}

/// Parse the current conditions out of a feed document.
///
/// `now` is local time at the station; it picks which forecast period fills in
/// the condition text and gust when the observation lacks them.
pub fn parse_current_conditions(
    xml: &str,
    now: DateTime<FixedOffset>,
) -> Result<FeedSnapshot, FeedError> {
    let entries = parse_entries(xml)?;

    let entry = entries
        .iter()
        .find(|e| e.title.contains(CURRENT_CONDITIONS))
        .ok_or(FeedError::MissingEntry(CURRENT_CONDITIONS))?;
    debug!(title = %entry.title, "found current conditions entry");

    let fields = summary_fields(&entry.summary);
    let mut conditions = parse_fields(&fields)?;

    if conditions.condition.is_none() {
        conditions.condition =
            current_period(&entries, now).and_then(|e| period_condition(&e.title));
    }

    if conditions.wind_gust_kmh.is_none() {
        conditions.wind_gust_kmh = forecast_gust(&entries, now);
        if let Some(gust) = conditions.wind_gust_kmh {
            debug!(gust, "using forecast gust");
        }
    }

    Ok(FeedSnapshot {
        observation_time: entry.updated.clone().unwrap_or_else(|| "Unknown".to_string()),
        conditions,
    })
}

/// Fold the forecast periods into at most `max_days` days.
///
/// Leading night periods (the rest of tonight) are dropped, a day followed by
/// its night is merged, and orphan night periods are skipped.
pub fn parse_outlook(xml: &str, max_days: usize) -> Result<Vec<OutlookDay>, FeedError> {
    let entries = parse_entries(xml)?;
    let periods: Vec<&Entry> = entries
        .iter()
        .filter(|e| e.is_forecast())
        .skip_while(|e| e.is_night())
        .collect();

    if periods.is_empty() {
        return Err(FeedError::MissingEntry(WEATHER_FORECASTS));
    }

    let mut days = Vec::new();
    let mut i = 0;
    let mut offset = 0;

    while i < periods.len() && days.len() < max_days {
        let cur = periods[i];
        let next = periods.get(i + 1).filter(|e| e.is_night());

        if cur.is_night() {
            i += 1;
        } else {
            let day = cur.title.split_whitespace().next().unwrap_or_default();
            let condition = period_condition(&cur.title).unwrap_or_default();
            days.push(OutlookDay {
                day: day.trim_end_matches(':').to_string(),
                icon: icon_for(&condition).to_string(),
                condition,
                high: temperature_after(&HIGH, &cur.title),
                low: next.and_then(|n| temperature_after(&LOW, &n.title)),
                offset,
            });
            i += if next.is_some() { 2 } else { 1 };
        }
        offset += 1;
    }

    Ok(days)
}

fn parse_entries(xml: &str) -> Result<Vec<Entry>, FeedError> {
    let doc = roxmltree::Document::parse(xml)?;

    let entries = doc
        .descendants()
        .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
        .map(|entry| {
            let child = |name: &str| entry.children().find(|c| c.has_tag_name((ATOM_NS, name)));
            let text = |name: &str| {
                child(name).map(|c| {
                    c.descendants()
                        .filter(|n| n.is_text())
                        .filter_map(|n| n.text())
                        .collect::<String>()
                })
            };

            Entry {
                title: text("title").unwrap_or_default().trim().to_string(),
                summary: text("summary").unwrap_or_default(),
                updated: text("updated").map(|s| s.trim().to_string()),
                category: child("category").and_then(|c| c.attribute("term")).map(str::to_string),
            }
        })
        .collect();

    Ok(entries)
}

/// Split an HTML summary into lowercase `label` / `value` pairs.
///
/// `Pressure / Tendency` becomes `pressure`.
fn summary_fields(summary: &str) -> Vec<(String, String)> {
    LINE_BREAK
        .split(summary)
        .filter_map(|line| {
            let text = decode_entities(&TAG.replace_all(line, " "));
            let (label, value) = text.split_once(':')?;
            let label = label.split('/').next().unwrap_or(label).trim().to_lowercase();
            Some((label, value.trim().to_string()))
        })
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&deg;", "°")
        .replace("&nbsp;", " ")
        .replace("&#176;", "°")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn field<'a>(fields: &'a [(String, String)], label: &str) -> Option<&'a str> {
    fields.iter().find(|(l, _)| l == label).map(|(_, v)| v.as_str())
}

fn invalid(field: &'static str, value: &str) -> FeedError {
    FeedError::InvalidField { field, value: value.to_string() }
}

fn number(name: &'static str, value: &str) -> Result<f64, FeedError> {
    NUMBER
        .find(value)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| invalid(name, value))
}

fn required(fields: &[(String, String)], name: &'static str) -> Result<f64, FeedError> {
    let value = field(fields, name).ok_or(FeedError::MissingField(name))?;
    number(name, value)
}

fn optional(fields: &[(String, String)], name: &'static str) -> Result<Option<f64>, FeedError> {
    field(fields, name).map(|v| number(name, v)).transpose()
}

fn parse_fields(fields: &[(String, String)]) -> Result<Conditions, FeedError> {
    let temperature = required(fields, "temperature")?;

    let pressure = field(fields, "pressure").ok_or(FeedError::MissingField("pressure"))?;
    let caps = PRESSURE.captures(pressure).ok_or_else(|| invalid("pressure", pressure))?;
    let pressure_kpa: f64 = caps[1].parse().map_err(|_| invalid("pressure", pressure))?;
    let tendency = caps.get(2).ok_or(FeedError::MissingField("pressure tendency"))?;
    let pressure_tendency: Tendency =
        tendency.as_str().parse().map_err(|_| invalid("pressure tendency", pressure))?;

    let humidity = field(fields, "humidity").ok_or(FeedError::MissingField("humidity"))?;
    let humidity_percent = HUMIDITY
        .captures(humidity)
        .and_then(|c| c[1].parse::<u8>().ok())
        .filter(|h| *h <= 100)
        .ok_or_else(|| invalid("humidity", humidity))?;

    let visibility_km = match field(fields, "visibility") {
        Some(v) => Some(
            VISIBILITY
                .captures(v)
                .and_then(|c| c[1].parse().ok())
                .ok_or_else(|| invalid("visibility", v))?,
        ),
        None => None,
    };

    let wind = field(fields, "wind").ok_or(FeedError::MissingField("wind"))?;
    let (wind_direction, wind_speed_kmh, wind_gust_kmh) = parse_wind(wind)?;

    let condition = field(fields, "condition")
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("not observed"))
        .map(str::to_string);

    Ok(Conditions {
        condition,
        temperature,
        pressure_kpa,
        pressure_tendency,
        humidity_percent,
        wind_direction,
        wind_speed_kmh,
        wind_gust_kmh,
        wind_chill: optional(fields, "wind chill")?,
        humidex: optional(fields, "humidex")?,
        dewpoint: optional(fields, "dewpoint")?,
        visibility_km,
    })
}

fn parse_wind(wind: &str) -> Result<(String, u32, Option<u32>), FeedError> {
    if wind.to_lowercase().contains("calm") {
        return Ok(("CALM".to_string(), 0, None));
    }

    let speed = WIND_SPEED
        .captures(wind)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(|| invalid("wind speed", wind))?;
    let direction = WIND_DIR
        .captures(wind)
        .map(|c| c[1].to_uppercase())
        .ok_or_else(|| invalid("wind direction", wind))?;
    let gust = WIND_GUST.captures(wind).and_then(|c| c[1].parse().ok());

    Ok((direction, speed, gust))
}

/// The forecast period covering `now`: today's day entry, or tonight's between
/// 18:00 and 06:00.
fn matching_period(entries: &[Entry], now: DateTime<FixedOffset>) -> Option<&Entry> {
    let night = now.hour() >= 18 || now.hour() < 6;
    let today = now.format("%A").to_string().to_lowercase();

    entries.iter().filter(|e| e.is_forecast()).find(|e| {
        e.title.to_lowercase().contains(&today)
            && e.is_night() == night
            && period_condition(&e.title).is_some()
    })
}

fn current_period(entries: &[Entry], now: DateTime<FixedOffset>) -> Option<&Entry> {
    matching_period(entries, now).or_else(|| {
        entries.iter().filter(|e| e.is_forecast()).find(|e| period_condition(&e.title).is_some())
    })
}

fn forecast_gust(entries: &[Entry], now: DateTime<FixedOffset>) -> Option<u32> {
    let entry = matching_period(entries, now)?;
    let summary = decode_entities(&entry.summary);
    WIND_GUST.captures(&summary).and_then(|c| c[1].parse().ok())
}

/// `Monday: Mainly cloudy. High 12.` → `Mainly cloudy`.
fn period_condition(title: &str) -> Option<String> {
    let (_, rest) = title.split_once(':')?;
    let condition = PERIOD_TAIL.replace(rest, "");
    let condition = condition.trim().trim_end_matches('.').trim();

    (!condition.is_empty()).then(|| condition.to_string())
}

/// `High minus 3` → -3, `Low zero` → 0.
fn temperature_after(pattern: &Regex, title: &str) -> Option<i32> {
    let caps = pattern.captures(title)?;
    let value: i32 = match &caps[2] {
        z if z.eq_ignore_ascii_case("zero") => 0,
        digits => digits.parse().ok()?,
    };

    match caps.get(1) {
        Some(sign) if sign.as_str().eq_ignore_ascii_case("minus") => Some(-value),
        _ => Some(value),
    }
}

fn icon_for(condition: &str) -> &'static str {
    let c = condition.to_lowercase();
    let has = |word: &str| c.contains(word);

    if c.is_empty() {
        "🌡️"
    } else if has("sunny") || has("clear") {
        "☀️"
    } else if has("partly") && has("cloud") {
        "⛅"
    } else if has("cloudy") || has("overcast") {
        "☁️"
    } else if has("rain") && has("snow") {
        "🌨️"
    } else if has("rain") || has("shower") {
        "🌧️"
    } else if has("snow") || has("flurr") {
        "❄️"
    } else if has("thunder") || has("storm") {
        "⛈️"
    } else if has("fog") || has("mist") {
        "🌫️"
    } else if has("wind") {
        "💨"
    } else if has("mix") {
        "🌨️"
    } else {
        "🌤️"
    }
}

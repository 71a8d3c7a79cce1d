use std::fmt::{self, Write as _};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Longest daily forecast the free provider plan serves.
pub const FREE_TIER_MAX_DAYS: u32 = 5;
/// Longest hourly forecast the free provider plan serves.
pub const FREE_TIER_MAX_HOURS: u32 = 12;

const HUMAN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Requested forecast span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForecastRange {
    Days(u32),
    Hours(u32),
}

impl ForecastRange {
    /// The count the user asked for.
    pub fn requested(&self) -> u32 {
        match *self {
            ForecastRange::Days(n) | ForecastRange::Hours(n) => n,
        }
    }

    pub fn tier_cap(&self) -> u32 {
        match self {
            ForecastRange::Days(_) => FREE_TIER_MAX_DAYS,
            ForecastRange::Hours(_) => FREE_TIER_MAX_HOURS,
        }
    }

    /// Count encoded in the endpoint path.
    ///
    /// The provider only exposes a single-unit endpoint and a tier-cap endpoint,
    /// so anything above one is served from the cap endpoint.
    pub fn endpoint_count(&self) -> u32 {
        if self.requested() <= 1 { 1 } else { self.tier_cap() }
    }

    /// Number of entries kept from the provider response: the original request,
    /// bounded by the tier cap. Counts below one behave like one.
    pub fn entries_to_keep(&self) -> usize {
        self.requested().clamp(1, self.tier_cap()) as usize
    }

    /// Path segment below `forecasts/v1/`, e.g. `daily/5day`.
    pub fn endpoint_segment(&self) -> String {
        let n = self.endpoint_count();
        match self {
            ForecastRange::Days(_) => format!("daily/{n}day"),
            ForecastRange::Hours(_) => format!("hourly/{n}hour"),
        }
    }
}

/// A validated forecast request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastQuery {
    city: String,
    range: ForecastRange,
}

impl ForecastQuery {
    /// Build a query from optional day and hour counts.
    ///
    /// Days take precedence; hours are only looked at when days are absent.
    /// A zero count is accepted and served as a single day or hour.
    pub fn new(
        city: impl Into<String>,
        days: Option<u32>,
        hours: Option<u32>,
    ) -> Result<Self, FetchError> {
        let city = city.into();
        if city.trim().is_empty() {
            return Err(FetchError::InvalidQuery("city is required".to_string()));
        }

        let range = match (days, hours) {
            (Some(d), _) => ForecastRange::Days(d),
            (None, Some(h)) => ForecastRange::Hours(h),
            (None, None) => {
                return Err(FetchError::InvalidQuery("days or hours required".to_string()));
            }
        };

        Ok(Self { city, range })
    }

    pub fn days(city: impl Into<String>, days: u32) -> Result<Self, FetchError> {
        Self::new(city, Some(days), None)
    }

    pub fn hours(city: impl Into<String>, hours: u32) -> Result<Self, FetchError> {
        Self::new(city, None, Some(hours))
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn range(&self) -> ForecastRange {
        self.range
    }
}

/// A temperature reading as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Unit")]
    pub unit: String,
}

impl Temperature {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self { value, unit: unit.into() }
    }

    /// Value in degrees Celsius. Anything not marked "F" is taken as Celsius.
    pub fn celsius(&self) -> f64 {
        if self.unit.eq_ignore_ascii_case("F") {
            fahrenheit_to_celsius(self.value)
        } else {
            self.value
        }
    }
}

pub fn fahrenheit_to_celsius(value: f64) -> f64 {
    (value - 32.0) * 5.0 / 9.0
}

/// Sky condition for half of a forecast day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub text: String,
    pub has_precipitation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    pub date: String,
    pub min_temp: Temperature,
    pub max_temp: Temperature,
    pub day: Condition,
    pub night: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    pub date_time: String,
    pub temp: Temperature,
    pub is_daylight: bool,
    pub has_precipitation: bool,
    pub precipitation_probability: f64,
}

/// Normalized forecast, either daily or hourly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForecastReport {
    Daily(Vec<DailyEntry>),
    Hourly(Vec<HourlyEntry>),
}

impl ForecastReport {
    pub fn len(&self) -> usize {
        match self {
            ForecastReport::Daily(entries) => entries.len(),
            ForecastReport::Hourly(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the fixed-layout text block sent back to the user.
    /// All temperatures come out in Celsius.
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = match self {
            ForecastReport::Daily(entries) => {
                entries.iter().try_for_each(|e| write_daily(&mut out, e))
            }
            ForecastReport::Hourly(entries) => {
                entries.iter().try_for_each(|e| write_hourly(&mut out, e))
            }
        };
        out
    }
}

fn write_daily(out: &mut String, entry: &DailyEntry) -> fmt::Result {
    writeln!(out, "Date: {}", human_readable_date(&entry.date))?;
    writeln!(out, "Min Temp: {:.2} C", entry.min_temp.celsius())?;
    writeln!(out, "Max Temp: {:.2} C", entry.max_temp.celsius())?;
    writeln!(
        out,
        "Day: \n\tWeather: {} \n\tPrecipitation: {}",
        entry.day.text, entry.day.has_precipitation
    )?;
    writeln!(
        out,
        "Night: \n\tWeather: {} \n\tPrecipitation: {}",
        entry.night.text, entry.night.has_precipitation
    )?;
    writeln!(out)
}

fn write_hourly(out: &mut String, entry: &HourlyEntry) -> fmt::Result {
    writeln!(out, "Date: {}", human_readable_date(&entry.date_time))?;
    writeln!(out, "Temp: {:.2} C", entry.temp.celsius())?;
    writeln!(out, "Daylight: {}", entry.is_daylight)?;
    writeln!(out, "Precipitation: {}", entry.has_precipitation)?;
    writeln!(out, "Precipitation Probability: {:.2}", entry.precipitation_probability)?;
    writeln!(out)
}

/// Format an RFC3339 timestamp as `YYYY-MM-DD HH:MM:SS` in its own offset,
/// returning the input unchanged when it does not parse.
pub fn human_readable_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format(HUMAN_DATE_FORMAT).to_string())
        .unwrap_or_else(|_| raw.to_string())
}

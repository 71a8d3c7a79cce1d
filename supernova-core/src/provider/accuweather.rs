use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::LocationCache,
    error::FetchError,
    model::{
        Condition, DailyEntry, ForecastQuery, ForecastRange, ForecastReport, HourlyEntry,
        Temperature,
    },
    provider::{cancellable, truncate_body},
};

use super::ForecastProvider;

pub const DEFAULT_BASE_URL: &str = "http://dataservice.accuweather.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// AccuWeather forecast client.
///
/// Resolves cities to location keys (cached for the lifetime of the service),
/// fetches daily or hourly forecasts and renders them as text.
#[derive(Debug, Clone)]
pub struct ForecastService {
    api_key: String,
    http: Client,
    base_url: Url,
    cache: Arc<LocationCache>,
}

/// A forecast URL together with the range it was built for.
///
/// The response shape depends on the range, so the decoder is driven by
/// `range` rather than by inspecting the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRequest {
    pub url: Url,
    pub range: ForecastRange,
}

impl ForecastService {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build AccuWeather HTTP client")?;

        Ok(Self {
            api_key,
            http,
            base_url: parse_base_url(base_url)?,
            cache: Arc::new(LocationCache::new()),
        })
    }

    /// Share a location cache with other service instances.
    pub fn with_cache(mut self, cache: Arc<LocationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<LocationCache> {
        &self.cache
    }

    /// Look up the provider location key for `city`, hitting the network only
    /// on a cache miss.
    pub async fn resolve_location_key(&self, city: &str) -> Result<String, FetchError> {
        if let Some(key) = self.cache.get(city).await {
            tracing::debug!(city, key = %key, "location key cache hit");
            return Ok(key);
        }

        let mut url = self.endpoint("locations/v1/search")?;
        url.query_pairs_mut()
            .append_pair("q", &city.to_lowercase())
            .append_pair("apikey", &self.api_key);

        let body = self.get_body(url, "location search").await?;

        let locations: Vec<AwLocation> = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(city, body = %truncate_body(&body), "failed to parse location search response: {e}");
            FetchError::Decode(format!("location search: {e}"))
        })?;

        let key = match locations.into_iter().next() {
            Some(location) => location.key,
            None => {
                tracing::warn!(city, "no locations found");
                return Err(FetchError::NotFound(city.to_string()));
            }
        };

        self.cache.insert(city, key.clone()).await;
        tracing::debug!(city, key = %key, "location key cached");

        Ok(key)
    }

    /// Build the forecast URL for `query`, resolving the location first.
    pub async fn build_forecast_url(
        &self,
        query: &ForecastQuery,
    ) -> Result<ForecastRequest, FetchError> {
        let location_key = self.resolve_location_key(query.city()).await?;
        let range = query.range();

        let path = format!("forecasts/v1/{}/{}", range.endpoint_segment(), location_key);
        let mut url = self.endpoint(&path)?;
        url.query_pairs_mut().append_pair("apikey", &self.api_key);

        Ok(ForecastRequest { url, range })
    }

    /// Fetch and normalize the forecast for `query`.
    pub async fn fetch_report(&self, query: &ForecastQuery) -> Result<ForecastReport, FetchError> {
        let request = self.build_forecast_url(query).await?;
        let body = self.get_body(request.url, "forecast").await?;

        decode_report(request.range, &body).inspect_err(|e| {
            tracing::error!(
                city = query.city(),
                body = %truncate_body(&body),
                "failed to parse forecast response: {e}"
            );
        })
    }

    /// Fetch the forecast and render it, giving up early if `cancel` fires.
    pub async fn fetch(
        &self,
        query: &ForecastQuery,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let report = cancellable(cancel, self.fetch_report(query)).await?;
        tracing::info!(city = query.city(), entries = report.len(), "forecast fetched");
        Ok(report.render())
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::InvalidQuery(format!("invalid request path '{path}': {e}")))
    }

    async fn get_body(&self, url: Url, what: &str) -> Result<String, FetchError> {
        let res = self.http.get(url).send().await.map_err(|e| {
            tracing::error!("AccuWeather {what} request failed: {e}");
            FetchError::from(e)
        })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            tracing::error!("failed to read AccuWeather {what} response body: {e}");
            FetchError::from(e)
        })?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %truncate_body(&body), "AccuWeather {what} request rejected");
            return Err(FetchError::Transport(format!(
                "AccuWeather {what} request failed with status {status}"
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl ForecastProvider for ForecastService {
    async fn forecast(
        &self,
        query: &ForecastQuery,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        self.fetch(query, cancel).await
    }
}

/// Decode a forecast body of the shape implied by `range` and truncate it to
/// the requested number of entries.
pub fn decode_report(range: ForecastRange, body: &str) -> Result<ForecastReport, FetchError> {
    let keep = range.entries_to_keep();

    let report = match range {
        ForecastRange::Days(_) => {
            let parsed: AwDailyForecasts = serde_json::from_str(body)
                .map_err(|e| FetchError::Decode(format!("daily forecast: {e}")))?;
            let mut entries: Vec<DailyEntry> =
                parsed.daily_forecasts.into_iter().map(DailyEntry::from).collect();
            entries.truncate(keep);
            ForecastReport::Daily(entries)
        }
        ForecastRange::Hours(_) => {
            let parsed: Vec<AwHourlyForecast> = serde_json::from_str(body)
                .map_err(|e| FetchError::Decode(format!("hourly forecast: {e}")))?;
            let mut entries: Vec<HourlyEntry> =
                parsed.into_iter().map(HourlyEntry::from).collect();
            entries.truncate(keep);
            ForecastReport::Hourly(entries)
        }
    };

    if report.is_empty() {
        return Err(FetchError::Decode(
            "forecast response contained no entries".to_string(),
        ));
    }

    Ok(report)
}

fn parse_base_url(raw: &str) -> Result<Url> {
    // Without a trailing slash `join` would replace the last path segment.
    let normalized = if raw.ends_with('/') { raw.to_string() } else { format!("{raw}/") };
    Url::parse(&normalized).with_context(|| format!("Invalid AccuWeather base URL: {raw}"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwLocation {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwDailyForecasts {
    daily_forecasts: Vec<AwDailyForecast>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwTemperatureRange {
    minimum: Temperature,
    maximum: Temperature,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwHalfDay {
    #[serde(default)]
    icon_phrase: String,
    #[serde(default)]
    has_precipitation: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwDailyForecast {
    date: String,
    temperature: AwTemperatureRange,
    day: AwHalfDay,
    night: AwHalfDay,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwHourlyForecast {
    date_time: String,
    temperature: Temperature,
    #[serde(default)]
    is_daylight: bool,
    #[serde(default)]
    has_precipitation: bool,
    #[serde(default)]
    precipitation_probability: f64,
}

impl From<AwHalfDay> for Condition {
    fn from(half: AwHalfDay) -> Self {
        Condition { text: half.icon_phrase, has_precipitation: half.has_precipitation }
    }
}

impl From<AwDailyForecast> for DailyEntry {
    fn from(day: AwDailyForecast) -> Self {
        DailyEntry {
            date: day.date,
            min_temp: day.temperature.minimum,
            max_temp: day.temperature.maximum,
            day: day.day.into(),
            night: day.night.into(),
        }
    }
}

impl From<AwHourlyForecast> for HourlyEntry {
    fn from(hour: AwHourlyForecast) -> Self {
        HourlyEntry {
            date_time: hour.date_time,
            temp: hour.temperature,
            is_daylight: hour.is_daylight,
            has_precipitation: hour.has_precipitation,
            precipitation_probability: hour.precipitation_probability,
        }
    }
}

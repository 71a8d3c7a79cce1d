use crate::{
    Config, FetchError, ForecastQuery,
    provider::{accuweather::ForecastService, openai::ChatService},
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, future::Future};
use tokio_util::sync::CancellationToken;

pub mod accuweather;
pub mod openai;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    AccuWeather,
    OpenAi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::AccuWeather => "accuweather",
            ProviderId::OpenAi => "openai",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::AccuWeather, ProviderId::OpenAi]
    }

    /// Environment variable that overrides the configured API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderId::AccuWeather => "ACCU_WEATHER_API_KEY",
            ProviderId::OpenAi => "OPEN_AI_API_KEY",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "accuweather" => Ok(ProviderId::AccuWeather),
            "openai" => Ok(ProviderId::OpenAi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: accuweather, openai."
            )),
        }
    }
}

/// Something that turns a forecast query into a rendered report.
#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn forecast(
        &self,
        query: &ForecastQuery,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError>;
}

/// Something that answers a free-text prompt.
#[async_trait]
pub trait ChatProvider: Send + Sync + Debug {
    async fn complete(&self, prompt: &str, cancel: &CancellationToken)
    -> Result<String, FetchError>;
}

/// Construct the forecast provider from config.
pub fn forecast_provider_from_config(config: &Config) -> anyhow::Result<Box<dyn ForecastProvider>> {
    let id = ProviderId::AccuWeather;
    let api_key = require_api_key(config, id)?;

    let service = match config.provider_base_url(id) {
        Some(base) => ForecastService::with_base_url(api_key.to_owned(), base)?,
        None => ForecastService::new(api_key.to_owned())?,
    };

    Ok(Box::new(service))
}

/// Construct the chat provider from config.
pub fn chat_provider_from_config(config: &Config) -> anyhow::Result<Box<dyn ChatProvider>> {
    let id = ProviderId::OpenAi;
    let api_key = require_api_key(config, id)?;

    let mut service = match config.provider_base_url(id) {
        Some(base) => ChatService::with_base_url(api_key.to_owned(), base)?,
        None => ChatService::new(api_key.to_owned())?,
    };
    if let Some(model) = config.chat_model.as_deref() {
        service = service.with_model(model);
    }

    Ok(Box::new(service))
}

fn require_api_key(config: &Config, id: ProviderId) -> anyhow::Result<&str> {
    config.provider_api_key(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `supernova configure {id}` or set {}.",
            id.api_key_env()
        )
    })
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        res = fut => res,
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

//! Core library for the `supernova` chat bot.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The AccuWeather forecast service (location lookup, range clamping,
//!   response normalization, text rendering)
//! - The chat-completions client
//! - Shared domain models and the error taxonomy
//!
//! It is used by `supernova-bot`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;

pub use cache::LocationCache;
pub use config::{Config, ProviderConfig};
pub use error::FetchError;
pub use model::{
    DailyEntry, FREE_TIER_MAX_DAYS, FREE_TIER_MAX_HOURS, ForecastQuery, ForecastRange,
    ForecastReport, HourlyEntry, Temperature,
};
pub use provider::{
    ChatProvider, ForecastProvider, ProviderId, accuweather::ForecastService, openai::ChatService,
};
pub use tokio_util::sync::CancellationToken;

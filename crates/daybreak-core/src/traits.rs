//! Seams between the briefing core and its collaborators.
//!
//! Data sources and delivery are async (they run on the primary tokio
//! context). The config store and recorder are synchronous: both sit on a
//! local SQLite handle and must be callable from the poller thread too.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    BriefingArtifact, ClosingPrice, HoldingsResult, MoversResult, Quote, RunRecord,
    WeatherSnapshot,
};

/// Market data: mover scans, single quotes and short histories.
#[async_trait]
pub trait MarketSource: Send + Sync {
    fn name(&self) -> &str;

    /// Scan the index and return its top movers.
    async fn fetch_market_movers(&self) -> Result<MoversResult>;

    /// Latest price and daily move for one ticker.
    async fn fetch_quote(&self, ticker: &str) -> Result<Quote>;

    /// Daily closes over the last `days` sessions, oldest first.
    async fn fetch_history(&self, ticker: &str, days: u32) -> Result<Vec<ClosingPrice>>;
}

/// Local inference service.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`. Empty output is an error.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;

    /// Whether the service answers and serves the configured model.
    async fn health_check(&self) -> Result<bool>;
}

/// Valuation of the user's holdings.
#[async_trait]
pub trait HoldingsSource: Send + Sync {
    async fn fetch_holdings_valuation(&self) -> Result<HoldingsResult>;
}

/// Current weather conditions.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_weather(&self, location: &str) -> Result<WeatherSnapshot>;
}

/// Outbound channel for briefings and critical alerts.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, artifact: &BriefingArtifact) -> Result<()>;

    /// Best-effort: callers log and swallow the error.
    async fn send_alert(&self, message: &str) -> Result<()>;
}

/// Runtime key/value settings.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// `get` with a fallback.
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Numeric `get`; unparseable or missing values yield `default`.
    fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("⚠️ Config '{}' is not a number ('{}'), using {}", key, raw, default);
                default
            }),
            None => default,
        }
    }
}

/// Append-only audit trail of briefing runs. Never fails: implementations
/// log their own persistence errors.
pub trait RunRecorder: Send + Sync {
    fn record(&self, record: RunRecord);
}

/// Well-known config store keys.
pub mod keys {
    pub const SCHEDULE_TIME_OF_DAY: &str = "schedule.time_of_day";
    pub const WIND_THRESHOLD: &str = "moto_score.wind_threshold";
    pub const RAIN_THRESHOLD: &str = "moto_score.rain_threshold";
    pub const WEATHER_LOCATION: &str = "weather.location";
}

//! Daybreak configuration system.
//!
//! Process-level settings live in a TOML file (`~/.daybreak/config.toml`).
//! Runtime-tunable values (briefing time, score thresholds, location) live in
//! the SQLite config store instead, see [`crate::db`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DaybreakError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaybreakConfig {
    /// IANA zone the briefing time is expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Directory holding the database and logs.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

fn default_timezone() -> String { "Europe/Paris".into() }
fn default_data_dir() -> String { "~/.daybreak".into() }

impl Default for DaybreakConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            data_dir: default_data_dir(),
            scheduler: SchedulerConfig::default(),
            pipeline: PipelineConfig::default(),
            inference: InferenceConfig::default(),
            weather: WeatherConfig::default(),
            market: MarketConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl DaybreakConfig {
    /// Load config from the default path (~/.daybreak/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DaybreakError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DaybreakError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config.with_env_overrides())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Daybreak home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".daybreak")
    }

    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    /// SQLite database location.
    pub fn database_path(&self) -> PathBuf {
        self.data_path().join("daybreak.db")
    }

    /// Rolling log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.data_path().join("logs")
    }

    /// Parsed briefing time zone.
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| DaybreakError::Config(format!("Unknown timezone '{}': {e}", self.timezone)))
    }

    /// Fill empty secrets and endpoints from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        fill_from_env(&mut self.delivery.discord_webhook_url, "DISCORD_WEBHOOK_URL");
        fill_from_env(&mut self.delivery.webhook_url, "DAYBREAK_WEBHOOK_URL");
        fill_from_env(&mut self.weather.api_key, "OPENWEATHER_API_KEY");
        if let Ok(host) = std::env::var("OLLAMA_HOST")
            && !host.is_empty()
            && self.inference.host == default_inference_host()
        {
            self.inference.host = host;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL")
            && !model.is_empty()
            && self.inference.model == default_inference_model()
        {
            self.inference.model = model;
        }
        self
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.is_empty() {
        if let Ok(value) = std::env::var(var) {
            *slot = value;
        }
    }
}

/// Scheduler cadence and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_run_ceiling")]
    pub run_ceiling_secs: u64,
    /// Used when the config store has no `schedule.time_of_day`.
    #[serde(default = "default_time")]
    pub default_time: String,
    /// How often the daemon re-reads the stored briefing time.
    #[serde(default = "default_config_watch")]
    pub config_watch_secs: u64,
}

fn default_poll_interval() -> u64 { 30 }
fn default_run_ceiling() -> u64 { 300 }
fn default_time() -> String { "07:30".into() }
fn default_config_watch() -> u64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            run_ceiling_secs: default_run_ceiling(),
            default_time: default_time(),
            config_watch_secs: default_config_watch(),
        }
    }
}

/// Pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for any non-inference stage.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
}

fn default_stage_timeout() -> u64 { 120 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { stage_timeout_secs: default_stage_timeout() }
    }
}

/// Local inference (Ollama) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_host")]
    pub host: String,
    #[serde(default = "default_inference_model")]
    pub model: String,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_inference_host() -> String { "http://localhost:11434".into() }
fn default_inference_model() -> String { "mistral:7b".into() }
fn default_inference_timeout() -> u64 { 60 }
fn default_max_tokens() -> u32 { 500 }

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            host: default_inference_host(),
            model: default_inference_model(),
            timeout_secs: default_inference_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// OpenWeatherMap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_location")]
    pub default_location: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_weather_endpoint")]
    pub endpoint: String,
}

fn default_location() -> String { "Marseille".into() }
fn default_country() -> String { "FR".into() }
fn default_weather_endpoint() -> String { "https://api.openweathermap.org/data/2.5/weather".into() }

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_location: default_location(),
            country: default_country(),
            endpoint: default_weather_endpoint(),
        }
    }
}

/// Market scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_market_endpoint")]
    pub endpoint: String,
    /// Pause between two quote requests.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

fn default_market_endpoint() -> String { "https://query1.finance.yahoo.com/v8/finance/chart".into() }
fn default_request_delay() -> u64 { 500 }
fn default_top_n() -> usize { 5 }
fn default_history_days() -> u32 { 5 }

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            endpoint: default_market_endpoint(),
            request_delay_ms: default_request_delay(),
            top_n: default_top_n(),
            history_days: default_history_days(),
        }
    }
}

/// Delivery targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub discord_webhook_url: String,
    /// Generic JSON webhook, used when no Discord webhook is set.
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_username")]
    pub username: String,
}

fn default_username() -> String { "Daybreak Briefing".into() }

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: String::new(),
            webhook_url: String::new(),
            username: default_username(),
        }
    }
}

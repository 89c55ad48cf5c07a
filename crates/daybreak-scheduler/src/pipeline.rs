//! Best-effort briefing pipeline.
//!
//! Stages run strictly in order. Each one is wrapped in a boundary that turns
//! an error, a timeout or a panic into a tagged error (`"<stage>: <reason>"`)
//! plus a neutral fallback, so one invocation always yields one artifact.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use daybreak_core::config::DaybreakConfig;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::traits::{
    ConfigStore, HoldingsSource, InferenceProvider, MarketSource, WeatherSource, keys,
};
use daybreak_core::types::{BriefingArtifact, HoldingsResult, MoversResult};
use futures::FutureExt;

use crate::compose::{BriefingInputs, compose};
use crate::handoff::panic_message;
use crate::prompts;
use crate::scoring::{RideThresholds, score_ride};

/// Placeholder used when no market commentary could be produced.
pub const COMMENTARY_PLACEHOLDER: &str = "analysis unavailable";

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult<T> {
    Ok(T),
    Failed(String),
}

impl<T> StageResult<T> {
    /// Value or fallback; a failure is pushed onto `errors` as `"<stage>: <reason>"`.
    fn or_record(self, stage: &str, errors: &mut Vec<String>, fallback: impl FnOnce() -> T) -> T {
        match self {
            StageResult::Ok(v) => v,
            StageResult::Failed(reason) => {
                errors.push(format!("{stage}: {reason}"));
                fallback()
            }
        }
    }
}

/// Run one stage inside the failure boundary.
pub async fn run_stage<T, F>(stage: &str, limit: Duration, fut: F) -> StageResult<T>
where
    F: Future<Output = Result<T>>,
{
    let result = match tokio::time::timeout(limit, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => StageResult::Failed(format!("timed out after {limit:?}")),
        Ok(Err(panic)) => StageResult::Failed(format!("panicked: {}", panic_message(&*panic))),
        Ok(Ok(Err(e))) => StageResult::Failed(e.to_string()),
        Ok(Ok(Ok(v))) => StageResult::Ok(v),
    };
    if let StageResult::Failed(reason) = &result {
        tracing::warn!("⚠️ Stage '{}' failed: {}", stage, reason);
    }
    result
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub stage_timeout: Duration,
    pub inference_timeout: Duration,
    pub history_days: u32,
    pub default_location: String,
    pub tz: Tz,
}

impl PipelineSettings {
    pub fn from_config(config: &DaybreakConfig) -> Result<Self> {
        Ok(Self {
            stage_timeout: Duration::from_secs(config.pipeline.stage_timeout_secs),
            inference_timeout: Duration::from_secs(config.inference.timeout_secs),
            history_days: config.market.history_days,
            default_location: config.weather.default_location.clone(),
            tz: config.tz()?,
        })
    }
}

/// One invocation's result.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub artifact: BriefingArtifact,
    pub errors: Vec<String>,
}

impl PipelineReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Pipeline {
    market: Arc<dyn MarketSource>,
    inference: Arc<dyn InferenceProvider>,
    holdings: Arc<dyn HoldingsSource>,
    weather: Arc<dyn WeatherSource>,
    store: Arc<dyn ConfigStore>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        market: Arc<dyn MarketSource>,
        inference: Arc<dyn InferenceProvider>,
        holdings: Arc<dyn HoldingsSource>,
        weather: Arc<dyn WeatherSource>,
        store: Arc<dyn ConfigStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            market,
            inference,
            holdings,
            weather,
            store,
            settings,
        }
    }

    /// Build one briefing. Never fails.
    pub async fn generate(&self) -> PipelineReport {
        tracing::info!("📝 Generating briefing");
        let limit = self.settings.stage_timeout;
        let mut errors = Vec::new();

        // 1. Market movers
        let movers = run_stage("market", limit, self.market.fetch_market_movers())
            .await
            .or_record("market", &mut errors, MoversResult::default);

        // 2. Commentary, only with movers to talk about
        let commentary = if movers.is_empty() {
            COMMENTARY_PLACEHOLDER.to_string()
        } else {
            let prompt = prompts::commentary_prompt(&movers);
            run_stage(
                "commentary",
                self.settings.inference_timeout,
                self.generate_text(prompt, prompts::COMMENTARY_TEMPERATURE),
            )
            .await
            .or_record("commentary", &mut errors, || COMMENTARY_PLACEHOLDER.to_string())
        };

        // 3. Holdings valuation
        let holdings = run_stage("holdings", limit, self.holdings.fetch_holdings_valuation())
            .await
            .or_record("holdings", &mut errors, HoldingsResult::default);

        // 4. Alerts, only with holdings to watch
        let alerts = if holdings.holdings.is_empty() {
            None
        } else {
            match run_stage("alerts", limit, self.holdings_alerts(&holdings)).await {
                StageResult::Ok(text) => Some(text),
                StageResult::Failed(reason) => {
                    errors.push(format!("alerts: {reason}"));
                    None
                }
            }
        };

        // 5. Weather
        let location = self
            .store
            .get_or(keys::WEATHER_LOCATION, &self.settings.default_location);
        let weather = match run_stage("weather", limit, self.weather.fetch_weather(&location)).await
        {
            StageResult::Ok(w) => Some(w),
            StageResult::Failed(reason) => {
                errors.push(format!("weather: {reason}"));
                None
            }
        };

        // 6. Ride score
        let thresholds = RideThresholds::from_store(self.store.as_ref());
        let ride = score_ride(weather.as_ref(), &thresholds);

        // 7. Compose
        let inputs = BriefingInputs {
            generated_at: Utc::now().with_timezone(&self.settings.tz),
            movers,
            commentary,
            holdings,
            alerts,
            weather,
            ride,
            failures: errors.clone(),
        };
        let artifact = compose(&inputs);

        if errors.is_empty() {
            tracing::info!("✅ Briefing ready ({} sections)", artifact.sections.len());
        } else {
            tracing::warn!(
                "⚠️ Briefing degraded ({} sections, {} errors): {}",
                artifact.sections.len(),
                errors.len(),
                errors.join("; ")
            );
        }
        PipelineReport { artifact, errors }
    }

    async fn generate_text(&self, prompt: String, temperature: f32) -> Result<String> {
        let text = self.inference.generate(&prompt, temperature).await?;
        if text.trim().is_empty() {
            return Err(DaybreakError::adapter(self.inference.name(), "empty response"));
        }
        Ok(text)
    }

    async fn holdings_alerts(&self, holdings: &HoldingsResult) -> Result<String> {
        let days = self.settings.history_days;
        let mut history = Vec::with_capacity(holdings.holdings.len());
        for h in &holdings.holdings {
            match self.market.fetch_history(&h.ticker, days).await {
                Ok(closes) => history.push(prompts::history_line(&h.ticker, &closes)),
                Err(e) => tracing::warn!("⚠️ No history for {}: {e}", h.ticker),
            }
        }
        let prompt = prompts::alerts_prompt(
            &prompts::holdings_summary(holdings),
            &history.join("\n"),
            days,
        );
        self.generate_text(prompt, prompts::ALERTS_TEMPERATURE).await
    }
}


#[cfg(test)]
mod tests {
    use super::stubs::*;
    use super::*;
    use daybreak_core::types::SectionKind;

    #[tokio::test]
    async fn test_every_failure_combination() {
        for mask in 0u8..16 {
            let market_ok = mask & 1 == 0;
            let holdings_ok = mask & 2 == 0;
            let weather_ok = mask & 4 == 0;
            let inference_ok = mask & 8 == 0;

            let report = pipeline(market_ok, holdings_ok, weather_ok, inference_ok)
                .generate()
                .await;

            let mut expected = 0;
            expected += usize::from(!market_ok) + usize::from(!holdings_ok) + usize::from(!weather_ok);
            if !inference_ok {
                expected += usize::from(market_ok) + usize::from(holdings_ok);
            }
            assert_eq!(report.errors.len(), expected, "mask {mask:04b}: {:?}", report.errors);
            assert_eq!(report.ok(), expected == 0);
            assert_eq!(report.artifact.failures, report.errors);

            let kinds: Vec<_> = report.artifact.sections.iter().map(|s| s.kind).collect();
            assert_eq!(kinds.first(), Some(&SectionKind::Market));
            assert_eq!(kinds.last(), Some(&SectionKind::Weather));
            let expect_alerts = holdings_ok && inference_ok;
            assert_eq!(kinds.contains(&SectionKind::Alerts), expect_alerts, "mask {mask:04b}");
            assert_eq!(kinds.len(), if expect_alerts { 5 } else { 4 });
        }
    }

    #[tokio::test]
    async fn test_weather_failure_scenario() {
        let report = pipeline(true, true, false, true).generate().await;
        assert_eq!(report.errors, ["weather: stub-weather: HTTP 503"]);
        assert!(!report.ok());

        let holdings = report.artifact.section(SectionKind::Holdings).unwrap();
        assert!(holdings.body.contains("LVMH"));
        assert!(holdings.body.contains("+3.00%"));
        let weather = report.artifact.section(SectionKind::Weather).unwrap();
        assert!(weather.body.contains("unavailable"));
        assert!(weather.body.contains("0/10"));
    }

    #[tokio::test]
    async fn test_all_fallible_stages_fail() {
        let report = pipeline(false, false, false, false).generate().await;
        assert_eq!(
            report.errors,
            [
                "market: stub-market: feed down",
                "holdings: Database error: db locked",
                "weather: stub-weather: HTTP 503",
            ]
        );
        assert_eq!(report.artifact.sections.len(), 4);
        let commentary = report.artifact.section(SectionKind::Commentary).unwrap();
        assert_eq!(commentary.body, COMMENTARY_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_stage_timeout_and_panic_are_contained() {
        let timed_out: StageResult<()> = run_stage("slow", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(timed_out, StageResult::Failed("timed out after 20ms".into()));

        let panicked: StageResult<u8> = run_stage("boom", Duration::from_secs(1), async {
            if true {
                panic!("adapter bug");
            }
            Ok(1)
        })
        .await;
        assert_eq!(panicked, StageResult::Failed("panicked: adapter bug".into()));
    }

    #[tokio::test]
    async fn test_weather_location_from_store() {
        let store = daybreak_core::db::Database::open_in_memory().unwrap();
        store.set(keys::WEATHER_LOCATION, "Lyon").unwrap();
        let p = Pipeline::new(
            Arc::new(StubMarket { fail: false }),
            Arc::new(StubInference { fail: false }),
            Arc::new(StubHoldings { fail: false }),
            Arc::new(StubWeather { fail: false }),
            Arc::new(store),
            settings(),
        );
        let report = p.generate().await;
        assert!(report.ok());
        let weather = report.artifact.section(SectionKind::Weather).unwrap();
        assert!(weather.body.contains("Lyon"));
    }
}

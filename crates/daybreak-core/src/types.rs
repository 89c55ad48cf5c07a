//! Domain values exchanged between data sources, the pipeline and delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stock's daily move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mover {
    pub ticker: String,
    pub name: String,
    /// Last close.
    pub price: f64,
    /// Absolute change vs the previous close.
    pub change: f64,
    /// Percent change vs the previous close.
    pub change_pct: f64,
}

/// Result of a market scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoversResult {
    /// Best performers, best first.
    pub top_gainers: Vec<Mover>,
    /// Worst performers, worst first.
    pub top_losers: Vec<Mover>,
    /// Mean percent change over every quoted constituent.
    pub overall_change_pct: f64,
}

impl MoversResult {
    pub fn is_empty(&self) -> bool {
        self.top_gainers.is_empty() && self.top_losers.is_empty()
    }
}

/// A quote for a single ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change_pct: f64,
}

/// One daily close in a price history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingPrice {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub close: f64,
}

/// Valuation of a single position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub ticker: String,
    pub name: String,
    pub quantity: u32,
    pub buy_price: f64,
    pub current_price: f64,
    /// Intraday percent move of the underlying.
    pub day_change_pct: f64,
    pub invested: f64,
    pub value: f64,
    pub gain: f64,
    pub gain_pct: f64,
}

/// Valuation of the whole holdings book.
///
/// `Default` is the zeroed summary used when the holdings stage fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldingsResult {
    pub holdings: Vec<HoldingValuation>,
    pub total_invested: f64,
    pub total_value: f64,
    pub total_gain: f64,
    pub total_gain_pct: f64,
}

/// Current weather conditions at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: String,
    pub description: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: f64,
    pub wind_kmh: f64,
    pub gust_kmh: f64,
    /// Rain over the last hour.
    pub rain_1h_mm: f64,
    /// Probability of precipitation, 0-100. Current-conditions feeds report 0.
    pub rain_chance_pct: f64,
    pub visibility_m: f64,
    pub clouds_pct: f64,
}

/// Outcome written to the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("SUCCESS") {
            RunStatus::Success
        } else {
            RunStatus::Error
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row per briefing invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub content_summary: String,
    pub error_message: Option<String>,
}

impl RunRecord {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status: RunStatus::Success,
            content_summary: summary.into(),
            error_message: None,
        }
    }

    pub fn error(summary: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status: RunStatus::Error,
            content_summary: summary.into(),
            error_message: Some(error.into()),
        }
    }
}

/// Visual tone of a rendered section; delivery maps it to a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
    Warning,
    Info,
}

impl Tone {
    /// Tone for a signed variation.
    pub fn of_change(value: f64) -> Self {
        if value > 0.0 {
            Tone::Positive
        } else if value < 0.0 {
            Tone::Negative
        } else {
            Tone::Neutral
        }
    }
}

/// Which part of the briefing a section renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Market,
    Commentary,
    Holdings,
    Alerts,
    Weather,
}

/// One rendered, length-capped block of the briefing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub body: String,
    pub tone: Tone,
}

/// The composed, ready-to-deliver briefing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefingArtifact {
    pub title: String,
    /// Local generation time, already formatted.
    pub generated_at: String,
    pub sections: Vec<Section>,
    /// Stage failure reasons, `"<stage>: <reason>"`.
    pub failures: Vec<String>,
}

impl BriefingArtifact {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Short description used in run records.
    pub fn summary(&self) -> String {
        format!(
            "{} sections, errors: [{}]",
            self.sections.len(),
            self.failures.join("; ")
        )
    }
}
